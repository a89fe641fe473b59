//! Batch execution worker.
//!
//! Polls for pending batch operations and executes them. Claiming uses
//! `FOR UPDATE SKIP LOCKED`, so multiple worker processes can run
//! side by side without double-executing a batch.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use scribe_db::document_store::PgDocumentStore;
use scribe_engine::{BatchEngine, PgBatchStore, PgLedgerStore, TracingEventSink};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Seconds between polls when no batch is pending.
const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "scribe_worker=debug,scribe_engine=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let database_url =
        std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
    let poll_interval = std::env::var("POLL_INTERVAL_SECS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_POLL_INTERVAL_SECS);

    let pool = scribe_db::create_pool(&database_url)
        .await
        .context("failed to connect to database")?;

    let engine = BatchEngine::new(
        Arc::new(PgDocumentStore::new(pool.clone())),
        Arc::new(PgBatchStore::new(pool.clone())),
        Arc::new(PgLedgerStore::new(pool)),
        Arc::new(TracingEventSink),
    );

    tracing::info!(poll_interval, "batch worker started");

    loop {
        match engine.claim_and_execute().await {
            // Executed one batch; immediately look for the next.
            Ok(Some(batch_id)) => {
                tracing::info!(batch_operation_id = batch_id, "batch executed");
            }
            Ok(None) => {
                tokio::time::sleep(Duration::from_secs(poll_interval)).await;
            }
            Err(err) => {
                // Execution failures are recorded on the batch row; the
                // worker keeps draining the queue.
                tracing::warn!(error = %err, "batch execution failed");
            }
        }
    }
}

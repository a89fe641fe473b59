//! Batch command engine: preflight, orchestration, undo, retry.
//!
//! The engine owns the lifecycle of a batch operation: submit ->
//! preflight -> choose strategy -> execute -> (cancel | undo) -> report
//! progress. Document mutations go through the `DocumentStore` trait;
//! engine state and the undo ledger go through the [`stores`] traits,
//! with Postgres implementations backed by `scribe-db`.

pub mod engine;
pub mod error;
pub mod events;
pub mod preflight;
pub mod stores;

pub use engine::{BatchEngine, BatchProgress, ListOperationsQuery, SubmitBatchRequest};
pub use error::EngineError;
pub use events::{EventSink, NoopEventSink, TracingEventSink};
pub use preflight::TargetResolver;
pub use stores::{BatchStore, LedgerStore, PgBatchStore, PgLedgerStore};

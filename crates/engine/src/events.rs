//! Batch lifecycle events.
//!
//! The sink is an injected dependency rather than a process-wide bus.
//! Publishing is best-effort: the engine logs a failed publish and
//! carries on, so a slow or broken sink can never fail a mutation.

use scribe_core::types::{DbId, ProjectId, Timestamp};
use serde::Serialize;

pub const EVENT_CREATED: &str = "batch_operation.created";
pub const EVENT_COMPLETED: &str = "batch_operation.completed";
pub const EVENT_FAILED: &str = "batch_operation.failed";
pub const EVENT_PARTIAL: &str = "batch_operation.partial";
pub const EVENT_CANCELLED: &str = "batch_operation.cancelled";
pub const EVENT_UNDONE: &str = "batch_operation.undone";
pub const EVENT_REDONE: &str = "batch_operation.redone";

/// One lifecycle notification.
#[derive(Debug, Clone, Serialize)]
pub struct EngineEvent {
    pub event_type: String,
    pub batch_operation_id: DbId,
    pub project_id: ProjectId,
    pub data: serde_json::Value,
    pub occurred_at: Timestamp,
}

/// Receiver for engine lifecycle events.
#[async_trait::async_trait]
pub trait EventSink: Send + Sync {
    async fn publish(&self, event: EngineEvent) -> Result<(), String>;
}

/// Default sink: emits each event as a structured log line.
pub struct TracingEventSink;

#[async_trait::async_trait]
impl EventSink for TracingEventSink {
    async fn publish(&self, event: EngineEvent) -> Result<(), String> {
        tracing::info!(
            event_type = %event.event_type,
            batch_operation_id = event.batch_operation_id,
            project_id = %event.project_id,
            data = %event.data,
            "batch operation event"
        );
        Ok(())
    }
}

/// Sink that drops everything; useful in tests.
pub struct NoopEventSink;

#[async_trait::async_trait]
impl EventSink for NoopEventSink {
    async fn publish(&self, _event: EngineEvent) -> Result<(), String> {
        Ok(())
    }
}

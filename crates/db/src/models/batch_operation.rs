//! Batch operation models and DTOs.
//!
//! Maps to the `batch_operations` and `batch_operation_items` tables.

use scribe_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A row from the `batch_operations` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct BatchOperation {
    pub id: DbId,
    pub project_id: Uuid,
    /// Caller-supplied idempotency key, unique per project when present.
    pub client_request_id: Option<String>,
    pub op_type: String,
    /// Target ids exactly as submitted, before normalization.
    pub original_target_ids: Vec<String>,
    /// The normalized, validated set actually processed.
    pub target_ids: Vec<Uuid>,
    pub payload: serde_json::Value,
    pub atomic: bool,
    pub conflict_policy: String,
    /// Optimistic-check map of target id -> expected version.
    pub expected_versions: serde_json::Value,
    /// Per-batch retry policy override; engine default when absent.
    pub retry_policy: Option<serde_json::Value>,
    /// Fixed at submission from the valid-target count; never changes.
    pub execution_mode: String,
    pub status: String,
    pub preflight_summary: serde_json::Value,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub created_by: String,
    pub started_at: Option<Timestamp>,
    pub finished_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// A row from the `batch_operation_items` table, one per valid target.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct BatchOperationItem {
    pub id: DbId,
    pub batch_operation_id: DbId,
    pub target_id: Uuid,
    pub status: String,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub retryable: bool,
    pub retry_count: i32,
    pub started_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// DTO for inserting a new batch operation.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateBatchOperation {
    pub project_id: Uuid,
    pub client_request_id: Option<String>,
    pub op_type: String,
    pub original_target_ids: Vec<String>,
    pub target_ids: Vec<Uuid>,
    pub payload: serde_json::Value,
    pub atomic: bool,
    pub conflict_policy: String,
    pub expected_versions: serde_json::Value,
    pub retry_policy: Option<serde_json::Value>,
    pub execution_mode: String,
    pub status: String,
    pub preflight_summary: serde_json::Value,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub created_by: String,
}

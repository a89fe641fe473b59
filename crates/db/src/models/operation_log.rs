//! Undo-ledger models and DTOs.
//!
//! Maps to the append-only `operation_logs` table. Rows are created once
//! per executed command, mutated only by status transitions, never
//! deleted.

use scribe_core::ledger::{self, LogStatus};
use scribe_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A row from the `operation_logs` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct OperationLog {
    pub id: DbId,
    /// Links all entries belonging to one batch; defaults to the batch's
    /// own id for single-command batches.
    pub chain_id: DbId,
    pub project_id: Uuid,
    pub user_id: String,
    pub batch_operation_id: Option<DbId>,
    pub command_type: String,
    pub target_ids: Vec<Uuid>,
    pub command_payload: serde_json::Value,
    /// JSON array of inverse commands; `None` when no inverse exists.
    pub inverse_commands: Option<serde_json::Value>,
    pub status: String,
    pub is_committed: bool,
    pub undone_at: Option<Timestamp>,
    pub redone_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl OperationLog {
    /// True when the entry's inverse can still be applied.
    pub fn is_undoable(&self) -> bool {
        match LogStatus::from_str_value(&self.status) {
            Ok(status) => {
                ledger::is_undoable(status, self.is_committed, self.inverse_commands.is_some())
            }
            Err(_) => false,
        }
    }

    /// True when the entry's original command can be re-applied.
    pub fn is_redoable(&self) -> bool {
        match LogStatus::from_str_value(&self.status) {
            Ok(status) => ledger::is_redoable(status, self.inverse_commands.is_some()),
            Err(_) => false,
        }
    }
}

/// DTO for appending a new ledger entry.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateOperationLog {
    pub chain_id: DbId,
    pub project_id: Uuid,
    pub user_id: String,
    pub batch_operation_id: Option<DbId>,
    pub command_type: String,
    pub target_ids: Vec<Uuid>,
    pub command_payload: serde_json::Value,
    pub inverse_commands: Option<serde_json::Value>,
    pub status: String,
    pub is_committed: bool,
}

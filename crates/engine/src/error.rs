//! Engine error taxonomy.
//!
//! Every public operation returns these as typed values; nothing is
//! silently swallowed except clearly-labeled best-effort paths (event
//! publishing, item progress writes). Item-level failures always carry
//! the offending target id and a stable reason code.

use scribe_core::batch::PreflightSummary;
use scribe_core::error::CoreError;
use scribe_core::store::StoreError;
use scribe_core::types::{DbId, DocumentId};

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("batch operation {0} not found")]
    NotFound(DbId),

    #[error("preflight failed: {} of {} target(s) invalid", .summary.invalid_count, .summary.total_count)]
    PreflightFailed { summary: PreflightSummary },

    #[error("batch operation {id} is {status}; {action} is not allowed")]
    IllegalState {
        id: DbId,
        status: String,
        action: &'static str,
    },

    /// Standard-atomic execution failed; nothing was committed.
    #[error("item {target_id} failed ({code})")]
    ItemFailed {
        target_id: DocumentId,
        code: String,
        #[source]
        source: StoreError,
    },

    /// Saga execution failed and earlier items were rolled back via
    /// their recorded inverses.
    #[error("item {target_id} failed ({code}), compensated")]
    ItemFailedCompensated {
        target_id: DocumentId,
        code: String,
        #[source]
        source: StoreError,
    },

    /// An inverse failed while rolling back a saga; manual cleanup may
    /// be required for the items still committed.
    #[error("compensation halted at item {target_id}")]
    CompensationFailed {
        target_id: DocumentId,
        #[source]
        source: StoreError,
    },

    #[error("undo halted at ledger entry {entry_id}")]
    UndoHalted {
        entry_id: DbId,
        #[source]
        source: StoreError,
    },

    #[error("redo halted at ledger entry {entry_id}")]
    RedoHalted {
        entry_id: DbId,
        #[source]
        source: StoreError,
    },

    #[error("document store error: {0}")]
    Store(#[from] StoreError),

    #[error("persistence error: {0}")]
    Persistence(String),
}

impl EngineError {
    /// Stable reason code recorded on the batch row and surfaced to
    /// callers.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::NotFound(_) => "not_found",
            Self::PreflightFailed { .. } => "preflight_failed",
            Self::IllegalState { .. } => "illegal_state",
            Self::ItemFailed { .. } => "execution_failed",
            Self::ItemFailedCompensated { .. } => "item_failed_compensated",
            Self::CompensationFailed { .. } => "compensation_failed",
            Self::UndoHalted { .. } => "undo_failed",
            Self::RedoHalted { .. } => "redo_failed",
            Self::Store(e) => e.code(),
            Self::Persistence(_) => "persistence",
        }
    }
}

impl From<CoreError> for EngineError {
    fn from(err: CoreError) -> Self {
        Self::Validation(err.to_string())
    }
}

impl From<sqlx::Error> for EngineError {
    fn from(err: sqlx::Error) -> Self {
        Self::Persistence(err.to_string())
    }
}

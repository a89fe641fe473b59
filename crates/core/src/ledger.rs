//! Operation-log (undo ledger) statuses and undoability rules.
//!
//! Ledger entries are append-only: content is never edited, rows are
//! never deleted, only the status moves between executed/undone/redone.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Valid ledger status strings.
pub const LOG_EXECUTED: &str = "executed";
pub const LOG_UNDONE: &str = "undone";
pub const LOG_REDONE: &str = "redone";

/// All valid ledger status strings.
pub const VALID_LOG_STATUSES: &[&str] = &[LOG_EXECUTED, LOG_UNDONE, LOG_REDONE];

/// Lifecycle of one ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogStatus {
    Executed,
    Undone,
    Redone,
}

impl LogStatus {
    /// Convert from a database string value.
    pub fn from_str_value(s: &str) -> Result<Self, CoreError> {
        match s {
            LOG_EXECUTED => Ok(Self::Executed),
            LOG_UNDONE => Ok(Self::Undone),
            LOG_REDONE => Ok(Self::Redone),
            _ => Err(CoreError::Validation(format!(
                "Invalid operation log status '{s}'. Must be one of: {}",
                VALID_LOG_STATUSES.join(", ")
            ))),
        }
    }

    /// Convert to the database string value.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Executed => LOG_EXECUTED,
            Self::Undone => LOG_UNDONE,
            Self::Redone => LOG_REDONE,
        }
    }
}

/// An entry can be undone only when it executed (or was redone), its
/// command committed, and it recorded an inverse to apply.
pub fn is_undoable(status: LogStatus, is_committed: bool, has_inverse: bool) -> bool {
    matches!(status, LogStatus::Executed | LogStatus::Redone) && is_committed && has_inverse
}

/// An entry can be redone only after it was undone, and only when an
/// inverse was recorded (entries without inverses never entered the
/// undone state to begin with).
pub fn is_redoable(status: LogStatus, has_inverse: bool) -> bool {
    status == LogStatus::Undone && has_inverse
}

//! Batch operation types, statuses, and the lifecycle state machine.
//!
//! Everything here is pure: enum/string conversions, size validation, the
//! execution-mode decision, and transition checks. The `db` crate stores
//! the string forms; the engine crate converts at its boundaries.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Maximum number of targets per batch operation.
pub const MAX_BATCH_SIZE: usize = 1000;

/// Minimum targets required for a batch operation.
pub const MIN_BATCH_SIZE: usize = 1;

/// Largest valid-target count executed as a single transactional commit.
/// Above this, execution switches to per-item commits with recorded
/// inverses (saga mode) to bound memory and transaction duration.
pub const STANDARD_ATOMIC_MAX_TARGETS: usize = 200;

/// Valid operation type strings (stored in DB).
pub const OP_DELETE: &str = "delete";
pub const OP_MOVE: &str = "move";
pub const OP_COPY: &str = "copy";
pub const OP_APPLY_TEMPLATE: &str = "apply_template";

/// All valid operation type strings.
pub const VALID_OPERATION_TYPES: &[&str] = &[OP_DELETE, OP_MOVE, OP_COPY, OP_APPLY_TEMPLATE];

/// Valid batch status strings.
pub const STATUS_PENDING: &str = "pending";
pub const STATUS_PREFLIGHT: &str = "preflight";
pub const STATUS_RUNNING: &str = "running";
pub const STATUS_COMPLETED: &str = "completed";
pub const STATUS_FAILED: &str = "failed";
pub const STATUS_CANCELLED: &str = "cancelled";
pub const STATUS_PARTIAL: &str = "partial";

/// All valid batch status strings.
pub const VALID_STATUSES: &[&str] = &[
    STATUS_PENDING,
    STATUS_PREFLIGHT,
    STATUS_RUNNING,
    STATUS_COMPLETED,
    STATUS_FAILED,
    STATUS_CANCELLED,
    STATUS_PARTIAL,
];

/// Valid item status strings.
pub const ITEM_PENDING: &str = "pending";
pub const ITEM_PROCESSING: &str = "processing";
pub const ITEM_SUCCEEDED: &str = "succeeded";
pub const ITEM_FAILED: &str = "failed";
pub const ITEM_SKIPPED: &str = "skipped";
pub const ITEM_CANCELLED: &str = "cancelled";

/// Valid conflict policy strings.
pub const POLICY_SKIP: &str = "skip";
pub const POLICY_OVERWRITE: &str = "overwrite";
pub const POLICY_RENAME: &str = "rename";
pub const POLICY_ABORT: &str = "abort";

/// Valid execution mode strings.
pub const MODE_STANDARD_ATOMIC: &str = "standard_atomic";
pub const MODE_SAGA_ATOMIC: &str = "saga_atomic";

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Types of batch operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchOperationType {
    Delete,
    Move,
    Copy,
    ApplyTemplate,
}

impl BatchOperationType {
    /// Convert from a database string value.
    pub fn from_str_value(s: &str) -> Result<Self, CoreError> {
        match s {
            OP_DELETE => Ok(Self::Delete),
            OP_MOVE => Ok(Self::Move),
            OP_COPY => Ok(Self::Copy),
            OP_APPLY_TEMPLATE => Ok(Self::ApplyTemplate),
            _ => Err(CoreError::Validation(format!(
                "Invalid operation type '{s}'. Must be one of: {}",
                VALID_OPERATION_TYPES.join(", ")
            ))),
        }
    }

    /// Convert to the database string value.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Delete => OP_DELETE,
            Self::Move => OP_MOVE,
            Self::Copy => OP_COPY,
            Self::ApplyTemplate => OP_APPLY_TEMPLATE,
        }
    }
}

/// Lifecycle statuses for a batch operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Pending,
    Preflight,
    Running,
    Completed,
    Failed,
    Cancelled,
    Partial,
}

impl BatchStatus {
    /// Convert from a database string value.
    pub fn from_str_value(s: &str) -> Result<Self, CoreError> {
        match s {
            STATUS_PENDING => Ok(Self::Pending),
            STATUS_PREFLIGHT => Ok(Self::Preflight),
            STATUS_RUNNING => Ok(Self::Running),
            STATUS_COMPLETED => Ok(Self::Completed),
            STATUS_FAILED => Ok(Self::Failed),
            STATUS_CANCELLED => Ok(Self::Cancelled),
            STATUS_PARTIAL => Ok(Self::Partial),
            _ => Err(CoreError::Validation(format!(
                "Invalid batch status '{s}'. Must be one of: {}",
                VALID_STATUSES.join(", ")
            ))),
        }
    }

    /// Convert to the database string value.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => STATUS_PENDING,
            Self::Preflight => STATUS_PREFLIGHT,
            Self::Running => STATUS_RUNNING,
            Self::Completed => STATUS_COMPLETED,
            Self::Failed => STATUS_FAILED,
            Self::Cancelled => STATUS_CANCELLED,
            Self::Partial => STATUS_PARTIAL,
        }
    }

    /// Terminal statuses admit no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed | Self::Cancelled | Self::Partial
        )
    }
}

/// Per-target item statuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Pending,
    Processing,
    Succeeded,
    Failed,
    Skipped,
    Cancelled,
}

impl ItemStatus {
    /// Convert from a database string value.
    pub fn from_str_value(s: &str) -> Result<Self, CoreError> {
        match s {
            ITEM_PENDING => Ok(Self::Pending),
            ITEM_PROCESSING => Ok(Self::Processing),
            ITEM_SUCCEEDED => Ok(Self::Succeeded),
            ITEM_FAILED => Ok(Self::Failed),
            ITEM_SKIPPED => Ok(Self::Skipped),
            ITEM_CANCELLED => Ok(Self::Cancelled),
            _ => Err(CoreError::Validation(format!("Invalid item status '{s}'"))),
        }
    }

    /// Convert to the database string value.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => ITEM_PENDING,
            Self::Processing => ITEM_PROCESSING,
            Self::Succeeded => ITEM_SUCCEEDED,
            Self::Failed => ITEM_FAILED,
            Self::Skipped => ITEM_SKIPPED,
            Self::Cancelled => ITEM_CANCELLED,
        }
    }

    /// Items never leave a terminal state.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending | Self::Processing)
    }

    /// Valid item transitions: pending -> processing -> terminal.
    /// Terminal states are also reachable directly from pending: an item
    /// can be skipped, cancelled, or failed before processing starts.
    pub fn can_transition(from: ItemStatus, to: ItemStatus) -> bool {
        match from {
            Self::Pending => matches!(
                to,
                Self::Processing | Self::Skipped | Self::Cancelled | Self::Failed
            ),
            Self::Processing => matches!(
                to,
                Self::Succeeded | Self::Failed | Self::Skipped | Self::Cancelled
            ),
            _ => false,
        }
    }
}

/// Policy for invalid or version-mismatched targets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    Skip,
    Overwrite,
    Rename,
    #[default]
    Abort,
}

impl ConflictPolicy {
    /// Convert from a database string value.
    pub fn from_str_value(s: &str) -> Result<Self, CoreError> {
        match s {
            POLICY_SKIP => Ok(Self::Skip),
            POLICY_OVERWRITE => Ok(Self::Overwrite),
            POLICY_RENAME => Ok(Self::Rename),
            POLICY_ABORT => Ok(Self::Abort),
            _ => Err(CoreError::Validation(format!(
                "Invalid conflict policy '{s}'"
            ))),
        }
    }

    /// Convert to the database string value.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Skip => POLICY_SKIP,
            Self::Overwrite => POLICY_OVERWRITE,
            Self::Rename => POLICY_RENAME,
            Self::Abort => POLICY_ABORT,
        }
    }
}

/// Consistency strategy for executing an atomic batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    StandardAtomic,
    SagaAtomic,
}

impl ExecutionMode {
    /// Convert from a database string value.
    pub fn from_str_value(s: &str) -> Result<Self, CoreError> {
        match s {
            MODE_STANDARD_ATOMIC => Ok(Self::StandardAtomic),
            MODE_SAGA_ATOMIC => Ok(Self::SagaAtomic),
            _ => Err(CoreError::Validation(format!(
                "Invalid execution mode '{s}'"
            ))),
        }
    }

    /// Convert to the database string value.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StandardAtomic => MODE_STANDARD_ATOMIC,
            Self::SagaAtomic => MODE_SAGA_ATOMIC,
        }
    }

    /// Pick the execution mode for a batch from its valid-target count.
    /// Fixed at submission time; never changes afterward.
    pub fn for_target_count(count: usize) -> Self {
        if count <= STANDARD_ATOMIC_MAX_TARGETS {
            Self::StandardAtomic
        } else {
            Self::SagaAtomic
        }
    }
}

// ---------------------------------------------------------------------------
// Preflight summary
// ---------------------------------------------------------------------------

/// Counts computed by the preflight pass, extended with execution results.
/// Stored as JSONB on the batch operation row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PreflightSummary {
    pub total_count: usize,
    pub valid_count: usize,
    pub invalid_count: usize,
    pub skipped_count: usize,
    #[serde(default)]
    pub success_count: usize,
    #[serde(default)]
    pub failed_count: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

// ---------------------------------------------------------------------------
// Validation functions
// ---------------------------------------------------------------------------

/// Validate batch size is within allowed bounds.
pub fn validate_batch_size(count: usize) -> Result<(), CoreError> {
    if count < MIN_BATCH_SIZE {
        return Err(CoreError::Validation(format!(
            "Batch size must be at least {MIN_BATCH_SIZE}"
        )));
    }
    if count > MAX_BATCH_SIZE {
        return Err(CoreError::Validation(format!(
            "Batch size {count} exceeds maximum of {MAX_BATCH_SIZE}"
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// State machine
// ---------------------------------------------------------------------------

/// Batch status transitions. Terminal states return an empty slice.
///
/// The preflight state exists for submissions that defer validation; a
/// synchronous submit collapses it and goes straight to running on
/// execute. Cancellation is only reachable from running.
pub mod state_machine {
    use super::BatchStatus;
    use crate::error::CoreError;

    /// Returns the set of valid target statuses reachable from `from`.
    pub fn valid_transitions(from: BatchStatus) -> &'static [BatchStatus] {
        match from {
            BatchStatus::Pending => &[BatchStatus::Preflight, BatchStatus::Running],
            BatchStatus::Preflight => &[BatchStatus::Running, BatchStatus::Failed],
            BatchStatus::Running => &[
                BatchStatus::Completed,
                BatchStatus::Failed,
                BatchStatus::Cancelled,
                BatchStatus::Partial,
            ],
            // Terminal states: completed, failed, cancelled, partial
            _ => &[],
        }
    }

    /// Check whether a transition from `from` to `to` is valid.
    pub fn can_transition(from: BatchStatus, to: BatchStatus) -> bool {
        valid_transitions(from).contains(&to)
    }

    /// Validate a transition, returning a descriptive error for invalid ones.
    pub fn validate_transition(from: BatchStatus, to: BatchStatus) -> Result<(), CoreError> {
        if can_transition(from, to) {
            Ok(())
        } else {
            Err(CoreError::InvalidTransition(format!(
                "{} -> {}",
                from.as_str(),
                to.as_str()
            )))
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! Document entity and the closed mutation set applied to it.
//!
//! The engine never hands the store an untyped field bag: every write is
//! one of the [`Mutation`] variants, so inverse construction can
//! pattern-match a closed set.

use serde::{Deserialize, Serialize};

use crate::types::{DocumentId, ProjectId, Timestamp};

/// A document as held by the external document store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    pub project_id: ProjectId,
    pub parent_id: Option<DocumentId>,
    /// Sort position among siblings.
    pub position: i32,
    pub title: String,
    /// Free-form document fields (template variables, metadata).
    pub fields: serde_json::Value,
    /// Monotonic version, bumped on every mutation. The optimistic
    /// `expected_versions` preflight check compares against this.
    pub version: i64,
    pub deleted_at: Option<Timestamp>,
    pub deleted_by: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Document {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// Field-level changes for an update mutation. `None` leaves the field
/// untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields: Option<serde_json::Value>,
}

/// One atomic write against the document store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Mutation {
    Create {
        document: Document,
    },
    Update {
        id: DocumentId,
        patch: DocumentPatch,
    },
    Move {
        id: DocumentId,
        new_parent_id: Option<DocumentId>,
        position: i32,
    },
    SoftDelete {
        id: DocumentId,
        actor: String,
    },
    Restore {
        id: DocumentId,
    },
}

impl Mutation {
    /// The document the mutation targets (the created id for `Create`).
    pub fn target(&self) -> DocumentId {
        match self {
            Self::Create { document } => document.id,
            Self::Update { id, .. }
            | Self::Move { id, .. }
            | Self::SoftDelete { id, .. }
            | Self::Restore { id } => *id,
        }
    }
}

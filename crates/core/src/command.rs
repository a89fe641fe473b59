//! Command payloads and inverse-command construction.
//!
//! Payloads and inverses are closed tagged enums rather than untyped
//! key-value bags, so each inverse constructor can pattern-match the full
//! variant set. Inverses are built from the pre-image captured before a
//! mutation is applied; an entry that carries no inverse is never
//! undoable.

use serde::{Deserialize, Serialize};

use crate::batch::BatchOperationType;
use crate::document::{Document, DocumentPatch, Mutation};
use crate::error::CoreError;
use crate::types::{DocumentId, Timestamp};

// ---------------------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------------------

/// Operation-specific parameters of a batch command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CommandPayload {
    Delete,
    Move {
        new_parent_id: Option<DocumentId>,
        position: i32,
    },
    Copy {
        /// Parent for the duplicates; `None` keeps each source's parent.
        target_parent_id: Option<DocumentId>,
    },
    ApplyTemplate {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        title: Option<String>,
        fields: serde_json::Value,
    },
}

impl CommandPayload {
    /// The operation type the payload belongs to.
    pub fn op_type(&self) -> BatchOperationType {
        match self {
            Self::Delete => BatchOperationType::Delete,
            Self::Move { .. } => BatchOperationType::Move,
            Self::Copy { .. } => BatchOperationType::Copy,
            Self::ApplyTemplate { .. } => BatchOperationType::ApplyTemplate,
        }
    }
}

/// A recorded description of how to undo one applied mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InverseCommand {
    /// Undo a delete: restore the soft-deleted document.
    Restore { id: DocumentId },
    /// Undo a move: move back to the prior parent/position.
    Move {
        id: DocumentId,
        parent_id: Option<DocumentId>,
        position: i32,
    },
    /// Undo a copy: soft-delete the created duplicate.
    DeleteCreated { id: DocumentId },
    /// Undo a template application: revert title and fields.
    RevertFields {
        id: DocumentId,
        title: String,
        fields: serde_json::Value,
    },
}

// ---------------------------------------------------------------------------
// Construction
// ---------------------------------------------------------------------------

/// Build the forward mutation for applying `payload` to the document
/// `pre` (its pre-image). Copy requires a minted id for the duplicate.
pub fn build_mutation(
    payload: &CommandPayload,
    pre: &Document,
    actor: &str,
    minted_id: Option<DocumentId>,
    now: Timestamp,
) -> Result<Mutation, CoreError> {
    match payload {
        CommandPayload::Delete => Ok(Mutation::SoftDelete {
            id: pre.id,
            actor: actor.to_string(),
        }),
        CommandPayload::Move {
            new_parent_id,
            position,
        } => Ok(Mutation::Move {
            id: pre.id,
            new_parent_id: *new_parent_id,
            position: *position,
        }),
        CommandPayload::Copy { target_parent_id } => {
            let new_id = minted_id.ok_or_else(|| {
                CoreError::Internal("copy mutation requires a minted document id".to_string())
            })?;
            Ok(Mutation::Create {
                document: copy_of(pre, new_id, target_parent_id.or(pre.parent_id), now),
            })
        }
        CommandPayload::ApplyTemplate { title, fields } => Ok(Mutation::Update {
            id: pre.id,
            patch: DocumentPatch {
                title: title.clone(),
                fields: Some(merged_fields(&pre.fields, fields)),
            },
        }),
    }
}

/// Build the inverse for `payload` applied to `pre`. For copy the minted
/// id of the duplicate must match the one used for the forward mutation.
pub fn build_inverse(
    payload: &CommandPayload,
    pre: &Document,
    minted_id: Option<DocumentId>,
) -> Option<InverseCommand> {
    match payload {
        CommandPayload::Delete => Some(InverseCommand::Restore { id: pre.id }),
        CommandPayload::Move { .. } => Some(InverseCommand::Move {
            id: pre.id,
            parent_id: pre.parent_id,
            position: pre.position,
        }),
        CommandPayload::Copy { .. } => minted_id.map(|id| InverseCommand::DeleteCreated { id }),
        CommandPayload::ApplyTemplate { .. } => Some(InverseCommand::RevertFields {
            id: pre.id,
            title: pre.title.clone(),
            fields: pre.fields.clone(),
        }),
    }
}

/// Translate an inverse command into the mutation that applies it.
pub fn mutation_for_inverse(inverse: &InverseCommand, actor: &str) -> Mutation {
    match inverse {
        InverseCommand::Restore { id } => Mutation::Restore { id: *id },
        InverseCommand::Move {
            id,
            parent_id,
            position,
        } => Mutation::Move {
            id: *id,
            new_parent_id: *parent_id,
            position: *position,
        },
        InverseCommand::DeleteCreated { id } => Mutation::SoftDelete {
            id: *id,
            actor: actor.to_string(),
        },
        InverseCommand::RevertFields { id, title, fields } => Mutation::Update {
            id: *id,
            patch: DocumentPatch {
                title: Some(title.clone()),
                fields: Some(fields.clone()),
            },
        },
    }
}

/// Translate an undone entry back into its forward mutation for redo.
/// Copy redoes by restoring the previously created duplicate, so it needs
/// the recorded inverse; everything else rebuilds from the payload.
pub fn mutation_for_redo(
    payload: &CommandPayload,
    target: DocumentId,
    inverse: Option<&InverseCommand>,
    actor: &str,
) -> Option<Mutation> {
    match payload {
        CommandPayload::Delete => Some(Mutation::SoftDelete {
            id: target,
            actor: actor.to_string(),
        }),
        CommandPayload::Move {
            new_parent_id,
            position,
        } => Some(Mutation::Move {
            id: target,
            new_parent_id: *new_parent_id,
            position: *position,
        }),
        CommandPayload::Copy { .. } => match inverse {
            Some(InverseCommand::DeleteCreated { id }) => Some(Mutation::Restore { id: *id }),
            _ => None,
        },
        CommandPayload::ApplyTemplate { title, fields } => Some(Mutation::Update {
            id: target,
            patch: DocumentPatch {
                title: title.clone(),
                fields: Some(fields.clone()),
            },
        }),
    }
}

/// The duplicate document created by a copy command.
fn copy_of(
    pre: &Document,
    new_id: DocumentId,
    parent_id: Option<DocumentId>,
    now: Timestamp,
) -> Document {
    Document {
        id: new_id,
        project_id: pre.project_id,
        parent_id,
        position: pre.position,
        title: format!("{} (copy)", pre.title),
        fields: pre.fields.clone(),
        version: 1,
        deleted_at: None,
        deleted_by: None,
        created_at: now,
        updated_at: now,
    }
}

/// Shallow-merge template fields over the document's existing fields.
/// Template keys win; non-object values on either side are replaced.
fn merged_fields(base: &serde_json::Value, overlay: &serde_json::Value) -> serde_json::Value {
    match (base.as_object(), overlay.as_object()) {
        (Some(base_map), Some(overlay_map)) => {
            let mut merged = base_map.clone();
            for (key, value) in overlay_map {
                merged.insert(key.clone(), value.clone());
            }
            serde_json::Value::Object(merged)
        }
        _ => overlay.clone(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! Contract consumed from the document store collaborator.
//!
//! The engine only ever talks to the store through this trait. Standard
//! atomic execution additionally requires [`DocumentStore::apply_atomic`]
//! to be all-or-nothing; saga execution requires only that each single
//! mutation is individually atomic.

use crate::document::{Document, DocumentPatch, Mutation};
use crate::types::{DocumentId, ProjectId};

/// Stable error codes used by retry classification and item reporting.
pub const CODE_NOT_FOUND: &str = "document_not_found";
pub const CODE_VERSION_CONFLICT: &str = "version_conflict";
pub const CODE_TIMEOUT: &str = "timeout";
pub const CODE_UNAVAILABLE: &str = "unavailable";
pub const CODE_CONFLICT: &str = "conflict";
pub const CODE_INTERNAL: &str = "internal";

/// Failures surfaced by a document store implementation.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("document not found: {0}")]
    NotFound(DocumentId),

    #[error("version conflict on {id}: expected {expected}, stored {actual}")]
    VersionConflict {
        id: DocumentId,
        expected: i64,
        actual: i64,
    },

    #[error("store timeout: {0}")]
    Timeout(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("internal store error: {0}")]
    Internal(String),
}

impl StoreError {
    /// Stable code for the error, matched against retry allow-lists and
    /// recorded on failed items.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => CODE_NOT_FOUND,
            Self::VersionConflict { .. } => CODE_VERSION_CONFLICT,
            Self::Timeout(_) => CODE_TIMEOUT,
            Self::Unavailable(_) => CODE_UNAVAILABLE,
            Self::Conflict(_) => CODE_CONFLICT,
            Self::Internal(_) => CODE_INTERNAL,
        }
    }
}

/// Async document store interface.
///
/// `get_by_id` and the list queries exclude soft-deleted documents;
/// `restore` is the only operation addressing a deleted row.
#[async_trait::async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get_by_id(&self, id: DocumentId) -> Result<Option<Document>, StoreError>;

    async fn create(&self, document: &Document) -> Result<(), StoreError>;

    async fn update(&self, id: DocumentId, patch: &DocumentPatch) -> Result<(), StoreError>;

    async fn move_to(
        &self,
        id: DocumentId,
        new_parent_id: Option<DocumentId>,
        position: i32,
    ) -> Result<(), StoreError>;

    async fn soft_delete(&self, id: DocumentId, actor: &str) -> Result<(), StoreError>;

    async fn restore(&self, id: DocumentId) -> Result<(), StoreError>;

    async fn list_by_project(
        &self,
        project_id: ProjectId,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Document>, StoreError>;

    /// Apply all mutations as one all-or-nothing commit. On error, no
    /// mutation may be visible.
    async fn apply_atomic(&self, mutations: &[Mutation]) -> Result<(), StoreError>;

    async fn health(&self) -> Result<(), StoreError>;

    /// Apply one mutation, dispatching to the matching operation.
    async fn apply(&self, mutation: &Mutation) -> Result<(), StoreError> {
        match mutation {
            Mutation::Create { document } => self.create(document).await,
            Mutation::Update { id, patch } => self.update(*id, patch).await,
            Mutation::Move {
                id,
                new_parent_id,
                position,
            } => self.move_to(*id, *new_parent_id, *position).await,
            Mutation::SoftDelete { id, actor } => self.soft_delete(*id, actor).await,
            Mutation::Restore { id } => self.restore(*id).await,
        }
    }
}

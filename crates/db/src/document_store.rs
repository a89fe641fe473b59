//! Postgres implementation of the `DocumentStore` contract.
//!
//! Standard-atomic batches rely on [`PgDocumentStore::apply_atomic`]
//! running every mutation inside one transaction, so a failure leaves
//! nothing visible.

use scribe_core::document::{Document, DocumentPatch, Mutation};
use scribe_core::store::{DocumentStore, StoreError};
use scribe_core::types::{DocumentId, ProjectId};
use sqlx::PgExecutor;

use crate::repositories::document_repo::{
    exec_create, exec_move, exec_restore, exec_soft_delete, exec_update, DocumentRepo,
};
use crate::DbPool;

/// Document store backed by the `documents` table.
pub struct PgDocumentStore {
    pool: DbPool,
}

impl PgDocumentStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

/// Classify sqlx failures into the store's stable error taxonomy.
fn map_sqlx_err(err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::PoolTimedOut => StoreError::Timeout("connection pool timed out".to_string()),
        sqlx::Error::Io(e) => StoreError::Unavailable(e.to_string()),
        sqlx::Error::Database(ref db) if db.is_unique_violation() => {
            StoreError::Conflict(err.to_string())
        }
        other => StoreError::Internal(other.to_string()),
    }
}

/// Apply one mutation through the given executor, mapping a zero-row
/// update to `NotFound`.
async fn apply_mutation<'e, E>(executor: E, mutation: &Mutation) -> Result<(), StoreError>
where
    E: PgExecutor<'e>,
{
    let affected = match mutation {
        Mutation::Create { document } => exec_create(executor, document).await,
        Mutation::Update { id, patch } => exec_update(executor, *id, patch).await,
        Mutation::Move {
            id,
            new_parent_id,
            position,
        } => exec_move(executor, *id, *new_parent_id, *position).await,
        Mutation::SoftDelete { id, actor } => exec_soft_delete(executor, *id, actor).await,
        Mutation::Restore { id } => exec_restore(executor, *id).await,
    }
    .map_err(map_sqlx_err)?;

    if affected == 0 {
        return Err(StoreError::NotFound(mutation.target()));
    }
    Ok(())
}

#[async_trait::async_trait]
impl DocumentStore for PgDocumentStore {
    async fn get_by_id(&self, id: DocumentId) -> Result<Option<Document>, StoreError> {
        let row = DocumentRepo::find_by_id(&self.pool, id)
            .await
            .map_err(map_sqlx_err)?;
        Ok(row.map(Document::from))
    }

    async fn create(&self, document: &Document) -> Result<(), StoreError> {
        apply_mutation(
            &self.pool,
            &Mutation::Create {
                document: document.clone(),
            },
        )
        .await
    }

    async fn update(&self, id: DocumentId, patch: &DocumentPatch) -> Result<(), StoreError> {
        apply_mutation(
            &self.pool,
            &Mutation::Update {
                id,
                patch: patch.clone(),
            },
        )
        .await
    }

    async fn move_to(
        &self,
        id: DocumentId,
        new_parent_id: Option<DocumentId>,
        position: i32,
    ) -> Result<(), StoreError> {
        apply_mutation(
            &self.pool,
            &Mutation::Move {
                id,
                new_parent_id,
                position,
            },
        )
        .await
    }

    async fn soft_delete(&self, id: DocumentId, actor: &str) -> Result<(), StoreError> {
        apply_mutation(
            &self.pool,
            &Mutation::SoftDelete {
                id,
                actor: actor.to_string(),
            },
        )
        .await
    }

    async fn restore(&self, id: DocumentId) -> Result<(), StoreError> {
        apply_mutation(&self.pool, &Mutation::Restore { id }).await
    }

    async fn list_by_project(
        &self,
        project_id: ProjectId,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Document>, StoreError> {
        let rows = DocumentRepo::list_by_project(&self.pool, project_id, limit, offset)
            .await
            .map_err(map_sqlx_err)?;
        Ok(rows.into_iter().map(Document::from).collect())
    }

    async fn apply_atomic(&self, mutations: &[Mutation]) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_err)?;
        for mutation in mutations {
            apply_mutation(&mut *tx, mutation).await?;
        }
        tx.commit().await.map_err(map_sqlx_err)?;
        Ok(())
    }

    async fn health(&self) -> Result<(), StoreError> {
        sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_err)?;
        Ok(())
    }
}

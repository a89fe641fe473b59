//! Repository for the `documents` table.
//!
//! This is the boundary of the document store collaborator: the engine
//! only reaches it through the `DocumentStore` trait implemented in
//! [`crate::document_store`]. Mutation helpers are generic over the
//! executor so the adapter can run them inside one transaction for
//! all-or-nothing commits.

use scribe_core::document::{Document, DocumentPatch};
use scribe_core::types::{DocumentId, ProjectId};
use sqlx::{PgExecutor, PgPool};

use crate::models::document::DocumentRow;

/// Column list for `documents` queries.
const COLUMNS: &str = "\
    id, project_id, parent_id, position, title, fields, version, \
    deleted_at, deleted_by, created_at, updated_at";

/// Provides CRUD operations for documents. Read paths exclude
/// soft-deleted rows; `restore` is the only operation addressing one.
pub struct DocumentRepo;

impl DocumentRepo {
    /// Find a live document by ID.
    pub async fn find_by_id(
        pool: &PgPool,
        id: DocumentId,
    ) -> Result<Option<DocumentRow>, sqlx::Error> {
        let query =
            format!("SELECT {COLUMNS} FROM documents WHERE id = $1 AND deleted_at IS NULL");
        sqlx::query_as::<_, DocumentRow>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// List a project's live documents in tree order.
    pub async fn list_by_project(
        pool: &PgPool,
        project_id: ProjectId,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<DocumentRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM documents \
             WHERE project_id = $1 AND deleted_at IS NULL \
             ORDER BY parent_id NULLS FIRST, position ASC, id ASC \
             LIMIT $2 OFFSET $3"
        );
        sqlx::query_as::<_, DocumentRow>(&query)
            .bind(project_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await
    }
}

/// Insert a document row with the caller-supplied id and timestamps.
pub async fn exec_create<'e, E>(executor: E, document: &Document) -> Result<u64, sqlx::Error>
where
    E: PgExecutor<'e>,
{
    let result = sqlx::query(
        "INSERT INTO documents \
            (id, project_id, parent_id, position, title, fields, version, \
             created_at, updated_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
    )
    .bind(document.id)
    .bind(document.project_id)
    .bind(document.parent_id)
    .bind(document.position)
    .bind(&document.title)
    .bind(&document.fields)
    .bind(document.version)
    .bind(document.created_at)
    .bind(document.updated_at)
    .execute(executor)
    .await?;
    Ok(result.rows_affected())
}

/// Patch title/fields of a live document, bumping its version.
pub async fn exec_update<'e, E>(
    executor: E,
    id: DocumentId,
    patch: &DocumentPatch,
) -> Result<u64, sqlx::Error>
where
    E: PgExecutor<'e>,
{
    let result = sqlx::query(
        "UPDATE documents \
         SET title = COALESCE($2, title), fields = COALESCE($3, fields), \
             version = version + 1, updated_at = NOW() \
         WHERE id = $1 AND deleted_at IS NULL",
    )
    .bind(id)
    .bind(&patch.title)
    .bind(&patch.fields)
    .execute(executor)
    .await?;
    Ok(result.rows_affected())
}

/// Reparent/reposition a live document, bumping its version.
pub async fn exec_move<'e, E>(
    executor: E,
    id: DocumentId,
    new_parent_id: Option<DocumentId>,
    position: i32,
) -> Result<u64, sqlx::Error>
where
    E: PgExecutor<'e>,
{
    let result = sqlx::query(
        "UPDATE documents \
         SET parent_id = $2, position = $3, version = version + 1, updated_at = NOW() \
         WHERE id = $1 AND deleted_at IS NULL",
    )
    .bind(id)
    .bind(new_parent_id)
    .bind(position)
    .execute(executor)
    .await?;
    Ok(result.rows_affected())
}

/// Soft-delete a live document, recording the acting user.
pub async fn exec_soft_delete<'e, E>(
    executor: E,
    id: DocumentId,
    actor: &str,
) -> Result<u64, sqlx::Error>
where
    E: PgExecutor<'e>,
{
    let result = sqlx::query(
        "UPDATE documents \
         SET deleted_at = NOW(), deleted_by = $2, version = version + 1, \
             updated_at = NOW() \
         WHERE id = $1 AND deleted_at IS NULL",
    )
    .bind(id)
    .bind(actor)
    .execute(executor)
    .await?;
    Ok(result.rows_affected())
}

/// Bring a soft-deleted document back.
pub async fn exec_restore<'e, E>(executor: E, id: DocumentId) -> Result<u64, sqlx::Error>
where
    E: PgExecutor<'e>,
{
    let result = sqlx::query(
        "UPDATE documents \
         SET deleted_at = NULL, deleted_by = NULL, version = version + 1, \
             updated_at = NOW() \
         WHERE id = $1 AND deleted_at IS NOT NULL",
    )
    .bind(id)
    .execute(executor)
    .await?;
    Ok(result.rows_affected())
}

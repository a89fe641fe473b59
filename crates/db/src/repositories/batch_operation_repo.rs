//! Repository for the `batch_operations` and `batch_operation_items`
//! tables.

use scribe_core::types::DbId;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::batch_operation::{BatchOperation, BatchOperationItem, CreateBatchOperation};

/// Column list for `batch_operations` queries.
const COLUMNS: &str = "\
    id, project_id, client_request_id, op_type, original_target_ids, \
    target_ids, payload, atomic, conflict_policy, expected_versions, \
    retry_policy, execution_mode, status, preflight_summary, \
    error_code, error_message, created_by, started_at, finished_at, \
    created_at, updated_at";

/// Column list for `batch_operation_items` queries.
const ITEM_COLUMNS: &str = "\
    id, batch_operation_id, target_id, status, error_code, error_message, \
    retryable, retry_count, started_at, completed_at, created_at, updated_at";

/// Item statuses that still admit transitions. Terminal items are never
/// updated again; the guard enforces monotonicity at the SQL level.
const OPEN_ITEM_STATUSES: &str = "('pending', 'processing')";

/// Provides CRUD operations for batch operations and their items.
pub struct BatchOperationRepo;

impl BatchOperationRepo {
    /// Insert a new batch operation record, returning the created row.
    pub async fn create(
        pool: &PgPool,
        input: &CreateBatchOperation,
    ) -> Result<BatchOperation, sqlx::Error> {
        let query = format!(
            "INSERT INTO batch_operations \
                (project_id, client_request_id, op_type, original_target_ids, \
                 target_ids, payload, atomic, conflict_policy, expected_versions, \
                 retry_policy, execution_mode, status, preflight_summary, \
                 error_code, error_message, created_by) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, BatchOperation>(&query)
            .bind(input.project_id)
            .bind(&input.client_request_id)
            .bind(&input.op_type)
            .bind(&input.original_target_ids)
            .bind(&input.target_ids)
            .bind(&input.payload)
            .bind(input.atomic)
            .bind(&input.conflict_policy)
            .bind(&input.expected_versions)
            .bind(&input.retry_policy)
            .bind(&input.execution_mode)
            .bind(&input.status)
            .bind(&input.preflight_summary)
            .bind(&input.error_code)
            .bind(&input.error_message)
            .bind(&input.created_by)
            .fetch_one(pool)
            .await
    }

    /// Insert one pending item per target, in submission order.
    pub async fn insert_items(
        pool: &PgPool,
        batch_operation_id: DbId,
        target_ids: &[Uuid],
    ) -> Result<Vec<BatchOperationItem>, sqlx::Error> {
        let query = format!(
            "INSERT INTO batch_operation_items (batch_operation_id, target_id) \
             SELECT $1, t.target_id FROM UNNEST($2::uuid[]) AS t(target_id) \
             RETURNING {ITEM_COLUMNS}"
        );
        sqlx::query_as::<_, BatchOperationItem>(&query)
            .bind(batch_operation_id)
            .bind(target_ids)
            .fetch_all(pool)
            .await
    }

    /// Find a single batch operation by ID.
    pub async fn find_by_id(
        pool: &PgPool,
        id: DbId,
    ) -> Result<Option<BatchOperation>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM batch_operations WHERE id = $1");
        sqlx::query_as::<_, BatchOperation>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Find a batch operation by its idempotency key within a project.
    pub async fn find_by_client_request_id(
        pool: &PgPool,
        project_id: Uuid,
        client_request_id: &str,
    ) -> Result<Option<BatchOperation>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM batch_operations \
             WHERE project_id = $1 AND client_request_id = $2"
        );
        sqlx::query_as::<_, BatchOperation>(&query)
            .bind(project_id)
            .bind(client_request_id)
            .fetch_optional(pool)
            .await
    }

    /// Update the status of a batch operation.
    pub async fn update_status(
        pool: &PgPool,
        id: DbId,
        status: &str,
    ) -> Result<Option<BatchOperation>, sqlx::Error> {
        let query = format!(
            "UPDATE batch_operations SET status = $2, updated_at = NOW() \
             WHERE id = $1 RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, BatchOperation>(&query)
            .bind(id)
            .bind(status)
            .fetch_optional(pool)
            .await
    }

    /// Transition a batch into execution: set status and `started_at`.
    pub async fn mark_started(
        pool: &PgPool,
        id: DbId,
        status: &str,
    ) -> Result<Option<BatchOperation>, sqlx::Error> {
        let query = format!(
            "UPDATE batch_operations \
             SET status = $2, started_at = NOW(), updated_at = NOW() \
             WHERE id = $1 RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, BatchOperation>(&query)
            .bind(id)
            .bind(status)
            .fetch_optional(pool)
            .await
    }

    /// Record the final status, error, and result summary of a batch.
    pub async fn mark_finished(
        pool: &PgPool,
        id: DbId,
        status: &str,
        error_code: Option<&str>,
        error_message: Option<&str>,
        preflight_summary: &serde_json::Value,
    ) -> Result<Option<BatchOperation>, sqlx::Error> {
        let query = format!(
            "UPDATE batch_operations \
             SET status = $2, error_code = $3, error_message = $4, \
                 preflight_summary = $5, finished_at = NOW(), updated_at = NOW() \
             WHERE id = $1 RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, BatchOperation>(&query)
            .bind(id)
            .bind(status)
            .bind(error_code)
            .bind(error_message)
            .bind(preflight_summary)
            .fetch_optional(pool)
            .await
    }

    /// Atomically claim the oldest pending batch operation and move it to
    /// running.
    ///
    /// Uses `SELECT FOR UPDATE SKIP LOCKED` so concurrent worker processes
    /// never double-execute one batch.
    pub async fn claim_next_pending(pool: &PgPool) -> Result<Option<BatchOperation>, sqlx::Error> {
        let query = format!(
            "UPDATE batch_operations \
             SET status = 'running', started_at = NOW(), updated_at = NOW() \
             WHERE id = ( \
                 SELECT id FROM batch_operations \
                 WHERE status = 'pending' \
                 ORDER BY created_at ASC, id ASC \
                 LIMIT 1 \
                 FOR UPDATE SKIP LOCKED \
             ) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, BatchOperation>(&query)
            .fetch_optional(pool)
            .await
    }

    /// List a project's batch operations, newest first.
    pub async fn list_by_project(
        pool: &PgPool,
        project_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<BatchOperation>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM batch_operations \
             WHERE project_id = $1 \
             ORDER BY created_at DESC \
             LIMIT $2 OFFSET $3"
        );
        sqlx::query_as::<_, BatchOperation>(&query)
            .bind(project_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await
    }

    /// List a project's batch operations filtered by status.
    pub async fn list_by_project_and_status(
        pool: &PgPool,
        project_id: Uuid,
        status: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<BatchOperation>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM batch_operations \
             WHERE project_id = $1 AND status = $2 \
             ORDER BY created_at DESC \
             LIMIT $3 OFFSET $4"
        );
        sqlx::query_as::<_, BatchOperation>(&query)
            .bind(project_id)
            .bind(status)
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await
    }

    /// List a project's batch operations filtered by operation type.
    pub async fn list_by_project_and_type(
        pool: &PgPool,
        project_id: Uuid,
        op_type: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<BatchOperation>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM batch_operations \
             WHERE project_id = $1 AND op_type = $2 \
             ORDER BY created_at DESC \
             LIMIT $3 OFFSET $4"
        );
        sqlx::query_as::<_, BatchOperation>(&query)
            .bind(project_id)
            .bind(op_type)
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await
    }

    // ── Items ─────────────────────────────────────────────────────────

    /// List a batch's items in submission order.
    pub async fn list_items(
        pool: &PgPool,
        batch_operation_id: DbId,
    ) -> Result<Vec<BatchOperationItem>, sqlx::Error> {
        let query = format!(
            "SELECT {ITEM_COLUMNS} FROM batch_operation_items \
             WHERE batch_operation_id = $1 \
             ORDER BY id ASC"
        );
        sqlx::query_as::<_, BatchOperationItem>(&query)
            .bind(batch_operation_id)
            .fetch_all(pool)
            .await
    }

    /// Move an item into processing, recording `started_at`. No-op for
    /// items already in a terminal state.
    pub async fn mark_item_processing(
        pool: &PgPool,
        batch_operation_id: DbId,
        target_id: Uuid,
    ) -> Result<(), sqlx::Error> {
        let query = format!(
            "UPDATE batch_operation_items \
             SET status = 'processing', started_at = NOW(), updated_at = NOW() \
             WHERE batch_operation_id = $1 AND target_id = $2 \
               AND status IN {OPEN_ITEM_STATUSES}"
        );
        sqlx::query(&query)
            .bind(batch_operation_id)
            .bind(target_id)
            .execute(pool)
            .await?;
        Ok(())
    }

    /// Move an item into a terminal state with its error detail and retry
    /// bookkeeping. No-op for items already terminal.
    #[allow(clippy::too_many_arguments)]
    pub async fn mark_item_finished(
        pool: &PgPool,
        batch_operation_id: DbId,
        target_id: Uuid,
        status: &str,
        error_code: Option<&str>,
        error_message: Option<&str>,
        retryable: bool,
        retry_count: i32,
    ) -> Result<(), sqlx::Error> {
        let query = format!(
            "UPDATE batch_operation_items \
             SET status = $3, error_code = $4, error_message = $5, \
                 retryable = $6, retry_count = $7, completed_at = NOW(), \
                 updated_at = NOW() \
             WHERE batch_operation_id = $1 AND target_id = $2 \
               AND status IN {OPEN_ITEM_STATUSES}"
        );
        sqlx::query(&query)
            .bind(batch_operation_id)
            .bind(target_id)
            .bind(status)
            .bind(error_code)
            .bind(error_message)
            .bind(retryable)
            .bind(retry_count)
            .execute(pool)
            .await?;
        Ok(())
    }
}

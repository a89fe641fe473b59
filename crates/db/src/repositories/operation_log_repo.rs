//! Repository for the append-only `operation_logs` table.
//!
//! Entries are created once and mutated only by status transitions;
//! there is deliberately no update-content or delete method.

use scribe_core::types::DbId;
use sqlx::PgPool;

use crate::models::operation_log::{CreateOperationLog, OperationLog};

/// Column list for `operation_logs` queries.
const COLUMNS: &str = "\
    id, chain_id, project_id, user_id, batch_operation_id, command_type, \
    target_ids, command_payload, inverse_commands, status, is_committed, \
    undone_at, redone_at, created_at, updated_at";

/// Provides append and status-transition operations for the undo ledger.
pub struct OperationLogRepo;

impl OperationLogRepo {
    /// Append a new ledger entry, returning the created row.
    pub async fn append(
        pool: &PgPool,
        input: &CreateOperationLog,
    ) -> Result<OperationLog, sqlx::Error> {
        let query = format!(
            "INSERT INTO operation_logs \
                (chain_id, project_id, user_id, batch_operation_id, command_type, \
                 target_ids, command_payload, inverse_commands, status, is_committed) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, OperationLog>(&query)
            .bind(input.chain_id)
            .bind(input.project_id)
            .bind(&input.user_id)
            .bind(input.batch_operation_id)
            .bind(&input.command_type)
            .bind(&input.target_ids)
            .bind(&input.command_payload)
            .bind(&input.inverse_commands)
            .bind(&input.status)
            .bind(input.is_committed)
            .fetch_one(pool)
            .await
    }

    /// Find a ledger entry by ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<OperationLog>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM operation_logs WHERE id = $1");
        sqlx::query_as::<_, OperationLog>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// List a chain's entries in creation order. Undo walks the result in
    /// reverse.
    pub async fn list_chain(pool: &PgPool, chain_id: DbId) -> Result<Vec<OperationLog>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM operation_logs \
             WHERE chain_id = $1 \
             ORDER BY created_at ASC, id ASC"
        );
        sqlx::query_as::<_, OperationLog>(&query)
            .bind(chain_id)
            .fetch_all(pool)
            .await
    }

    /// Transition an entry to undone. Guarded so an entry is only undone
    /// from an executed or redone state.
    pub async fn mark_undone(pool: &PgPool, id: DbId) -> Result<Option<OperationLog>, sqlx::Error> {
        let query = format!(
            "UPDATE operation_logs \
             SET status = 'undone', undone_at = NOW(), updated_at = NOW() \
             WHERE id = $1 AND status IN ('executed', 'redone') \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, OperationLog>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Transition an entry to redone. Guarded so only undone entries move.
    pub async fn mark_redone(pool: &PgPool, id: DbId) -> Result<Option<OperationLog>, sqlx::Error> {
        let query = format!(
            "UPDATE operation_logs \
             SET status = 'redone', redone_at = NOW(), updated_at = NOW() \
             WHERE id = $1 AND status = 'undone' \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, OperationLog>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }
}

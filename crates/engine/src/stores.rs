//! Persistence seams for engine state and the undo ledger.
//!
//! The orchestrator depends on these traits, not on `sqlx` directly, so
//! tests can drive it with in-memory doubles. The Postgres
//! implementations delegate to the `scribe-db` repositories.

use async_trait::async_trait;
use scribe_core::types::DbId;
use scribe_db::models::batch_operation::{
    BatchOperation, BatchOperationItem, CreateBatchOperation,
};
use scribe_db::models::operation_log::{CreateOperationLog, OperationLog};
use scribe_db::repositories::{BatchOperationRepo, OperationLogRepo};
use scribe_db::DbPool;
use uuid::Uuid;

use crate::error::EngineError;

/// Persistence for batch operations and their items.
#[async_trait]
pub trait BatchStore: Send + Sync {
    async fn create(&self, input: &CreateBatchOperation) -> Result<BatchOperation, EngineError>;

    async fn insert_items(
        &self,
        batch_operation_id: DbId,
        target_ids: &[Uuid],
    ) -> Result<Vec<BatchOperationItem>, EngineError>;

    async fn find_by_id(&self, id: DbId) -> Result<Option<BatchOperation>, EngineError>;

    async fn find_by_client_request_id(
        &self,
        project_id: Uuid,
        client_request_id: &str,
    ) -> Result<Option<BatchOperation>, EngineError>;

    async fn update_status(&self, id: DbId, status: &str) -> Result<(), EngineError>;

    async fn mark_started(&self, id: DbId, status: &str) -> Result<(), EngineError>;

    async fn mark_finished(
        &self,
        id: DbId,
        status: &str,
        error_code: Option<&str>,
        error_message: Option<&str>,
        preflight_summary: &serde_json::Value,
    ) -> Result<(), EngineError>;

    /// Atomically claim the oldest pending batch, moving it to running.
    async fn claim_next_pending(&self) -> Result<Option<BatchOperation>, EngineError>;

    async fn list_by_project(
        &self,
        project_id: Uuid,
        status: Option<&str>,
        op_type: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<BatchOperation>, EngineError>;

    async fn list_items(
        &self,
        batch_operation_id: DbId,
    ) -> Result<Vec<BatchOperationItem>, EngineError>;

    /// Best-effort progress write; a no-op for items already terminal.
    async fn mark_item_processing(
        &self,
        batch_operation_id: DbId,
        target_id: Uuid,
    ) -> Result<(), EngineError>;

    /// Terminal item transition; a no-op for items already terminal.
    #[allow(clippy::too_many_arguments)]
    async fn mark_item_finished(
        &self,
        batch_operation_id: DbId,
        target_id: Uuid,
        status: &str,
        error_code: Option<&str>,
        error_message: Option<&str>,
        retryable: bool,
        retry_count: i32,
    ) -> Result<(), EngineError>;
}

/// Persistence for the append-only undo ledger.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn append(&self, input: &CreateOperationLog) -> Result<OperationLog, EngineError>;

    /// A chain's entries in creation order; undo walks the reverse.
    async fn list_chain(&self, chain_id: DbId) -> Result<Vec<OperationLog>, EngineError>;

    async fn mark_undone(&self, id: DbId) -> Result<(), EngineError>;

    async fn mark_redone(&self, id: DbId) -> Result<(), EngineError>;
}

// ---------------------------------------------------------------------------
// Postgres implementations
// ---------------------------------------------------------------------------

/// [`BatchStore`] backed by the `batch_operations` tables.
pub struct PgBatchStore {
    pool: DbPool,
}

impl PgBatchStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BatchStore for PgBatchStore {
    async fn create(&self, input: &CreateBatchOperation) -> Result<BatchOperation, EngineError> {
        Ok(BatchOperationRepo::create(&self.pool, input).await?)
    }

    async fn insert_items(
        &self,
        batch_operation_id: DbId,
        target_ids: &[Uuid],
    ) -> Result<Vec<BatchOperationItem>, EngineError> {
        Ok(BatchOperationRepo::insert_items(&self.pool, batch_operation_id, target_ids).await?)
    }

    async fn find_by_id(&self, id: DbId) -> Result<Option<BatchOperation>, EngineError> {
        Ok(BatchOperationRepo::find_by_id(&self.pool, id).await?)
    }

    async fn find_by_client_request_id(
        &self,
        project_id: Uuid,
        client_request_id: &str,
    ) -> Result<Option<BatchOperation>, EngineError> {
        Ok(BatchOperationRepo::find_by_client_request_id(
            &self.pool,
            project_id,
            client_request_id,
        )
        .await?)
    }

    async fn update_status(&self, id: DbId, status: &str) -> Result<(), EngineError> {
        BatchOperationRepo::update_status(&self.pool, id, status).await?;
        Ok(())
    }

    async fn mark_started(&self, id: DbId, status: &str) -> Result<(), EngineError> {
        BatchOperationRepo::mark_started(&self.pool, id, status).await?;
        Ok(())
    }

    async fn mark_finished(
        &self,
        id: DbId,
        status: &str,
        error_code: Option<&str>,
        error_message: Option<&str>,
        preflight_summary: &serde_json::Value,
    ) -> Result<(), EngineError> {
        BatchOperationRepo::mark_finished(
            &self.pool,
            id,
            status,
            error_code,
            error_message,
            preflight_summary,
        )
        .await?;
        Ok(())
    }

    async fn claim_next_pending(&self) -> Result<Option<BatchOperation>, EngineError> {
        Ok(BatchOperationRepo::claim_next_pending(&self.pool).await?)
    }

    async fn list_by_project(
        &self,
        project_id: Uuid,
        status: Option<&str>,
        op_type: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<BatchOperation>, EngineError> {
        let ops = match (status, op_type) {
            (Some(status), _) => {
                BatchOperationRepo::list_by_project_and_status(
                    &self.pool, project_id, status, limit, offset,
                )
                .await?
            }
            (None, Some(op_type)) => {
                BatchOperationRepo::list_by_project_and_type(
                    &self.pool, project_id, op_type, limit, offset,
                )
                .await?
            }
            (None, None) => {
                BatchOperationRepo::list_by_project(&self.pool, project_id, limit, offset).await?
            }
        };
        Ok(ops)
    }

    async fn list_items(
        &self,
        batch_operation_id: DbId,
    ) -> Result<Vec<BatchOperationItem>, EngineError> {
        Ok(BatchOperationRepo::list_items(&self.pool, batch_operation_id).await?)
    }

    async fn mark_item_processing(
        &self,
        batch_operation_id: DbId,
        target_id: Uuid,
    ) -> Result<(), EngineError> {
        BatchOperationRepo::mark_item_processing(&self.pool, batch_operation_id, target_id)
            .await?;
        Ok(())
    }

    async fn mark_item_finished(
        &self,
        batch_operation_id: DbId,
        target_id: Uuid,
        status: &str,
        error_code: Option<&str>,
        error_message: Option<&str>,
        retryable: bool,
        retry_count: i32,
    ) -> Result<(), EngineError> {
        BatchOperationRepo::mark_item_finished(
            &self.pool,
            batch_operation_id,
            target_id,
            status,
            error_code,
            error_message,
            retryable,
            retry_count,
        )
        .await?;
        Ok(())
    }
}

/// [`LedgerStore`] backed by the `operation_logs` table.
pub struct PgLedgerStore {
    pool: DbPool,
}

impl PgLedgerStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    async fn append(&self, input: &CreateOperationLog) -> Result<OperationLog, EngineError> {
        Ok(OperationLogRepo::append(&self.pool, input).await?)
    }

    async fn list_chain(&self, chain_id: DbId) -> Result<Vec<OperationLog>, EngineError> {
        Ok(OperationLogRepo::list_chain(&self.pool, chain_id).await?)
    }

    async fn mark_undone(&self, id: DbId) -> Result<(), EngineError> {
        OperationLogRepo::mark_undone(&self.pool, id).await?;
        Ok(())
    }

    async fn mark_redone(&self, id: DbId) -> Result<(), EngineError> {
        OperationLogRepo::mark_redone(&self.pool, id).await?;
        Ok(())
    }
}

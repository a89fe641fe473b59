//! Operation orchestrator: submit -> preflight -> choose strategy ->
//! execute -> (cancel | undo | redo) -> report progress.
//!
//! Each batch executes as a single sequential worker; item order is the
//! submission order, and saga compensation replays recorded inverses in
//! the exact reverse of it. Distinct batches may run concurrently.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use scribe_core::batch::{
    self, state_machine, BatchOperationType, BatchStatus, ConflictPolicy, ExecutionMode,
    ItemStatus, PreflightSummary,
};
use scribe_core::command::{self, CommandPayload, InverseCommand};
use scribe_core::retry::RetryPolicy;
use scribe_core::store::{DocumentStore, StoreError};
use scribe_core::types::{DbId, DocumentId, ProjectId, Timestamp};
use scribe_db::models::batch_operation::{BatchOperation, CreateBatchOperation};
use scribe_db::models::operation_log::CreateOperationLog;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use uuid::Uuid;
use validator::Validate;

use crate::error::EngineError;
use crate::events::{self, EngineEvent, EventSink};
use crate::preflight::{PreflightOptions, TargetResolver};
use crate::stores::{BatchStore, LedgerStore};

/// Default page size for operation listings.
const DEFAULT_LIMIT: i64 = 50;

/// Maximum page size for operation listings.
const MAX_LIMIT: i64 = 100;

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

/// A request to apply one operation to a set of target documents.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SubmitBatchRequest {
    pub project_id: ProjectId,
    pub op_type: BatchOperationType,
    #[validate(length(min = 1, max = 1000))]
    pub target_ids: Vec<String>,
    pub payload: CommandPayload,
    /// When set, ids whose direct parent is also targeted are pruned
    /// (the ancestor covers the subtree).
    #[serde(default)]
    pub include_descendants: bool,
    pub atomic: bool,
    #[serde(default)]
    pub conflict_policy: ConflictPolicy,
    /// Optimistic checks: raw target id -> expected stored version.
    #[serde(default)]
    pub expected_versions: HashMap<String, i64>,
    /// Idempotency key: resubmitting with the same key returns the
    /// existing batch unchanged.
    #[validate(length(min = 1, max = 128))]
    pub client_request_id: Option<String>,
    pub retry_policy: Option<RetryPolicy>,
    pub created_by: String,
}

/// Read-only projection of a batch's progress.
#[derive(Debug, Clone, Serialize)]
pub struct BatchProgress {
    pub batch_operation_id: DbId,
    pub status: String,
    pub total_items: usize,
    pub pending_items: usize,
    pub processing_items: usize,
    pub succeeded_items: usize,
    pub failed_items: usize,
    pub skipped_items: usize,
    pub cancelled_items: usize,
    pub started_at: Option<Timestamp>,
    pub finished_at: Option<Timestamp>,
}

/// Filters for listing a project's batch operations.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListOperationsQuery {
    pub status: Option<BatchStatus>,
    pub op_type: Option<BatchOperationType>,
    /// Maximum number of results. Defaults to 50, capped at 100.
    pub limit: Option<i64>,
    /// Number of results to skip. Defaults to 0.
    pub offset: Option<i64>,
}

/// A failed item attempt with its retry bookkeeping.
struct ItemFailure {
    error: StoreError,
    attempts: u32,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Owns the batch operation lifecycle.
pub struct BatchEngine {
    documents: Arc<dyn DocumentStore>,
    batches: Arc<dyn BatchStore>,
    ledger: Arc<dyn LedgerStore>,
    events: Arc<dyn EventSink>,
    resolver: TargetResolver,
    default_retry: RetryPolicy,
    /// Cooperative cancellation flags keyed by batch id; checked between
    /// items, never mid-mutation.
    cancellations: Mutex<HashMap<DbId, Arc<AtomicBool>>>,
}

impl BatchEngine {
    pub fn new(
        documents: Arc<dyn DocumentStore>,
        batches: Arc<dyn BatchStore>,
        ledger: Arc<dyn LedgerStore>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            resolver: TargetResolver::new(documents.clone()),
            documents,
            batches,
            ledger,
            events,
            default_retry: RetryPolicy::default(),
            cancellations: Mutex::new(HashMap::new()),
        }
    }

    /// Replace the engine-wide retry default applied to batches that do
    /// not carry their own policy.
    pub fn with_default_retry(mut self, policy: RetryPolicy) -> Self {
        self.default_retry = policy;
        self
    }

    // ── Submit ────────────────────────────────────────────────────────

    /// Validate, normalize, preflight, and persist a batch request.
    ///
    /// Atomic submissions with a failed preflight return an error without
    /// persisting a runnable batch; non-atomic submissions proceed with
    /// the valid subset.
    pub async fn submit(&self, request: SubmitBatchRequest) -> Result<BatchOperation, EngineError> {
        request
            .validate()
            .map_err(|e| EngineError::Validation(e.to_string()))?;
        batch::validate_batch_size(request.target_ids.len())?;
        if request.payload.op_type() != request.op_type {
            return Err(EngineError::Validation(format!(
                "payload type '{}' does not match operation type '{}'",
                request.payload.op_type().as_str(),
                request.op_type.as_str()
            )));
        }
        if let Some(policy) = &request.retry_policy {
            policy.validate()?;
        }

        // Idempotent resubmission: same (project, client request id)
        // returns the existing record, no duplicate processing.
        if let Some(client_request_id) = request.client_request_id.as_deref() {
            if let Some(existing) = self
                .batches
                .find_by_client_request_id(request.project_id, client_request_id)
                .await?
            {
                return Ok(existing);
            }
        }

        let normalized = self
            .resolver
            .normalize_target_ids(
                request.project_id,
                &request.target_ids,
                request.include_descendants,
            )
            .await?;
        let options = PreflightOptions {
            conflict_policy: request.conflict_policy,
            expected_versions: request.expected_versions.clone(),
        };
        let outcome = self
            .resolver
            .validate_batch_operation(request.project_id, request.op_type, &normalized, &options)
            .await?;

        if request.atomic {
            if let Some(err) = outcome.abort_error(request.conflict_policy) {
                return Err(err);
            }
        }

        let valid_ids = outcome.result.valid_ids;
        let summary = outcome.summary;

        // Nothing valid to do: persist the record directly as failed so
        // the preflight detail is kept for the caller.
        let nothing_valid = valid_ids.is_empty();
        let status = if nothing_valid {
            BatchStatus::Failed
        } else {
            BatchStatus::Pending
        };

        let input = CreateBatchOperation {
            project_id: request.project_id,
            client_request_id: request.client_request_id.clone(),
            op_type: request.op_type.as_str().to_string(),
            original_target_ids: request.target_ids.clone(),
            target_ids: valid_ids.clone(),
            payload: to_json(&request.payload)?,
            atomic: request.atomic,
            conflict_policy: request.conflict_policy.as_str().to_string(),
            expected_versions: to_json(&request.expected_versions)?,
            retry_policy: request.retry_policy.as_ref().map(to_json).transpose()?,
            execution_mode: ExecutionMode::for_target_count(valid_ids.len())
                .as_str()
                .to_string(),
            status: status.as_str().to_string(),
            preflight_summary: to_json(&summary)?,
            error_code: nothing_valid.then(|| "preflight_failed".to_string()),
            error_message: nothing_valid.then(|| "no valid targets".to_string()),
            created_by: request.created_by,
        };

        let op = self.batches.create(&input).await?;
        if !valid_ids.is_empty() {
            self.batches.insert_items(op.id, &valid_ids).await?;
        }

        self.publish(
            events::EVENT_CREATED,
            &op,
            serde_json::json!({
                "op_type": op.op_type,
                "target_count": op.target_ids.len(),
                "execution_mode": op.execution_mode,
            }),
        )
        .await;

        Ok(op)
    }

    // ── Execute ───────────────────────────────────────────────────────

    /// Execute a submitted batch. Legal only from pending/preflight.
    pub async fn execute(&self, batch_id: DbId) -> Result<(), EngineError> {
        let op = self
            .batches
            .find_by_id(batch_id)
            .await?
            .ok_or(EngineError::NotFound(batch_id))?;
        let current = BatchStatus::from_str_value(&op.status)?;
        state_machine::validate_transition(current, BatchStatus::Running).map_err(|_| {
            EngineError::IllegalState {
                id: op.id,
                status: op.status.clone(),
                action: "execute",
            }
        })?;
        self.batches
            .mark_started(op.id, BatchStatus::Running.as_str())
            .await?;
        self.run(op).await
    }

    /// Execute a batch already transitioned to running by
    /// [`BatchStore::claim_next_pending`].
    pub async fn execute_claimed(&self, op: BatchOperation) -> Result<(), EngineError> {
        self.run(op).await
    }

    /// Claim the oldest pending batch and execute it. Returns the
    /// executed batch id, or `None` when nothing is pending.
    pub async fn claim_and_execute(&self) -> Result<Option<DbId>, EngineError> {
        match self.batches.claim_next_pending().await? {
            Some(op) => {
                let id = op.id;
                self.run(op).await?;
                Ok(Some(id))
            }
            None => Ok(None),
        }
    }

    async fn run(&self, op: BatchOperation) -> Result<(), EngineError> {
        let payload: CommandPayload = serde_json::from_value(op.payload.clone())
            .map_err(|e| EngineError::Persistence(format!("deserialize payload: {e}")))?;
        let retry = self.retry_policy_for(&op)?;
        let cancel = self.cancel_flag(op.id).await;

        let exec_result = if !op.atomic {
            self.execute_independent(&op, &payload, &retry, &cancel).await
        } else {
            match ExecutionMode::from_str_value(&op.execution_mode)? {
                ExecutionMode::StandardAtomic => {
                    self.execute_standard(&op, &payload, &retry, &cancel).await
                }
                ExecutionMode::SagaAtomic => {
                    self.execute_saga(&op, &payload, &retry, &cancel).await
                }
            }
        };

        self.cancellations.lock().await.remove(&op.id);

        let (final_status, exec_err) = match exec_result {
            Ok(status) => (status, None),
            Err(err) => (BatchStatus::Failed, Some(err)),
        };

        // Fold execution results back into the stored summary. Progress
        // bookkeeping is best-effort and never fails the run.
        let mut summary: PreflightSummary =
            serde_json::from_value(op.preflight_summary.clone()).unwrap_or_default();
        match self.batches.list_items(op.id).await {
            Ok(items) => {
                summary.success_count = items
                    .iter()
                    .filter(|i| i.status == batch::ITEM_SUCCEEDED)
                    .count();
                summary.failed_count = items
                    .iter()
                    .filter(|i| i.status == batch::ITEM_FAILED)
                    .count();
            }
            Err(err) => tracing::warn!(
                batch_operation_id = op.id,
                error = %err,
                "failed to read items for result summary"
            ),
        }

        let error_code = exec_err.as_ref().map(|e| e.code());
        let error_message = exec_err.as_ref().map(|e| e.to_string());
        self.batches
            .mark_finished(
                op.id,
                final_status.as_str(),
                error_code,
                error_message.as_deref(),
                &to_json(&summary)?,
            )
            .await?;

        let event_type = match final_status {
            BatchStatus::Completed => events::EVENT_COMPLETED,
            BatchStatus::Partial => events::EVENT_PARTIAL,
            BatchStatus::Cancelled => events::EVENT_CANCELLED,
            _ => events::EVENT_FAILED,
        };
        self.publish(
            event_type,
            &op,
            serde_json::json!({
                "status": final_status.as_str(),
                "success_count": summary.success_count,
                "failed_count": summary.failed_count,
            }),
        )
        .await;

        match exec_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Standard atomic: all item mutations as one committed unit. On any
    /// failure nothing persists, so no compensation is needed.
    async fn execute_standard(
        &self,
        op: &BatchOperation,
        payload: &CommandPayload,
        retry: &RetryPolicy,
        cancel: &AtomicBool,
    ) -> Result<BatchStatus, EngineError> {
        if cancel.load(Ordering::SeqCst) {
            self.close_open_items(op, ItemStatus::Cancelled, None, None).await;
            return Ok(BatchStatus::Cancelled);
        }

        for target in &op.target_ids {
            self.item_processing(op.id, *target).await;
        }

        // Capture pre-images, then build the full mutation list up front.
        let mut mutations = Vec::with_capacity(op.target_ids.len());
        let mut inverses = Vec::with_capacity(op.target_ids.len());
        let now = Utc::now();
        for target in &op.target_ids {
            let pre = match self.documents.get_by_id(*target).await {
                Ok(Some(doc)) => doc,
                Ok(None) => {
                    return self
                        .fail_standard(op, *target, StoreError::NotFound(*target), retry, 0)
                        .await;
                }
                Err(err) => return self.fail_standard(op, *target, err, retry, 0).await,
            };
            let minted = minted_id_for(payload);
            let mutation = command::build_mutation(payload, &pre, &op.created_by, minted, now)?;
            if let Some(inverse) = command::build_inverse(payload, &pre, minted) {
                inverses.push(inverse);
            }
            mutations.push(mutation);
        }

        // The whole commit retries as a unit.
        let mut attempt = 0u32;
        loop {
            match self.documents.apply_atomic(&mutations).await {
                Ok(()) => break,
                Err(err) => {
                    if retry.should_retry(err.code()) && retry.can_retry(attempt) {
                        tokio::time::sleep(retry.retry_delay(attempt)).await;
                        attempt += 1;
                        continue;
                    }
                    let target = match &err {
                        StoreError::NotFound(id) => *id,
                        StoreError::VersionConflict { id, .. } => *id,
                        _ => op.target_ids.first().copied().unwrap_or_else(Uuid::nil),
                    };
                    return self.fail_standard(op, target, err, retry, attempt).await;
                }
            }
        }

        for target in &op.target_ids {
            self.item_succeeded(op.id, *target, attempt).await;
        }

        // One consolidated ledger entry summarizing the whole command.
        let entry = CreateOperationLog {
            chain_id: op.id,
            project_id: op.project_id,
            user_id: op.created_by.clone(),
            batch_operation_id: Some(op.id),
            command_type: op.op_type.clone(),
            target_ids: op.target_ids.clone(),
            command_payload: op.payload.clone(),
            inverse_commands: if inverses.is_empty() {
                None
            } else {
                Some(to_json(&inverses)?)
            },
            status: scribe_core::ledger::LOG_EXECUTED.to_string(),
            is_committed: true,
        };
        self.ledger.append(&entry).await?;

        Ok(BatchStatus::Completed)
    }

    /// Record a standard-mode abort: the offending item fails with its
    /// code, every other open item is skipped, nothing was committed.
    async fn fail_standard(
        &self,
        op: &BatchOperation,
        target: DocumentId,
        error: StoreError,
        retry: &RetryPolicy,
        attempts: u32,
    ) -> Result<BatchStatus, EngineError> {
        self.item_failed(op.id, target, &error, retry, attempts).await;
        self.close_open_items(op, ItemStatus::Skipped, None, None).await;
        Err(EngineError::ItemFailed {
            target_id: target,
            code: error.code().to_string(),
            source: error,
        })
    }

    /// Saga atomic: items one at a time in submission order, each commit
    /// recorded with its inverse. A failure replays the retained inverses
    /// in reverse over the already-committed prefix.
    async fn execute_saga(
        &self,
        op: &BatchOperation,
        payload: &CommandPayload,
        retry: &RetryPolicy,
        cancel: &AtomicBool,
    ) -> Result<BatchStatus, EngineError> {
        let mut committed: Vec<(DocumentId, DbId, Vec<InverseCommand>)> = Vec::new();

        for target in &op.target_ids {
            if cancel.load(Ordering::SeqCst) {
                self.close_open_items(op, ItemStatus::Cancelled, None, None).await;
                return Ok(BatchStatus::Cancelled);
            }

            self.item_processing(op.id, *target).await;
            match self.apply_item(op, payload, *target, retry).await {
                Ok((inverses, attempts)) => {
                    let entry_id = self.append_item_entry(op, *target, &inverses).await?;
                    self.item_succeeded(op.id, *target, attempts).await;
                    committed.push((*target, entry_id, inverses));
                }
                Err(failure) => {
                    self.item_failed(op.id, *target, &failure.error, retry, failure.attempts)
                        .await;

                    // Compensation: reverse order, committed items only.
                    for (comp_target, entry_id, inverses) in committed.iter().rev() {
                        for inverse in inverses.iter().rev() {
                            let mutation =
                                command::mutation_for_inverse(inverse, &op.created_by);
                            self.documents.apply(&mutation).await.map_err(|comp_err| {
                                EngineError::CompensationFailed {
                                    target_id: *comp_target,
                                    source: comp_err,
                                }
                            })?;
                        }
                        self.ledger.mark_undone(*entry_id).await?;
                    }

                    self.close_open_items(op, ItemStatus::Skipped, None, None).await;
                    return Err(EngineError::ItemFailedCompensated {
                        target_id: *target,
                        code: failure.error.code().to_string(),
                        source: failure.error,
                    });
                }
            }
        }

        Ok(BatchStatus::Completed)
    }

    /// Non-atomic: items independently, failures recorded and skipped
    /// over. Ledger entries are still written per success so the batch
    /// stays undoable.
    async fn execute_independent(
        &self,
        op: &BatchOperation,
        payload: &CommandPayload,
        retry: &RetryPolicy,
        cancel: &AtomicBool,
    ) -> Result<BatchStatus, EngineError> {
        let mut succeeded = 0usize;
        let mut failed = 0usize;

        for target in &op.target_ids {
            if cancel.load(Ordering::SeqCst) {
                self.close_open_items(op, ItemStatus::Cancelled, None, None).await;
                return Ok(BatchStatus::Cancelled);
            }

            self.item_processing(op.id, *target).await;
            match self.apply_item(op, payload, *target, retry).await {
                Ok((inverses, attempts)) => {
                    self.append_item_entry(op, *target, &inverses).await?;
                    self.item_succeeded(op.id, *target, attempts).await;
                    succeeded += 1;
                }
                Err(failure) => {
                    self.item_failed(op.id, *target, &failure.error, retry, failure.attempts)
                        .await;
                    failed += 1;
                }
            }
        }

        Ok(if failed == 0 {
            BatchStatus::Completed
        } else if succeeded == 0 {
            BatchStatus::Failed
        } else {
            BatchStatus::Partial
        })
    }

    /// Fetch the pre-image, build and apply one item's mutation under
    /// the retry policy, and return its inverses with the attempt count.
    async fn apply_item(
        &self,
        op: &BatchOperation,
        payload: &CommandPayload,
        target: DocumentId,
        retry: &RetryPolicy,
    ) -> Result<(Vec<InverseCommand>, u32), ItemFailure> {
        let pre = match self.documents.get_by_id(target).await {
            Ok(Some(doc)) => doc,
            Ok(None) => {
                return Err(ItemFailure {
                    error: StoreError::NotFound(target),
                    attempts: 0,
                })
            }
            Err(error) => return Err(ItemFailure { error, attempts: 0 }),
        };

        let minted = minted_id_for(payload);
        let mutation = command::build_mutation(payload, &pre, &op.created_by, minted, Utc::now())
            .map_err(|e| ItemFailure {
            error: StoreError::Internal(e.to_string()),
            attempts: 0,
        })?;

        let mut attempt = 0u32;
        loop {
            match self.documents.apply(&mutation).await {
                Ok(()) => {
                    let inverses: Vec<InverseCommand> =
                        command::build_inverse(payload, &pre, minted).into_iter().collect();
                    return Ok((inverses, attempt));
                }
                Err(error) => {
                    if retry.should_retry(error.code()) && retry.can_retry(attempt) {
                        tokio::time::sleep(retry.retry_delay(attempt)).await;
                        attempt += 1;
                        continue;
                    }
                    return Err(ItemFailure {
                        error,
                        attempts: attempt,
                    });
                }
            }
        }
    }

    /// Append one committed per-item ledger entry, returning its id.
    async fn append_item_entry(
        &self,
        op: &BatchOperation,
        target: DocumentId,
        inverses: &[InverseCommand],
    ) -> Result<DbId, EngineError> {
        let entry = CreateOperationLog {
            chain_id: op.id,
            project_id: op.project_id,
            user_id: op.created_by.clone(),
            batch_operation_id: Some(op.id),
            command_type: op.op_type.clone(),
            target_ids: vec![target],
            command_payload: op.payload.clone(),
            inverse_commands: if inverses.is_empty() {
                None
            } else {
                Some(to_json(&inverses)?)
            },
            status: scribe_core::ledger::LOG_EXECUTED.to_string(),
            is_committed: true,
        };
        Ok(self.ledger.append(&entry).await?.id)
    }

    // ── Cancel ────────────────────────────────────────────────────────

    /// Request cancellation of a running batch. The execution loop stops
    /// before the next item; items already committed are not rolled back.
    pub async fn cancel(&self, batch_id: DbId, user_id: &str) -> Result<(), EngineError> {
        let op = self
            .batches
            .find_by_id(batch_id)
            .await?
            .ok_or(EngineError::NotFound(batch_id))?;
        let current = BatchStatus::from_str_value(&op.status)?;
        state_machine::validate_transition(current, BatchStatus::Cancelled).map_err(|_| {
            EngineError::IllegalState {
                id: op.id,
                status: op.status.clone(),
                action: "cancel",
            }
        })?;

        self.cancel_flag(batch_id).await.store(true, Ordering::SeqCst);
        self.batches
            .update_status(batch_id, BatchStatus::Cancelled.as_str())
            .await?;

        self.publish(
            events::EVENT_CANCELLED,
            &op,
            serde_json::json!({ "cancelled_by": user_id }),
        )
        .await;
        Ok(())
    }

    // ── Undo / redo ───────────────────────────────────────────────────

    /// Replay the batch's ledger chain in reverse, applying each
    /// undoable entry's inverses. A failing inverse halts the walk;
    /// entries already undone stay undone.
    pub async fn undo(&self, batch_id: DbId, user_id: &str) -> Result<(), EngineError> {
        let op = self
            .batches
            .find_by_id(batch_id)
            .await?
            .ok_or(EngineError::NotFound(batch_id))?;
        let chain = self.ledger.list_chain(op.id).await?;

        let mut undone = 0usize;
        for entry in chain.iter().rev() {
            if !entry.is_undoable() {
                continue;
            }
            let inverses: Vec<InverseCommand> = match &entry.inverse_commands {
                Some(value) => serde_json::from_value(value.clone()).map_err(|e| {
                    EngineError::Persistence(format!("deserialize inverse commands: {e}"))
                })?,
                None => continue,
            };
            for inverse in inverses.iter().rev() {
                let mutation = command::mutation_for_inverse(inverse, user_id);
                self.documents
                    .apply(&mutation)
                    .await
                    .map_err(|source| EngineError::UndoHalted {
                        entry_id: entry.id,
                        source,
                    })?;
            }
            self.ledger.mark_undone(entry.id).await?;
            undone += 1;
        }

        if undone > 0 {
            self.publish(
                events::EVENT_UNDONE,
                &op,
                serde_json::json!({ "undone_entries": undone, "undone_by": user_id }),
            )
            .await;
        }
        Ok(())
    }

    /// Walk the chain forward and re-apply each redoable entry's
    /// original command.
    pub async fn redo(&self, batch_id: DbId, user_id: &str) -> Result<(), EngineError> {
        let op = self
            .batches
            .find_by_id(batch_id)
            .await?
            .ok_or(EngineError::NotFound(batch_id))?;
        let chain = self.ledger.list_chain(op.id).await?;

        let mut redone = 0usize;
        for entry in &chain {
            if !entry.is_redoable() {
                continue;
            }
            let payload: CommandPayload = serde_json::from_value(entry.command_payload.clone())
                .map_err(|e| EngineError::Persistence(format!("deserialize payload: {e}")))?;
            let inverses: Vec<InverseCommand> = match &entry.inverse_commands {
                Some(value) => serde_json::from_value(value.clone()).map_err(|e| {
                    EngineError::Persistence(format!("deserialize inverse commands: {e}"))
                })?,
                None => Vec::new(),
            };
            for (index, target) in entry.target_ids.iter().enumerate() {
                let inverse = inverses.get(index);
                if let Some(mutation) =
                    command::mutation_for_redo(&payload, *target, inverse, user_id)
                {
                    self.documents
                        .apply(&mutation)
                        .await
                        .map_err(|source| EngineError::RedoHalted {
                            entry_id: entry.id,
                            source,
                        })?;
                }
            }
            self.ledger.mark_redone(entry.id).await?;
            redone += 1;
        }

        if redone > 0 {
            self.publish(
                events::EVENT_REDONE,
                &op,
                serde_json::json!({ "redone_entries": redone, "redone_by": user_id }),
            )
            .await;
        }
        Ok(())
    }

    // ── Read-only projections ─────────────────────────────────────────

    /// Fetch one batch operation.
    pub async fn get_operation(&self, batch_id: DbId) -> Result<BatchOperation, EngineError> {
        self.batches
            .find_by_id(batch_id)
            .await?
            .ok_or(EngineError::NotFound(batch_id))
    }

    /// Item status counts plus timestamps; no side effects.
    pub async fn get_progress(&self, batch_id: DbId) -> Result<BatchProgress, EngineError> {
        let op = self
            .batches
            .find_by_id(batch_id)
            .await?
            .ok_or(EngineError::NotFound(batch_id))?;
        let items = self.batches.list_items(batch_id).await?;

        let count = |status: &str| items.iter().filter(|i| i.status == status).count();
        Ok(BatchProgress {
            batch_operation_id: op.id,
            status: op.status,
            total_items: items.len(),
            pending_items: count(batch::ITEM_PENDING),
            processing_items: count(batch::ITEM_PROCESSING),
            succeeded_items: count(batch::ITEM_SUCCEEDED),
            failed_items: count(batch::ITEM_FAILED),
            skipped_items: count(batch::ITEM_SKIPPED),
            cancelled_items: count(batch::ITEM_CANCELLED),
            started_at: op.started_at,
            finished_at: op.finished_at,
        })
    }

    /// List a project's batch operations, optionally filtered by status
    /// or type.
    pub async fn list_operations(
        &self,
        project_id: ProjectId,
        query: &ListOperationsQuery,
    ) -> Result<Vec<BatchOperation>, EngineError> {
        let limit = query.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
        let offset = query.offset.unwrap_or(0).max(0);
        self.batches
            .list_by_project(
                project_id,
                query.status.map(|s| s.as_str()),
                query.op_type.map(|t| t.as_str()),
                limit,
                offset,
            )
            .await
    }

    // ── Internal helpers ──────────────────────────────────────────────

    async fn cancel_flag(&self, batch_id: DbId) -> Arc<AtomicBool> {
        self.cancellations
            .lock()
            .await
            .entry(batch_id)
            .or_insert_with(|| Arc::new(AtomicBool::new(false)))
            .clone()
    }

    fn retry_policy_for(&self, op: &BatchOperation) -> Result<RetryPolicy, EngineError> {
        match &op.retry_policy {
            Some(value) => serde_json::from_value(value.clone())
                .map_err(|e| EngineError::Persistence(format!("deserialize retry policy: {e}"))),
            None => Ok(self.default_retry.clone()),
        }
    }

    async fn item_processing(&self, batch_id: DbId, target: DocumentId) {
        if let Err(err) = self.batches.mark_item_processing(batch_id, target).await {
            tracing::warn!(
                batch_operation_id = batch_id,
                target_id = %target,
                error = %err,
                "item progress update failed"
            );
        }
    }

    async fn item_succeeded(&self, batch_id: DbId, target: DocumentId, attempts: u32) {
        if let Err(err) = self
            .batches
            .mark_item_finished(
                batch_id,
                target,
                batch::ITEM_SUCCEEDED,
                None,
                None,
                false,
                attempts as i32,
            )
            .await
        {
            tracing::warn!(
                batch_operation_id = batch_id,
                target_id = %target,
                error = %err,
                "item progress update failed"
            );
        }
    }

    async fn item_failed(
        &self,
        batch_id: DbId,
        target: DocumentId,
        error: &StoreError,
        retry: &RetryPolicy,
        attempts: u32,
    ) {
        if let Err(err) = self
            .batches
            .mark_item_finished(
                batch_id,
                target,
                batch::ITEM_FAILED,
                Some(error.code()),
                Some(&error.to_string()),
                retry.should_retry(error.code()),
                attempts as i32,
            )
            .await
        {
            tracing::warn!(
                batch_operation_id = batch_id,
                target_id = %target,
                error = %err,
                "item progress update failed"
            );
        }
    }

    /// Move every still-open item to `status`. Terminal items are
    /// untouched thanks to the store-level monotonicity guard.
    async fn close_open_items(
        &self,
        op: &BatchOperation,
        status: ItemStatus,
        error_code: Option<&str>,
        error_message: Option<&str>,
    ) {
        for target in &op.target_ids {
            if let Err(err) = self
                .batches
                .mark_item_finished(
                    op.id,
                    *target,
                    status.as_str(),
                    error_code,
                    error_message,
                    false,
                    0,
                )
                .await
            {
                tracing::warn!(
                    batch_operation_id = op.id,
                    target_id = %target,
                    error = %err,
                    "item progress update failed"
                );
            }
        }
    }

    async fn publish(&self, event_type: &str, op: &BatchOperation, data: serde_json::Value) {
        let event = EngineEvent {
            event_type: event_type.to_string(),
            batch_operation_id: op.id,
            project_id: op.project_id,
            data,
            occurred_at: Utc::now(),
        };
        if let Err(err) = self.events.publish(event).await {
            tracing::warn!(
                event_type,
                batch_operation_id = op.id,
                error = %err,
                "event publish failed"
            );
        }
    }
}

/// Copy is the one operation that creates a document; mint its id up
/// front so the forward mutation and the inverse agree on it.
fn minted_id_for(payload: &CommandPayload) -> Option<DocumentId> {
    matches!(payload, CommandPayload::Copy { .. }).then(Uuid::new_v4)
}

fn to_json<T: Serialize>(value: &T) -> Result<serde_json::Value, EngineError> {
    serde_json::to_value(value).map_err(|e| EngineError::Persistence(format!("serialize: {e}")))
}

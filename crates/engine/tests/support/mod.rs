//! In-memory store doubles driving the engine integration tests.
//!
//! `MemoryDocumentStore` supports scripted per-target failures so tests
//! can exercise retry, saga compensation, and undo-halt paths without a
//! database.
#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use scribe_core::batch::BatchOperationType;
use scribe_core::command::CommandPayload;
use scribe_core::document::{Document, DocumentPatch, Mutation};
use scribe_core::store::{DocumentStore, StoreError};
use scribe_core::types::{DbId, DocumentId, ProjectId};
use scribe_db::models::batch_operation::{
    BatchOperation, BatchOperationItem, CreateBatchOperation,
};
use scribe_db::models::operation_log::{CreateOperationLog, OperationLog};
use scribe_engine::{BatchEngine, BatchStore, EngineError, LedgerStore, NoopEventSink};
use scribe_engine::engine::SubmitBatchRequest;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Document store double
// ---------------------------------------------------------------------------

/// Kinds of scripted failures.
#[derive(Debug, Clone, Copy)]
pub enum FailureKind {
    Timeout,
    Unavailable,
    Internal,
}

fn failure_error(kind: FailureKind, id: DocumentId) -> StoreError {
    match kind {
        FailureKind::Timeout => StoreError::Timeout(format!("scripted timeout for {id}")),
        FailureKind::Unavailable => {
            StoreError::Unavailable(format!("scripted outage for {id}"))
        }
        FailureKind::Internal => StoreError::Internal(format!("scripted failure for {id}")),
    }
}

/// In-memory document store with all-or-nothing `apply_atomic` and
/// scripted per-target mutation failures.
#[derive(Default)]
pub struct MemoryDocumentStore {
    docs: Mutex<HashMap<DocumentId, Document>>,
    failures: Mutex<HashMap<DocumentId, VecDeque<FailureKind>>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, doc: Document) {
        self.docs.lock().unwrap().insert(doc.id, doc);
    }

    /// Script the next `times` mutations touching `id` to fail.
    pub fn fail_next(&self, id: DocumentId, kind: FailureKind, times: usize) {
        let mut failures = self.failures.lock().unwrap();
        let queue = failures.entry(id).or_default();
        for _ in 0..times {
            queue.push_back(kind);
        }
    }

    /// Raw row access, including soft-deleted documents.
    pub fn raw(&self, id: DocumentId) -> Option<Document> {
        self.docs.lock().unwrap().get(&id).cloned()
    }

    /// True when the document exists and is not soft-deleted.
    pub fn is_live(&self, id: DocumentId) -> bool {
        self.docs
            .lock()
            .unwrap()
            .get(&id)
            .is_some_and(|d| !d.is_deleted())
    }

    /// Snapshot of a project's live documents.
    pub fn list_live_by_project(&self, project_id: ProjectId) -> Vec<Document> {
        let docs = self.docs.lock().unwrap();
        let mut out: Vec<Document> = docs
            .values()
            .filter(|d| d.project_id == project_id && !d.is_deleted())
            .cloned()
            .collect();
        out.sort_by_key(|d| (d.position, d.id));
        out
    }

    fn take_failure(&self, id: DocumentId) -> Option<StoreError> {
        self.failures
            .lock()
            .unwrap()
            .get_mut(&id)
            .and_then(|queue| queue.pop_front())
            .map(|kind| failure_error(kind, id))
    }

    fn apply_to(
        docs: &mut HashMap<DocumentId, Document>,
        mutation: &Mutation,
    ) -> Result<(), StoreError> {
        match mutation {
            Mutation::Create { document } => {
                if docs.contains_key(&document.id) {
                    return Err(StoreError::Conflict(format!(
                        "document {} already exists",
                        document.id
                    )));
                }
                docs.insert(document.id, document.clone());
                Ok(())
            }
            Mutation::Update { id, patch } => {
                let doc = live_mut(docs, *id)?;
                if let Some(title) = &patch.title {
                    doc.title = title.clone();
                }
                if let Some(fields) = &patch.fields {
                    doc.fields = fields.clone();
                }
                bump(doc);
                Ok(())
            }
            Mutation::Move {
                id,
                new_parent_id,
                position,
            } => {
                let doc = live_mut(docs, *id)?;
                doc.parent_id = *new_parent_id;
                doc.position = *position;
                bump(doc);
                Ok(())
            }
            Mutation::SoftDelete { id, actor } => {
                let doc = live_mut(docs, *id)?;
                doc.deleted_at = Some(Utc::now());
                doc.deleted_by = Some(actor.clone());
                bump(doc);
                Ok(())
            }
            Mutation::Restore { id } => match docs.get_mut(id) {
                Some(doc) if doc.is_deleted() => {
                    doc.deleted_at = None;
                    doc.deleted_by = None;
                    bump(doc);
                    Ok(())
                }
                _ => Err(StoreError::NotFound(*id)),
            },
        }
    }

    fn apply_checked(&self, mutation: &Mutation) -> Result<(), StoreError> {
        if let Some(err) = self.take_failure(mutation.target()) {
            return Err(err);
        }
        let mut docs = self.docs.lock().unwrap();
        Self::apply_to(&mut docs, mutation)
    }
}

fn live_mut(
    docs: &mut HashMap<DocumentId, Document>,
    id: DocumentId,
) -> Result<&mut Document, StoreError> {
    match docs.get_mut(&id) {
        Some(doc) if !doc.is_deleted() => Ok(doc),
        _ => Err(StoreError::NotFound(id)),
    }
}

fn bump(doc: &mut Document) {
    doc.version += 1;
    doc.updated_at = Utc::now();
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn get_by_id(&self, id: DocumentId) -> Result<Option<Document>, StoreError> {
        let docs = self.docs.lock().unwrap();
        Ok(docs.get(&id).filter(|d| !d.is_deleted()).cloned())
    }

    async fn create(&self, document: &Document) -> Result<(), StoreError> {
        self.apply_checked(&Mutation::Create {
            document: document.clone(),
        })
    }

    async fn update(&self, id: DocumentId, patch: &DocumentPatch) -> Result<(), StoreError> {
        self.apply_checked(&Mutation::Update {
            id,
            patch: patch.clone(),
        })
    }

    async fn move_to(
        &self,
        id: DocumentId,
        new_parent_id: Option<DocumentId>,
        position: i32,
    ) -> Result<(), StoreError> {
        self.apply_checked(&Mutation::Move {
            id,
            new_parent_id,
            position,
        })
    }

    async fn soft_delete(&self, id: DocumentId, actor: &str) -> Result<(), StoreError> {
        self.apply_checked(&Mutation::SoftDelete {
            id,
            actor: actor.to_string(),
        })
    }

    async fn restore(&self, id: DocumentId) -> Result<(), StoreError> {
        self.apply_checked(&Mutation::Restore { id })
    }

    async fn list_by_project(
        &self,
        project_id: ProjectId,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Document>, StoreError> {
        let docs = self.docs.lock().unwrap();
        let mut out: Vec<Document> = docs
            .values()
            .filter(|d| d.project_id == project_id && !d.is_deleted())
            .cloned()
            .collect();
        out.sort_by_key(|d| (d.position, d.id));
        Ok(out
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn apply_atomic(&self, mutations: &[Mutation]) -> Result<(), StoreError> {
        for mutation in mutations {
            if let Some(err) = self.take_failure(mutation.target()) {
                return Err(err);
            }
        }
        // Stage against a copy so a mid-sequence failure leaves nothing
        // visible.
        let mut docs = self.docs.lock().unwrap();
        let mut staged = docs.clone();
        for mutation in mutations {
            Self::apply_to(&mut staged, mutation)?;
        }
        *docs = staged;
        Ok(())
    }

    async fn health(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Batch store double
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryBatchStore {
    ops: Mutex<HashMap<DbId, BatchOperation>>,
    items: Mutex<Vec<BatchOperationItem>>,
    next_op_id: AtomicI64,
    next_item_id: AtomicI64,
}

impl MemoryBatchStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn operation_count(&self) -> usize {
        self.ops.lock().unwrap().len()
    }

    /// Move the given batch to running and return it, the way a worker
    /// claim would.
    pub fn claim_next_sync(&self, id: DbId) -> BatchOperation {
        let mut ops = self.ops.lock().unwrap();
        let op = ops.get_mut(&id).expect("batch operation exists");
        op.status = "running".to_string();
        op.started_at = Some(Utc::now());
        op.updated_at = Utc::now();
        op.clone()
    }

    /// Snapshot of a batch's items in submission order.
    pub fn list_items_sync(&self, batch_operation_id: DbId) -> Vec<BatchOperationItem> {
        let items = self.items.lock().unwrap();
        let mut out: Vec<BatchOperationItem> = items
            .iter()
            .filter(|item| item.batch_operation_id == batch_operation_id)
            .cloned()
            .collect();
        out.sort_by_key(|item| item.id);
        out
    }
}

const OPEN_ITEM_STATUSES: [&str; 2] = ["pending", "processing"];

#[async_trait]
impl BatchStore for MemoryBatchStore {
    async fn create(&self, input: &CreateBatchOperation) -> Result<BatchOperation, EngineError> {
        let id = self.next_op_id.fetch_add(1, Ordering::SeqCst) + 1;
        let now = Utc::now();
        let op = BatchOperation {
            id,
            project_id: input.project_id,
            client_request_id: input.client_request_id.clone(),
            op_type: input.op_type.clone(),
            original_target_ids: input.original_target_ids.clone(),
            target_ids: input.target_ids.clone(),
            payload: input.payload.clone(),
            atomic: input.atomic,
            conflict_policy: input.conflict_policy.clone(),
            expected_versions: input.expected_versions.clone(),
            retry_policy: input.retry_policy.clone(),
            execution_mode: input.execution_mode.clone(),
            status: input.status.clone(),
            preflight_summary: input.preflight_summary.clone(),
            error_code: input.error_code.clone(),
            error_message: input.error_message.clone(),
            created_by: input.created_by.clone(),
            started_at: None,
            finished_at: None,
            created_at: now,
            updated_at: now,
        };
        self.ops.lock().unwrap().insert(id, op.clone());
        Ok(op)
    }

    async fn insert_items(
        &self,
        batch_operation_id: DbId,
        target_ids: &[Uuid],
    ) -> Result<Vec<BatchOperationItem>, EngineError> {
        let now = Utc::now();
        let mut created = Vec::with_capacity(target_ids.len());
        let mut items = self.items.lock().unwrap();
        for target_id in target_ids {
            let id = self.next_item_id.fetch_add(1, Ordering::SeqCst) + 1;
            let item = BatchOperationItem {
                id,
                batch_operation_id,
                target_id: *target_id,
                status: "pending".to_string(),
                error_code: None,
                error_message: None,
                retryable: false,
                retry_count: 0,
                started_at: None,
                completed_at: None,
                created_at: now,
                updated_at: now,
            };
            items.push(item.clone());
            created.push(item);
        }
        Ok(created)
    }

    async fn find_by_id(&self, id: DbId) -> Result<Option<BatchOperation>, EngineError> {
        Ok(self.ops.lock().unwrap().get(&id).cloned())
    }

    async fn find_by_client_request_id(
        &self,
        project_id: Uuid,
        client_request_id: &str,
    ) -> Result<Option<BatchOperation>, EngineError> {
        Ok(self
            .ops
            .lock()
            .unwrap()
            .values()
            .find(|op| {
                op.project_id == project_id
                    && op.client_request_id.as_deref() == Some(client_request_id)
            })
            .cloned())
    }

    async fn update_status(&self, id: DbId, status: &str) -> Result<(), EngineError> {
        if let Some(op) = self.ops.lock().unwrap().get_mut(&id) {
            op.status = status.to_string();
            op.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn mark_started(&self, id: DbId, status: &str) -> Result<(), EngineError> {
        if let Some(op) = self.ops.lock().unwrap().get_mut(&id) {
            op.status = status.to_string();
            op.started_at = Some(Utc::now());
            op.updated_at = Utc::now();
        }
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
        if let Some(op) = self.ops.lock().unwrap().get_mut(&id) {
            op.status = status.to_string();
            op.error_code = error_code.map(str::to_string);
            op.error_message = error_message.map(str::to_string);
            op.preflight_summary = preflight_summary.clone();
            op.finished_at = Some(Utc::now());
            op.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn claim_next_pending(&self) -> Result<Option<BatchOperation>, EngineError> {
        let mut ops = self.ops.lock().unwrap();
        let next_id = ops
            .values()
            .filter(|op| op.status == "pending")
            .min_by_key(|op| (op.created_at, op.id))
            .map(|op| op.id);
        Ok(next_id.and_then(|id| {
            ops.get_mut(&id).map(|op| {
                op.status = "running".to_string();
                op.started_at = Some(Utc::now());
                op.updated_at = Utc::now();
                op.clone()
            })
        }))
    }

    async fn list_by_project(
        &self,
        project_id: Uuid,
        status: Option<&str>,
        op_type: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<BatchOperation>, EngineError> {
        let ops = self.ops.lock().unwrap();
        let mut out: Vec<BatchOperation> = ops
            .values()
            .filter(|op| op.project_id == project_id)
            .filter(|op| status.is_none_or(|s| op.status == s))
            .filter(|op| op_type.is_none_or(|t| op.op_type == t))
            .cloned()
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(out
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn list_items(
        &self,
        batch_operation_id: DbId,
    ) -> Result<Vec<BatchOperationItem>, EngineError> {
        let items = self.items.lock().unwrap();
        let mut out: Vec<BatchOperationItem> = items
            .iter()
            .filter(|item| item.batch_operation_id == batch_operation_id)
            .cloned()
            .collect();
        out.sort_by_key(|item| item.id);
        Ok(out)
    }

    async fn mark_item_processing(
        &self,
        batch_operation_id: DbId,
        target_id: Uuid,
    ) -> Result<(), EngineError> {
        let mut items = self.items.lock().unwrap();
        if let Some(item) = items.iter_mut().find(|item| {
            item.batch_operation_id == batch_operation_id
                && item.target_id == target_id
                && OPEN_ITEM_STATUSES.contains(&item.status.as_str())
        }) {
            item.status = "processing".to_string();
            item.started_at = Some(Utc::now());
            item.updated_at = Utc::now();
        }
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
        let mut items = self.items.lock().unwrap();
        if let Some(item) = items.iter_mut().find(|item| {
            item.batch_operation_id == batch_operation_id
                && item.target_id == target_id
                && OPEN_ITEM_STATUSES.contains(&item.status.as_str())
        }) {
            item.status = status.to_string();
            item.error_code = error_code.map(str::to_string);
            item.error_message = error_message.map(str::to_string);
            item.retryable = retryable;
            item.retry_count = retry_count;
            item.completed_at = Some(Utc::now());
            item.updated_at = Utc::now();
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Ledger store double
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryLedgerStore {
    entries: Mutex<Vec<OperationLog>>,
    next_id: AtomicI64,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entry_count(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    /// Snapshot of a chain's entries in creation order.
    pub fn list_chain_sync(&self, chain_id: DbId) -> Vec<OperationLog> {
        let entries = self.entries.lock().unwrap();
        let mut out: Vec<OperationLog> = entries
            .iter()
            .filter(|entry| entry.chain_id == chain_id)
            .cloned()
            .collect();
        out.sort_by_key(|entry| (entry.created_at, entry.id));
        out
    }
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    async fn append(&self, input: &CreateOperationLog) -> Result<OperationLog, EngineError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let now = Utc::now();
        let entry = OperationLog {
            id,
            chain_id: input.chain_id,
            project_id: input.project_id,
            user_id: input.user_id.clone(),
            batch_operation_id: input.batch_operation_id,
            command_type: input.command_type.clone(),
            target_ids: input.target_ids.clone(),
            command_payload: input.command_payload.clone(),
            inverse_commands: input.inverse_commands.clone(),
            status: input.status.clone(),
            is_committed: input.is_committed,
            undone_at: None,
            redone_at: None,
            created_at: now,
            updated_at: now,
        };
        self.entries.lock().unwrap().push(entry.clone());
        Ok(entry)
    }

    async fn list_chain(&self, chain_id: DbId) -> Result<Vec<OperationLog>, EngineError> {
        let entries = self.entries.lock().unwrap();
        let mut out: Vec<OperationLog> = entries
            .iter()
            .filter(|entry| entry.chain_id == chain_id)
            .cloned()
            .collect();
        out.sort_by_key(|entry| (entry.created_at, entry.id));
        Ok(out)
    }

    async fn mark_undone(&self, id: DbId) -> Result<(), EngineError> {
        let mut entries = self.entries.lock().unwrap();
        if let Some(entry) = entries
            .iter_mut()
            .find(|e| e.id == id && (e.status == "executed" || e.status == "redone"))
        {
            entry.status = "undone".to_string();
            entry.undone_at = Some(Utc::now());
            entry.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn mark_redone(&self, id: DbId) -> Result<(), EngineError> {
        let mut entries = self.entries.lock().unwrap();
        if let Some(entry) = entries.iter_mut().find(|e| e.id == id && e.status == "undone") {
            entry.status = "redone".to_string();
            entry.redone_at = Some(Utc::now());
            entry.updated_at = Utc::now();
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Harness helpers
// ---------------------------------------------------------------------------

pub struct TestHarness {
    pub docs: Arc<MemoryDocumentStore>,
    pub batches: Arc<MemoryBatchStore>,
    pub ledger: Arc<MemoryLedgerStore>,
    pub engine: BatchEngine,
}

pub fn harness() -> TestHarness {
    let docs = Arc::new(MemoryDocumentStore::new());
    let batches = Arc::new(MemoryBatchStore::new());
    let ledger = Arc::new(MemoryLedgerStore::new());
    let engine = BatchEngine::new(
        docs.clone(),
        batches.clone(),
        ledger.clone(),
        Arc::new(NoopEventSink),
    );
    TestHarness {
        docs,
        batches,
        ledger,
        engine,
    }
}

pub fn make_document(project_id: ProjectId, parent_id: Option<DocumentId>) -> Document {
    let now = Utc::now();
    Document {
        id: Uuid::new_v4(),
        project_id,
        parent_id,
        position: 0,
        title: "Untitled".to_string(),
        fields: serde_json::json!({}),
        version: 1,
        deleted_at: None,
        deleted_by: None,
        created_at: now,
        updated_at: now,
    }
}

/// Seed `count` live documents into the store, returning them in order.
pub fn seed_documents(
    store: &MemoryDocumentStore,
    project_id: ProjectId,
    count: usize,
) -> Vec<Document> {
    (0..count)
        .map(|i| {
            let mut doc = make_document(project_id, None);
            doc.position = i as i32;
            doc.title = format!("Document {i}");
            store.insert(doc.clone());
            doc
        })
        .collect()
}

/// A delete request over the given targets with sane defaults.
pub fn delete_request(
    project_id: ProjectId,
    target_ids: Vec<String>,
    atomic: bool,
) -> SubmitBatchRequest {
    SubmitBatchRequest {
        project_id,
        op_type: BatchOperationType::Delete,
        target_ids,
        payload: CommandPayload::Delete,
        include_descendants: false,
        atomic,
        conflict_policy: Default::default(),
        expected_versions: HashMap::new(),
        client_request_id: None,
        retry_policy: None,
        created_by: "user-1".to_string(),
    }
}

pub fn ids_of(docs: &[Document]) -> Vec<String> {
    docs.iter().map(|d| d.id.to_string()).collect()
}

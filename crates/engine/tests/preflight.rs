//! Target resolver tests: normalization, descendant pruning, and the
//! per-target validation taxonomy.

mod support;

use std::collections::HashMap;
use std::sync::Arc;

use scribe_core::batch::{BatchOperationType, ConflictPolicy};
use scribe_engine::preflight::{
    PreflightOptions, TargetResolver, REASON_DOCUMENT_NOT_FOUND, REASON_INVALID_ID_FORMAT,
    REASON_VERSION_CONFLICT, REASON_WRONG_PROJECT,
};
use support::{make_document, MemoryDocumentStore};
use uuid::Uuid;

fn resolver(store: Arc<MemoryDocumentStore>) -> TargetResolver {
    TargetResolver::new(store)
}

// ---------------------------------------------------------------------------
// normalize_target_ids
// ---------------------------------------------------------------------------

#[tokio::test]
async fn normalize_deduplicates_preserving_order() {
    let store = Arc::new(MemoryDocumentStore::new());
    let project_id = Uuid::new_v4();

    let raw = vec![
        "id1".to_string(),
        "id2".to_string(),
        "id1".to_string(),
        "id3".to_string(),
        "id2".to_string(),
    ];
    let normalized = resolver(store)
        .normalize_target_ids(project_id, &raw, false)
        .await
        .unwrap();

    assert_eq!(normalized, vec!["id1", "id2", "id3"]);
}

#[tokio::test]
async fn normalize_prunes_child_when_parent_targeted() {
    let store = Arc::new(MemoryDocumentStore::new());
    let project_id = Uuid::new_v4();

    let parent = make_document(project_id, None);
    let child = make_document(project_id, Some(parent.id));
    store.insert(parent.clone());
    store.insert(child.clone());

    let raw = vec![parent.id.to_string(), child.id.to_string()];
    let normalized = resolver(store)
        .normalize_target_ids(project_id, &raw, true)
        .await
        .unwrap();

    assert_eq!(normalized, vec![parent.id.to_string()]);
}

#[tokio::test]
async fn normalize_keeps_child_without_targeted_parent() {
    let store = Arc::new(MemoryDocumentStore::new());
    let project_id = Uuid::new_v4();

    let parent = make_document(project_id, None);
    let child = make_document(project_id, Some(parent.id));
    store.insert(parent);
    store.insert(child.clone());

    // Parent is not in the set, so the child survives pruning.
    let raw = vec![child.id.to_string()];
    let normalized = resolver(store)
        .normalize_target_ids(project_id, &raw, true)
        .await
        .unwrap();

    assert_eq!(normalized, vec![child.id.to_string()]);
}

#[tokio::test]
async fn normalize_without_descendants_skips_parent_lookup() {
    let store = Arc::new(MemoryDocumentStore::new());
    let project_id = Uuid::new_v4();

    let parent = make_document(project_id, None);
    let child = make_document(project_id, Some(parent.id));
    store.insert(parent.clone());
    store.insert(child.clone());

    let raw = vec![parent.id.to_string(), child.id.to_string()];
    let normalized = resolver(store)
        .normalize_target_ids(project_id, &raw, false)
        .await
        .unwrap();

    assert_eq!(normalized.len(), 2);
}

// ---------------------------------------------------------------------------
// validate_batch_operation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn valid_target_is_cached_in_document_map() {
    let store = Arc::new(MemoryDocumentStore::new());
    let project_id = Uuid::new_v4();
    let doc = make_document(project_id, None);
    store.insert(doc.clone());

    let outcome = resolver(store)
        .validate_batch_operation(
            project_id,
            BatchOperationType::Delete,
            &[doc.id.to_string()],
            &PreflightOptions::default(),
        )
        .await
        .unwrap();

    assert_eq!(outcome.summary.valid_count, 1);
    assert_eq!(outcome.summary.invalid_count, 0);
    assert_eq!(outcome.result.valid_ids, vec![doc.id]);
    assert!(outcome.result.document_map.contains_key(&doc.id));
    assert!(outcome.abort_error(ConflictPolicy::Abort).is_none());
}

#[tokio::test]
async fn malformed_id_is_rejected_without_store_lookup() {
    let store = Arc::new(MemoryDocumentStore::new());
    let project_id = Uuid::new_v4();

    let outcome = resolver(store)
        .validate_batch_operation(
            project_id,
            BatchOperationType::Delete,
            &["not-a-uuid".to_string()],
            &PreflightOptions::default(),
        )
        .await
        .unwrap();

    assert_eq!(outcome.summary.invalid_count, 1);
    assert_eq!(outcome.result.invalid_ids[0].code, REASON_INVALID_ID_FORMAT);
    assert_eq!(outcome.result.invalid_ids[0].id, "not-a-uuid");
    assert!(outcome.abort_error(ConflictPolicy::Abort).is_some());
}

#[tokio::test]
async fn missing_document_is_rejected() {
    let store = Arc::new(MemoryDocumentStore::new());
    let project_id = Uuid::new_v4();
    let missing = Uuid::new_v4();

    let outcome = resolver(store)
        .validate_batch_operation(
            project_id,
            BatchOperationType::Delete,
            &[missing.to_string()],
            &PreflightOptions::default(),
        )
        .await
        .unwrap();

    assert_eq!(outcome.result.invalid_ids[0].code, REASON_DOCUMENT_NOT_FOUND);
}

#[tokio::test]
async fn foreign_project_document_is_rejected() {
    let store = Arc::new(MemoryDocumentStore::new());
    let project_id = Uuid::new_v4();
    let other_project = Uuid::new_v4();
    let doc = make_document(other_project, None);
    store.insert(doc.clone());

    let outcome = resolver(store)
        .validate_batch_operation(
            project_id,
            BatchOperationType::Delete,
            &[doc.id.to_string()],
            &PreflightOptions::default(),
        )
        .await
        .unwrap();

    assert_eq!(outcome.result.invalid_ids[0].code, REASON_WRONG_PROJECT);
}

#[tokio::test]
async fn version_mismatch_rejects_under_abort() {
    let store = Arc::new(MemoryDocumentStore::new());
    let project_id = Uuid::new_v4();
    let doc = make_document(project_id, None); // version 1
    store.insert(doc.clone());

    let options = PreflightOptions {
        conflict_policy: ConflictPolicy::Abort,
        expected_versions: HashMap::from([(doc.id.to_string(), 5)]),
    };
    let outcome = resolver(store)
        .validate_batch_operation(
            project_id,
            BatchOperationType::Delete,
            &[doc.id.to_string()],
            &options,
        )
        .await
        .unwrap();

    assert_eq!(outcome.summary.valid_count, 0);
    assert_eq!(outcome.result.invalid_ids[0].code, REASON_VERSION_CONFLICT);
}

#[tokio::test]
async fn version_mismatch_downgrades_to_warning_under_skip() {
    let store = Arc::new(MemoryDocumentStore::new());
    let project_id = Uuid::new_v4();
    let doc = make_document(project_id, None);
    store.insert(doc.clone());

    let options = PreflightOptions {
        conflict_policy: ConflictPolicy::Skip,
        expected_versions: HashMap::from([(doc.id.to_string(), 5)]),
    };
    let outcome = resolver(store)
        .validate_batch_operation(
            project_id,
            BatchOperationType::Delete,
            &[doc.id.to_string()],
            &options,
        )
        .await
        .unwrap();

    assert_eq!(outcome.summary.valid_count, 1);
    assert_eq!(outcome.summary.invalid_count, 0);
    assert_eq!(outcome.summary.warnings.len(), 1);
}

#[tokio::test]
async fn matching_version_passes() {
    let store = Arc::new(MemoryDocumentStore::new());
    let project_id = Uuid::new_v4();
    let doc = make_document(project_id, None);
    store.insert(doc.clone());

    let options = PreflightOptions {
        conflict_policy: ConflictPolicy::Abort,
        expected_versions: HashMap::from([(doc.id.to_string(), 1)]),
    };
    let outcome = resolver(store)
        .validate_batch_operation(
            project_id,
            BatchOperationType::Delete,
            &[doc.id.to_string()],
            &options,
        )
        .await
        .unwrap();

    assert_eq!(outcome.summary.valid_count, 1);
    assert!(outcome.summary.warnings.is_empty());
}

#[tokio::test]
async fn mixed_targets_accumulate_without_aborting_the_pass() {
    let store = Arc::new(MemoryDocumentStore::new());
    let project_id = Uuid::new_v4();
    let doc = make_document(project_id, None);
    store.insert(doc.clone());
    let missing = Uuid::new_v4();

    let targets = vec![
        doc.id.to_string(),
        missing.to_string(),
        "invalid-format".to_string(),
    ];
    let outcome = resolver(store)
        .validate_batch_operation(
            project_id,
            BatchOperationType::Delete,
            &targets,
            &PreflightOptions::default(),
        )
        .await
        .unwrap();

    assert_eq!(outcome.summary.total_count, 3);
    assert_eq!(outcome.summary.valid_count, 1);
    assert_eq!(outcome.summary.invalid_count, 2);
    assert_eq!(outcome.result.valid_ids.len(), 1);
    assert_eq!(outcome.result.invalid_ids.len(), 2);
    // Abort rejects the submission; skip would proceed with the subset.
    assert!(outcome.abort_error(ConflictPolicy::Abort).is_some());
    assert!(outcome.abort_error(ConflictPolicy::Skip).is_none());
}

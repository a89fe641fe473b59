//! Target resolver: normalization and preflight validation.
//!
//! Turns a caller-supplied, possibly messy id list into a validated,
//! deduplicated, project-scoped set ready for execution. Invalid targets
//! never abort the resolver pass itself; they accumulate with reason
//! codes, and only an abort-policy submission fails as a whole.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use scribe_core::batch::{BatchOperationType, ConflictPolicy, PreflightSummary};
use scribe_core::document::Document;
use scribe_core::store::DocumentStore;
use scribe_core::types::{DocumentId, ProjectId};
use serde::Serialize;
use uuid::Uuid;

use crate::error::EngineError;

/// Reason codes attached to invalid targets.
pub const REASON_INVALID_ID_FORMAT: &str = "invalid_id_format";
pub const REASON_DOCUMENT_NOT_FOUND: &str = "document_not_found";
pub const REASON_WRONG_PROJECT: &str = "wrong_project";
pub const REASON_VERSION_CONFLICT: &str = "version_conflict";
/// Reserved for a future permission check at this boundary.
pub const REASON_PERMISSION_DENIED: &str = "permission_denied";

/// One rejected target with its reason code.
#[derive(Debug, Clone, Serialize)]
pub struct InvalidTarget {
    pub id: String,
    pub code: &'static str,
}

/// Inputs controlling validation behaviour.
#[derive(Debug, Clone, Default)]
pub struct PreflightOptions {
    pub conflict_policy: ConflictPolicy,
    /// Optimistic checks: raw target id -> expected stored version.
    pub expected_versions: HashMap<String, i64>,
}

/// Accumulated per-target results of a validation pass.
#[derive(Debug, Default)]
pub struct PreflightResult {
    /// Targets cleared for execution, in submission order.
    pub valid_ids: Vec<DocumentId>,
    pub invalid_ids: Vec<InvalidTarget>,
    /// Resolved documents, cached so execution within the same call does
    /// not fetch them a second time.
    pub document_map: HashMap<DocumentId, Document>,
}

/// Summary plus per-target detail from one validation pass.
#[derive(Debug)]
pub struct PreflightOutcome {
    pub summary: PreflightSummary,
    pub result: PreflightResult,
}

impl PreflightOutcome {
    /// Under the abort policy, any invalid target rejects the submission.
    pub fn abort_error(&self, policy: ConflictPolicy) -> Option<EngineError> {
        if policy == ConflictPolicy::Abort && self.summary.invalid_count > 0 {
            Some(EngineError::PreflightFailed {
                summary: self.summary.clone(),
            })
        } else {
            None
        }
    }
}

/// Validates and normalizes raw target-id lists against the live
/// document set.
pub struct TargetResolver {
    store: Arc<dyn DocumentStore>,
}

impl TargetResolver {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Deduplicate `raw_ids` (first occurrence wins) and, when
    /// `include_descendants` is set, drop any id whose direct parent is
    /// also in the set: processing the ancestor already covers the
    /// subtree. Pruning uses a single level of parent lookup per id;
    /// unresolvable ids are kept for validation to flag.
    pub async fn normalize_target_ids(
        &self,
        _project_id: ProjectId,
        raw_ids: &[String],
        include_descendants: bool,
    ) -> Result<Vec<String>, EngineError> {
        let mut seen = HashSet::new();
        let unique: Vec<String> = raw_ids
            .iter()
            .filter(|id| seen.insert((*id).clone()))
            .cloned()
            .collect();

        if !include_descendants {
            return Ok(unique);
        }

        let parsed: HashSet<DocumentId> =
            unique.iter().filter_map(|s| Uuid::parse_str(s).ok()).collect();

        let mut kept = Vec::with_capacity(unique.len());
        for raw in unique {
            let id = match Uuid::parse_str(&raw) {
                Ok(id) => id,
                Err(_) => {
                    kept.push(raw);
                    continue;
                }
            };
            match self.store.get_by_id(id).await? {
                Some(doc) => {
                    let ancestor_present =
                        doc.parent_id.is_some_and(|parent| parsed.contains(&parent));
                    if !ancestor_present {
                        kept.push(raw);
                    }
                }
                None => kept.push(raw),
            }
        }
        Ok(kept)
    }

    /// Validate each normalized id: format check, existence, project
    /// scope, and the optional expected-version comparison. Version
    /// mismatches reject under the abort policy and downgrade to a
    /// warning under every other policy.
    pub async fn validate_batch_operation(
        &self,
        project_id: ProjectId,
        _op_type: BatchOperationType,
        target_ids: &[String],
        options: &PreflightOptions,
    ) -> Result<PreflightOutcome, EngineError> {
        let mut summary = PreflightSummary {
            total_count: target_ids.len(),
            ..Default::default()
        };
        let mut result = PreflightResult::default();

        for raw in target_ids {
            let id = match Uuid::parse_str(raw) {
                Ok(id) => id,
                Err(_) => {
                    reject(&mut summary, &mut result, raw, REASON_INVALID_ID_FORMAT);
                    continue;
                }
            };

            let doc = match self.store.get_by_id(id).await? {
                Some(doc) => doc,
                None => {
                    reject(&mut summary, &mut result, raw, REASON_DOCUMENT_NOT_FOUND);
                    continue;
                }
            };

            if doc.project_id != project_id {
                reject(&mut summary, &mut result, raw, REASON_WRONG_PROJECT);
                continue;
            }

            if let Some(expected) = options.expected_versions.get(raw) {
                if doc.version != *expected {
                    if options.conflict_policy == ConflictPolicy::Abort {
                        reject(&mut summary, &mut result, raw, REASON_VERSION_CONFLICT);
                        continue;
                    }
                    summary.warnings.push(format!(
                        "target {raw}: stored version {} differs from expected {expected}",
                        doc.version
                    ));
                }
            }

            summary.valid_count += 1;
            result.valid_ids.push(id);
            result.document_map.insert(id, doc);
        }

        Ok(PreflightOutcome { summary, result })
    }
}

fn reject(
    summary: &mut PreflightSummary,
    result: &mut PreflightResult,
    raw: &str,
    code: &'static str,
) {
    summary.invalid_count += 1;
    summary.errors.push(format!("target {raw}: {code}"));
    result.invalid_ids.push(InvalidTarget {
        id: raw.to_string(),
        code,
    });
}

//! Batch result reconciliation.
//!
//! Bulk operations (block/unblock, update/delete messages, delete drafts)
//! report one of success / partial / failure plus per-item lists. The
//! reconciler turns that into a [`BatchOperationResult`] in which every
//! requested id appears exactly once, in either the success or the failure
//! list.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// Error text used for items the service reported no reason for.
pub const DEFAULT_BATCH_ERROR: &str = "Failed";

/// Error text for requested ids missing from a partial response.
pub const MISSING_RESULT_ERROR: &str = "No result returned for item";

/// Overall status reported by the service for a bulk operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BatchOperationStatus {
    Success,
    Partial,
    Failure,
}

/// Tri-state result of a bulk operation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BatchOperationResult<S, F> {
    Success(Vec<S>),
    Partial { success: Vec<S>, failure: Vec<F> },
    Failure(Vec<F>),
}

impl<S, F> BatchOperationResult<S, F> {
    /// Classify by counts. An empty request counts as success.
    pub fn from_parts(success: Vec<S>, failure: Vec<F>) -> Self {
        match (success.is_empty(), failure.is_empty()) {
            (_, true) => BatchOperationResult::Success(success),
            (true, false) => BatchOperationResult::Failure(failure),
            (false, false) => BatchOperationResult::Partial { success, failure },
        }
    }

    pub fn status(&self) -> BatchOperationStatus {
        match self {
            BatchOperationResult::Success(_) => BatchOperationStatus::Success,
            BatchOperationResult::Partial { .. } => BatchOperationStatus::Partial,
            BatchOperationResult::Failure(_) => BatchOperationStatus::Failure,
        }
    }

    pub fn success_values(&self) -> &[S] {
        match self {
            BatchOperationResult::Success(s) | BatchOperationResult::Partial { success: s, .. } => s,
            BatchOperationResult::Failure(_) => &[],
        }
    }

    pub fn failure_values(&self) -> &[F] {
        match self {
            BatchOperationResult::Failure(f) | BatchOperationResult::Partial { failure: f, .. } => f,
            BatchOperationResult::Success(_) => &[],
        }
    }

    pub fn map<S2, F2>(self, fs: impl Fn(S) -> S2, ff: impl Fn(F) -> F2) -> BatchOperationResult<S2, F2> {
        match self {
            BatchOperationResult::Success(s) => BatchOperationResult::Success(s.into_iter().map(fs).collect()),
            BatchOperationResult::Partial { success, failure } => BatchOperationResult::Partial {
                success: success.into_iter().map(fs).collect(),
                failure: failure.into_iter().map(ff).collect(),
            },
            BatchOperationResult::Failure(f) => BatchOperationResult::Failure(f.into_iter().map(ff).collect()),
        }
    }
}

/// Anything carrying the id of the item it reports on.
pub trait BatchItem {
    fn item_id(&self) -> &str;
}

impl BatchItem for String {
    fn item_id(&self) -> &str {
        self
    }
}

/// Per-item failure for message and draft operations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailMessageOperationFailureResult {
    pub id: String,
    pub error_type: String,
}

impl BatchItem for EmailMessageOperationFailureResult {
    fn item_id(&self) -> &str {
        &self.id
    }
}

/// What the service returned for a bulk operation.
#[derive(Clone, Debug)]
pub struct RemoteBatch<S, F> {
    pub status: BatchOperationStatus,
    pub success: Vec<S>,
    pub failure: Vec<F>,
    /// Operation-wide error text, used for items without their own.
    pub error: Option<String>,
}

/// Reconcile a remote response against the requested ids.
///
/// `make_success` builds a success record for a requested id the service
/// did not describe; `make_failure` does the same for failures, receiving
/// the error text. Remote records for ids that were never requested are
/// dropped. An id reported as both succeeded and failed is a failure.
pub fn reconcile<S, F>(
    requested: &[String],
    remote: RemoteBatch<S, F>,
    make_success: impl Fn(&str) -> S,
    make_failure: impl Fn(&str, &str) -> F,
) -> BatchOperationResult<S, F>
where
    S: BatchItem,
    F: BatchItem,
{
    let mut seen = HashSet::new();
    let requested: Vec<&str> = requested
        .iter()
        .map(String::as_str)
        .filter(|id| seen.insert(*id))
        .collect();
    let error = remote.error.as_deref().unwrap_or(DEFAULT_BATCH_ERROR);

    let (success, failure) = match remote.status {
        BatchOperationStatus::Success => {
            let mut detail = remote.success;
            let success = requested
                .iter()
                .map(|id| match detail.iter().position(|s| s.item_id() == *id) {
                    Some(i) => detail.swap_remove(i),
                    None => make_success(id),
                })
                .collect();
            (success, Vec::new())
        }
        BatchOperationStatus::Failure => {
            let mut detail = remote.failure;
            let failure = requested
                .iter()
                .map(|id| match detail.iter().position(|f| f.item_id() == *id) {
                    Some(i) => detail.swap_remove(i),
                    None => make_failure(id, error),
                })
                .collect();
            (Vec::new(), failure)
        }
        BatchOperationStatus::Partial => {
            let mut placed: HashSet<String> = HashSet::new();
            let mut failure: Vec<F> = Vec::new();
            for f in remote.failure {
                if seen.contains(f.item_id()) && placed.insert(f.item_id().to_string()) {
                    failure.push(f);
                }
            }
            let mut success: Vec<S> = Vec::new();
            for s in remote.success {
                if seen.contains(s.item_id()) && placed.insert(s.item_id().to_string()) {
                    success.push(s);
                }
            }
            for id in &requested {
                if !placed.contains(*id) {
                    failure.push(make_failure(id, MISSING_RESULT_ERROR));
                }
            }
            (success, failure)
        }
    };

    let result = BatchOperationResult::from_parts(success, failure);
    tracing::debug!(
        requested = requested.len(),
        succeeded = result.success_values().len(),
        failed = result.failure_values().len(),
        "reconciled batch result"
    );
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn ids(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    fn failure(id: &str, error: &str) -> EmailMessageOperationFailureResult {
        EmailMessageOperationFailureResult {
            id: id.to_string(),
            error_type: error.to_string(),
        }
    }

    fn run(
        requested: &[String],
        status: BatchOperationStatus,
        success: Vec<String>,
        failure_list: Vec<EmailMessageOperationFailureResult>,
    ) -> BatchOperationResult<String, EmailMessageOperationFailureResult> {
        reconcile(
            requested,
            RemoteBatch {
                status,
                success,
                failure: failure_list,
                error: None,
            },
            |id| id.to_string(),
            failure,
        )
    }

    #[test]
    fn all_success_uses_requested_ids() {
        let r = run(&ids(&["a", "b"]), BatchOperationStatus::Success, vec![], vec![]);
        assert_eq!(r, BatchOperationResult::Success(ids(&["a", "b"])));
    }

    #[test]
    fn all_failure_uses_operation_error() {
        let r = reconcile(
            &ids(&["a", "b"]),
            RemoteBatch::<String, EmailMessageOperationFailureResult> {
                status: BatchOperationStatus::Failure,
                success: vec![],
                failure: vec![failure("b", "Specific")],
                error: Some("Quota".into()),
            },
            |id| id.to_string(),
            failure,
        );
        assert_eq!(r.status(), BatchOperationStatus::Failure);
        assert_eq!(r.failure_values(), &[failure("a", "Quota"), failure("b", "Specific")]);
    }

    #[test]
    fn partial_fills_gaps_and_drops_strangers() {
        let r = run(
            &ids(&["a", "b", "c"]),
            BatchOperationStatus::Partial,
            ids(&["a", "zzz"]),
            vec![failure("b", "Denied")],
        );
        assert_eq!(r.success_values(), &ids(&["a"])[..]);
        assert_eq!(
            r.failure_values(),
            &[failure("b", "Denied"), failure("c", MISSING_RESULT_ERROR)]
        );
    }

    #[test]
    fn id_in_both_lists_is_a_failure() {
        let r = run(
            &ids(&["a", "b"]),
            BatchOperationStatus::Partial,
            ids(&["a", "b"]),
            vec![failure("b", "Denied")],
        );
        assert_eq!(r.success_values(), &ids(&["a"])[..]);
        assert_eq!(r.failure_values(), &[failure("b", "Denied")]);
    }

    #[test]
    fn partial_that_is_really_success_is_reclassified() {
        let r = run(&ids(&["a"]), BatchOperationStatus::Partial, ids(&["a"]), vec![]);
        assert_eq!(r.status(), BatchOperationStatus::Success);
    }

    #[test]
    fn empty_request_is_success() {
        let r = run(&[], BatchOperationStatus::Failure, vec![], vec![]);
        assert_eq!(r.status(), BatchOperationStatus::Success);
    }

    fn status_strategy() -> impl Strategy<Value = BatchOperationStatus> {
        prop_oneof![
            Just(BatchOperationStatus::Success),
            Just(BatchOperationStatus::Partial),
            Just(BatchOperationStatus::Failure),
        ]
    }

    proptest! {
        #[test]
        fn every_requested_id_appears_exactly_once(
            requested in prop::collection::vec("[a-e]", 0..8),
            status in status_strategy(),
            remote_success in prop::collection::vec("[a-g]", 0..8),
            remote_failure in prop::collection::vec("[a-g]", 0..8),
        ) {
            let r = run(
                &requested,
                status,
                remote_success,
                remote_failure.iter().map(|id| failure(id, "x")).collect(),
            );
            let unique: HashSet<&String> = requested.iter().collect();
            let successes: Vec<&str> = r.success_values().iter().map(|s| s.as_str()).collect();
            let failures: Vec<&str> = r.failure_values().iter().map(|f| f.id.as_str()).collect();

            prop_assert_eq!(successes.len() + failures.len(), unique.len());
            let mut all: HashSet<&str> = HashSet::new();
            for id in successes.iter().chain(failures.iter()) {
                prop_assert!(all.insert(*id), "duplicate id {}", id);
                prop_assert!(unique.contains(&id.to_string()));
            }
        }
    }
}

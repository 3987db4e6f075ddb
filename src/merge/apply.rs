//! Assembles the merge commit once every conflict in a `MergeState` carries
//! a resolution: applies effective values to the merged event stream,
//! commits the result, advances the target branch, and clears the merge
//! record.

use super::engine::effective_value;
use super::state::{MergeState, MergeStateStore};
use crate::branch::BranchManager;
use crate::commit::{Commit, DatabaseState};
use crate::commit_store::CommitStore;
use crate::error::{DbError, Result};
use crate::event::Event;
use crate::hash::Hash;
use crate::refs::RefStore;
use crate::storage::StorageBackend;

pub struct ApplyMerge<'a> {
    storage: &'a dyn StorageBackend,
}

#[derive(Debug, Clone)]
pub struct ApplyOutcome {
    pub commit: Hash,
    pub events: Vec<Event>,
}

impl<'a> ApplyMerge<'a> {
    pub fn new(storage: &'a dyn StorageBackend) -> Self {
        Self { storage }
    }

    /// Apply a resolved merge, producing a two-parent commit `[target,
    /// source]` and advancing `state.target` to it. The resulting commit
    /// carries the target's own `DatabaseState` forward unchanged; callers
    /// that need the merge's resolved documents reflected in collection
    /// hashes should use `apply_with_state` instead, passing a state
    /// recomputed from `resolve_event_stream`'s output.
    pub fn apply(&self, state: &MergeState, author: String, message: String, ts: i64) -> Result<ApplyOutcome> {
        let commits = CommitStore::new(self.storage);
        let target_commit = commits.load(&state.target_commit)?;
        self.apply_with_state(state, author, message, ts, target_commit.state.clone())
    }

    /// Apply a resolved merge using a caller-supplied `DatabaseState` for
    /// the resulting commit, so the commit's collection hashes reflect the
    /// merge's resolved documents rather than the target's prior state.
    pub fn apply_with_state(
        &self,
        state: &MergeState,
        author: String,
        message: String,
        ts: i64,
        resulting_state: DatabaseState,
    ) -> Result<ApplyOutcome> {
        let unresolved = state.unresolved_count();
        if unresolved > 0 {
            return Err(DbError::ConflictsRemaining { count: unresolved });
        }

        let events = self.resolve_event_stream(state);

        let commits = CommitStore::new(self.storage);
        let merge_commit = Commit::new(
            vec![state.target_commit.clone(), state.source_commit.clone()],
            message,
            author,
            ts,
            resulting_state,
        );
        commits.save(&merge_commit)?;

        let refs = RefStore::new(self.storage);
        let expected = refs.ref_etag(&state.target).ok();
        refs.update_ref(&state.target, &merge_commit.hash, expected.as_deref())?;

        MergeStateStore::new(self.storage).clear()?;

        Ok(ApplyOutcome {
            commit: merge_commit.hash,
            events,
        })
    }

    /// Substitute each conflict's effective value into `merged_events`,
    /// leaving non-conflicting events untouched.
    pub fn resolve_event_stream(&self, state: &MergeState) -> Vec<Event> {
        let mut events = state.merged_events.clone();
        for conflict in &state.conflicts {
            let Some(value) = effective_value(conflict) else {
                continue;
            };
            for event in events.iter_mut() {
                if event.collection() == conflict.collection && event.entity_id() == conflict.entity_id {
                    if let Some(obj) = value.as_object() {
                        event.after = Some(obj.clone());
                    }
                }
            }
        }
        events
    }

    /// Fast-forward shortcut: when `target` is an ancestor of `source`, no
    /// MergeState is ever created and the ref simply advances.
    pub fn fast_forward(&self, target_branch: &str, source: &Hash) -> Result<bool> {
        let branches = BranchManager::new(self.storage);
        let refs = RefStore::new(self.storage);
        let target_commit = refs.resolve_ref(target_branch)?;
        if !branches.is_fast_forwardable(&target_commit, source)? {
            return Ok(false);
        }
        let expected = refs.ref_etag(target_branch)?;
        refs.update_ref(target_branch, source, Some(&expected))?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::merge::conflict::{Conflict, ConflictType, Resolution};
    use crate::merge::state::Strategy;
    use crate::storage::MemoryBackend;
    use serde_json::json;

    fn setup_commits(storage: &MemoryBackend) -> (Hash, Hash) {
        let commits = CommitStore::new(storage);
        let root = Commit::new(vec![], "init".into(), "a".into(), 1, DatabaseState::default());
        commits.save(&root).unwrap();
        let target = Commit::new(vec![root.hash.clone()], "t".into(), "a".into(), 2, DatabaseState::default());
        commits.save(&target).unwrap();
        let source = Commit::new(vec![root.hash], "s".into(), "a".into(), 2, DatabaseState::default());
        commits.save(&source).unwrap();
        (target.hash, source.hash)
    }

    #[test]
    fn apply_fails_with_unresolved_conflicts() {
        let storage = MemoryBackend::new();
        let (target_commit, source_commit) = setup_commits(&storage);
        let mut state = MergeState::new(
            "feature",
            "main",
            "base".into(),
            source_commit,
            target_commit,
            Strategy::Manual,
        )
        .unwrap();
        state.add_conflict(Conflict {
            entity_id: "1".into(),
            collection: "users".into(),
            fields: vec!["name".into()],
            kind: ConflictType::ConcurrentUpdate,
            our_value: None,
            their_value: None,
            base_value: None,
            resolved: false,
            resolution: None,
            resolved_value: None,
        });

        let apply = ApplyMerge::new(&storage);
        let err = apply
            .apply(&state, "a".into(), "merge".into(), 3)
            .unwrap_err();
        assert!(matches!(err, DbError::ConflictsRemaining { count: 1 }));
    }

    #[test]
    fn apply_produces_two_parent_commit_and_advances_target() {
        let storage = MemoryBackend::new();
        let (target_commit, source_commit) = setup_commits(&storage);
        let refs = RefStore::new(&storage);
        refs.update_ref("main", &target_commit, None).unwrap();

        let mut state = MergeState::new(
            "feature",
            "main",
            "base".into(),
            source_commit.clone(),
            target_commit.clone(),
            Strategy::Manual,
        )
        .unwrap();
        state.add_conflict(Conflict {
            entity_id: "1".into(),
            collection: "users".into(),
            fields: vec!["name".into()],
            kind: ConflictType::ConcurrentUpdate,
            our_value: Some(json!({"name": "A"})),
            their_value: Some(json!({"name": "B"})),
            base_value: None,
            resolved: false,
            resolution: None,
            resolved_value: None,
        });
        state
            .resolve_conflict("users/1", Resolution::Ours, None)
            .unwrap();

        MergeStateStore::new(&storage).begin(&state).unwrap();

        let apply = ApplyMerge::new(&storage);
        let outcome = apply.apply(&state, "a".into(), "merge".into(), 3).unwrap();

        let commits = CommitStore::new(&storage);
        let merge_commit = commits.load(&outcome.commit).unwrap();
        assert_eq!(merge_commit.parents, vec![target_commit, source_commit]);
        assert_eq!(refs.resolve_ref("main").unwrap(), outcome.commit);
        assert!(!MergeStateStore::new(&storage).has_merge_in_progress().unwrap());
    }
}

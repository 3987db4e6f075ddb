//! The durable "merge in progress" record: tracks a merge's source,
//! target, base, strategy and outstanding conflicts across process
//! restarts, transitioning in_progress -> conflicted -> resolved as
//! conflicts are recorded and cleared.

use super::conflict::{Conflict, Resolution};
use crate::error::{DbError, Result};
use crate::event::Event;
use crate::hash::Hash;
use crate::storage::StorageBackend;
use serde::{Deserialize, Serialize};
use serde_json::Value;

const MERGE_STATE_PATH: &str = "merge_state";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    Manual,
    Ours,
    Theirs,
    Newest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeStatus {
    InProgress,
    Conflicted,
    Resolved,
    Aborted,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeState {
    pub source: String,
    pub target: String,
    pub base_commit: Hash,
    pub source_commit: Hash,
    pub target_commit: Hash,
    pub strategy: Strategy,
    pub status: MergeStatus,
    pub conflicts: Vec<Conflict>,
    /// The merge engine's full output event stream, persisted alongside the
    /// conflicts so ApplyMerge can resume after a process restart without
    /// re-running the merge.
    #[serde(default)]
    pub merged_events: Vec<Event>,
}

impl MergeState {
    pub fn new(
        source: impl Into<String>,
        target: impl Into<String>,
        base_commit: Hash,
        source_commit: Hash,
        target_commit: Hash,
        strategy: Strategy,
    ) -> Result<Self> {
        let source = source.into();
        let target = target.into();
        if source == target {
            return Err(DbError::InvalidArgument(
                "merge source and target must differ".into(),
            ));
        }
        Ok(Self {
            source,
            target,
            base_commit,
            source_commit,
            target_commit,
            strategy,
            status: MergeStatus::InProgress,
            conflicts: Vec::new(),
            merged_events: Vec::new(),
        })
    }

    pub fn add_conflict(&mut self, conflict: Conflict) {
        self.conflicts.push(conflict);
        self.status = MergeStatus::Conflicted;
    }

    pub fn resolve_conflict(
        &mut self,
        entity_path: &str,
        resolution: Resolution,
        resolved_value: Option<Value>,
    ) -> Result<()> {
        let conflict = self
            .conflicts
            .iter_mut()
            .find(|c| c.path() == entity_path)
            .ok_or_else(|| DbError::NotFound(format!("conflict {entity_path}")))?;
        conflict.resolved = true;
        conflict.resolution = Some(resolution);
        conflict.resolved_value = resolved_value;

        if self.all_conflicts_resolved() {
            self.status = MergeStatus::Resolved;
        }
        Ok(())
    }

    pub fn all_conflicts_resolved(&self) -> bool {
        self.conflicts.iter().all(|c| c.resolved)
    }

    pub fn unresolved_count(&self) -> usize {
        self.conflicts.iter().filter(|c| !c.resolved).count()
    }
}

pub struct MergeStateStore<'a> {
    storage: &'a dyn StorageBackend,
}

impl<'a> MergeStateStore<'a> {
    pub fn new(storage: &'a dyn StorageBackend) -> Self {
        Self { storage }
    }

    pub fn begin(&self, state: &MergeState) -> Result<()> {
        if self.has_merge_in_progress()? {
            return Err(DbError::MergeInProgress);
        }
        self.save(state)
    }

    pub fn save(&self, state: &MergeState) -> Result<()> {
        let data = serde_json::to_vec(state)?;
        self.storage.write_atomic(MERGE_STATE_PATH, &data)?;
        Ok(())
    }

    pub fn load(&self) -> Result<MergeState> {
        let data = self.storage.read(MERGE_STATE_PATH)?;
        serde_json::from_slice(&data).map_err(|e| DbError::Corruption(format!("merge_state: {e}")))
    }

    pub fn clear(&self) -> Result<()> {
        self.storage.delete(MERGE_STATE_PATH)?;
        Ok(())
    }

    pub fn has_merge_in_progress(&self) -> Result<bool> {
        self.storage.exists(MERGE_STATE_PATH)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::merge::conflict::ConflictType;
    use crate::storage::MemoryBackend;

    fn conflict(path_id: &str) -> Conflict {
        Conflict {
            entity_id: path_id.into(),
            collection: "users".into(),
            fields: vec!["name".into()],
            kind: ConflictType::ConcurrentUpdate,
            our_value: None,
            their_value: None,
            base_value: None,
            resolved: false,
            resolution: None,
            resolved_value: None,
        }
    }

    #[test]
    fn source_equals_target_rejected() {
        assert!(MergeState::new("main", "main", "b".into(), "s".into(), "t".into(), Strategy::Manual).is_err());
    }

    #[test]
    fn transitions_in_progress_to_conflicted_to_resolved() {
        let mut state = MergeState::new(
            "feature",
            "main",
            "b".into(),
            "s".into(),
            "t".into(),
            Strategy::Manual,
        )
        .unwrap();
        assert_eq!(state.status, MergeStatus::InProgress);

        state.add_conflict(conflict("1"));
        assert_eq!(state.status, MergeStatus::Conflicted);

        state
            .resolve_conflict("users/1", Resolution::Ours, None)
            .unwrap();
        assert_eq!(state.status, MergeStatus::Resolved);
        assert!(state.all_conflicts_resolved());
    }

    #[test]
    fn begin_fails_when_merge_already_in_progress() {
        let storage = MemoryBackend::new();
        let store = MergeStateStore::new(&storage);
        let state = MergeState::new(
            "feature",
            "main",
            "b".into(),
            "s".into(),
            "t".into(),
            Strategy::Manual,
        )
        .unwrap();
        store.begin(&state).unwrap();
        assert!(matches!(store.begin(&state), Err(DbError::MergeInProgress)));
    }

    #[test]
    fn clear_removes_state() {
        let storage = MemoryBackend::new();
        let store = MergeStateStore::new(&storage);
        let state = MergeState::new(
            "feature",
            "main",
            "b".into(),
            "s".into(),
            "t".into(),
            Strategy::Manual,
        )
        .unwrap();
        store.begin(&state).unwrap();
        store.clear().unwrap();
        assert!(!store.has_merge_in_progress().unwrap());
    }
}

//! Immutable, content-addressed commits over a database's collection and
//! relationship state.

use crate::hash::{canonical_hash, Hash};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;

/// Per-collection materialized state: content addresses of the data and
/// schema Parquet files plus a denormalized row count for cheap stats.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionState {
    pub data_hash: Hash,
    pub schema_hash: Hash,
    pub row_count: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forward_hash: Option<Hash>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reverse_hash: Option<Hash>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventLogPosition {
    pub segment_id: String,
    pub offset: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseState {
    pub collections: BTreeMap<String, CollectionState>,
    #[serde(default)]
    pub relationships: RelationshipState,
    #[serde(default)]
    pub event_log_position: EventLogPosition,
}

/// An immutable commit: zero parents for the initial commit, one for a
/// normal commit, two (or more) for a merge. `hash` is a deterministic
/// digest of every other field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    pub hash: Hash,
    pub parents: Vec<Hash>,
    pub message: String,
    pub author: String,
    pub ts: i64,
    pub state: DatabaseState,
}

impl Commit {
    /// Build a commit, computing its hash from the other fields. Two calls
    /// with identical (parents, message, author, ts, state) always produce
    /// the same hash, regardless of field construction order.
    pub fn new(
        parents: Vec<Hash>,
        message: String,
        author: String,
        ts: i64,
        state: DatabaseState,
    ) -> Self {
        let hash = Self::compute_hash(&parents, &message, &author, ts, &state);
        Self {
            hash,
            parents,
            message,
            author,
            ts,
            state,
        }
    }

    pub fn compute_hash(
        parents: &[Hash],
        message: &str,
        author: &str,
        ts: i64,
        state: &DatabaseState,
    ) -> Hash {
        let body = json!({
            "parents": parents,
            "message": message,
            "author": author,
            "ts": ts,
            "state": state,
        });
        canonical_hash(&body)
    }

    pub fn is_merge(&self) -> bool {
        self.parents.len() >= 2
    }

    pub fn is_root(&self) -> bool {
        self.parents.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> DatabaseState {
        let mut collections = BTreeMap::new();
        collections.insert(
            "users".into(),
            CollectionState {
                data_hash: "d1".into(),
                schema_hash: "s1".into(),
                row_count: 2,
            },
        );
        DatabaseState {
            collections,
            relationships: RelationshipState::default(),
            event_log_position: EventLogPosition {
                segment_id: "seg0".into(),
                offset: 3,
            },
        }
    }

    #[test]
    fn identical_bodies_hash_identically() {
        let c1 = Commit::new(vec![], "init".into(), "a".into(), 100, state());
        let c2 = Commit::new(vec![], "init".into(), "a".into(), 100, state());
        assert_eq!(c1.hash, c2.hash);
    }

    #[test]
    fn round_trip_preserves_hash() {
        let c1 = Commit::new(vec!["p0".into()], "msg".into(), "a".into(), 42, state());
        let encoded = serde_json::to_vec(&c1).unwrap();
        let c2: Commit = serde_json::from_slice(&encoded).unwrap();
        assert_eq!(c1.hash, c2.hash);
        let recomputed =
            Commit::compute_hash(&c2.parents, &c2.message, &c2.author, c2.ts, &c2.state);
        assert_eq!(c1.hash, recomputed);
    }

    #[test]
    fn different_parents_change_hash() {
        let c1 = Commit::new(vec!["p0".into()], "m".into(), "a".into(), 1, state());
        let c2 = Commit::new(vec!["p1".into()], "m".into(), "a".into(), 1, state());
        assert_ne!(c1.hash, c2.hash);
    }

    #[test]
    fn merge_commit_has_two_parents() {
        let c = Commit::new(
            vec!["target".into(), "source".into()],
            "merge".into(),
            "a".into(),
            1,
            state(),
        );
        assert!(c.is_merge());
        assert_eq!(
            c.parents,
            vec!["target".to_string(), "source".to_string()]
        );
    }
}

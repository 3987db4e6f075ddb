//! Immutable, content-addressed commit persistence plus ancestry
//! queries: ancestor walks, lowest-common-ancestor, fast-forward
//! checks.

use crate::commit::Commit;
use crate::error::{DbError, Result};
use crate::hash::Hash;
use crate::storage::{StorageBackend, WriteOptions};
use std::collections::{HashSet, VecDeque};

fn commit_path(hash: &str) -> String {
    format!("commits/{hash}")
}

pub struct CommitStore<'a> {
    storage: &'a dyn StorageBackend,
}

impl<'a> CommitStore<'a> {
    pub fn new(storage: &'a dyn StorageBackend) -> Self {
        Self { storage }
    }

    /// Persist a commit. Identical content at the same hash is a silent
    /// no-op (commit identity makes concurrent distinct writes to the same
    /// hash impossible by construction).
    pub fn save(&self, commit: &Commit) -> Result<()> {
        let data = serde_json::to_vec(commit)?;
        match self
            .storage
            .write(&commit_path(&commit.hash), &data, &WriteOptions::if_not_exists())
        {
            Ok(_) => Ok(()),
            Err(DbError::AlreadyExists(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    pub fn load(&self, hash: &str) -> Result<Commit> {
        let data = self.storage.read(&commit_path(hash))?;
        let commit: Commit = serde_json::from_slice(&data)
            .map_err(|e| DbError::Corruption(format!("commit {hash}: {e}")))?;
        Ok(commit)
    }

    pub fn exists(&self, hash: &str) -> Result<bool> {
        self.storage.exists(&commit_path(hash))
    }

    /// Breadth-first ancestor walk from `from`, deduplicated by hash,
    /// calling `visit` once per distinct commit in BFS order.
    pub fn walk(&self, from: &str, mut visit: impl FnMut(&Commit)) -> Result<()> {
        let mut seen = HashSet::new();
        let mut queue = VecDeque::new();
        queue.push_back(from.to_string());
        seen.insert(from.to_string());

        while let Some(hash) = queue.pop_front() {
            let commit = self.load(&hash)?;
            visit(&commit);
            for parent in &commit.parents {
                if seen.insert(parent.clone()) {
                    queue.push_back(parent.clone());
                }
            }
        }
        Ok(())
    }

    fn ancestors(&self, from: &str) -> Result<std::collections::HashMap<Hash, (usize, i64)>> {
        // hash -> (BFS depth, timestamp), for LCA tie-breaking.
        let mut out = std::collections::HashMap::new();
        let mut queue = VecDeque::new();
        queue.push_back((from.to_string(), 0usize));
        while let Some((hash, depth)) = queue.pop_front() {
            if out.contains_key(&hash) {
                continue;
            }
            let commit = self.load(&hash)?;
            out.insert(hash.clone(), (depth, commit.ts));
            for parent in &commit.parents {
                queue.push_back((parent.clone(), depth + 1));
            }
        }
        Ok(out)
    }

    /// Lowest common ancestor of `a` and `b` via two-color BFS. Ties break
    /// toward the greater timestamp, then the lexicographically smaller
    /// hash.
    pub fn lca(&self, a: &str, b: &str) -> Result<Option<Hash>> {
        let from_a = self.ancestors(a)?;
        let from_b = self.ancestors(b)?;

        let mut candidates: Vec<(Hash, i64)> = from_a
            .iter()
            .filter_map(|(hash, (_, ts))| from_b.get(hash).map(|_| (hash.clone(), *ts)))
            .collect();

        if candidates.is_empty() {
            return Ok(None);
        }

        candidates.sort_by(|x, y| y.1.cmp(&x.1).then_with(|| x.0.cmp(&y.0)));
        Ok(Some(candidates[0].0.clone()))
    }

    /// Whether `ancestor` is reachable from `descendant` by following
    /// parent links (used for fast-forward detection).
    pub fn is_ancestor(&self, ancestor: &str, descendant: &str) -> Result<bool> {
        if ancestor == descendant {
            return Ok(true);
        }
        let mut found = false;
        self.walk(descendant, |c| {
            if c.hash == ancestor {
                found = true;
            }
        })?;
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commit::DatabaseState;
    use crate::storage::MemoryBackend;

    fn commit(parents: Vec<Hash>, ts: i64, msg: &str) -> Commit {
        Commit::new(parents, msg.into(), "author".into(), ts, DatabaseState::default())
    }

    #[test]
    fn save_load_round_trip() {
        let storage = MemoryBackend::new();
        let store = CommitStore::new(&storage);
        let c = commit(vec![], 1, "init");
        store.save(&c).unwrap();
        let loaded = store.load(&c.hash).unwrap();
        assert_eq!(loaded, c);
    }

    #[test]
    fn duplicate_save_is_idempotent() {
        let storage = MemoryBackend::new();
        let store = CommitStore::new(&storage);
        let c = commit(vec![], 1, "init");
        store.save(&c).unwrap();
        store.save(&c).unwrap(); // no AlreadyExists bubbling up
    }

    #[test]
    fn walk_deduplicates_diamond() {
        let storage = MemoryBackend::new();
        let store = CommitStore::new(&storage);
        let root = commit(vec![], 1, "root");
        store.save(&root).unwrap();
        let left = commit(vec![root.hash.clone()], 2, "left");
        store.save(&left).unwrap();
        let right = commit(vec![root.hash.clone()], 2, "right");
        store.save(&right).unwrap();
        let merge = commit(vec![left.hash.clone(), right.hash.clone()], 3, "merge");
        store.save(&merge).unwrap();

        let mut visited = Vec::new();
        store.walk(&merge.hash, |c| visited.push(c.hash.clone())).unwrap();
        assert_eq!(visited.len(), 4);
    }

    #[test]
    fn lca_picks_the_fork_point() {
        let storage = MemoryBackend::new();
        let store = CommitStore::new(&storage);
        let root = commit(vec![], 1, "root");
        store.save(&root).unwrap();
        let a = commit(vec![root.hash.clone()], 2, "a");
        store.save(&a).unwrap();
        let b = commit(vec![root.hash.clone()], 3, "b");
        store.save(&b).unwrap();

        let lca = store.lca(&a.hash, &b.hash).unwrap();
        assert_eq!(lca, Some(root.hash));
    }

    #[test]
    fn is_ancestor_detects_fast_forward() {
        let storage = MemoryBackend::new();
        let store = CommitStore::new(&storage);
        let root = commit(vec![], 1, "root");
        store.save(&root).unwrap();
        let child = commit(vec![root.hash.clone()], 2, "child");
        store.save(&child).unwrap();

        assert!(store.is_ancestor(&root.hash, &child.hash).unwrap());
        assert!(!store.is_ancestor(&child.hash, &root.hash).unwrap());
    }
}

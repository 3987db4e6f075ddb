//! Named branch pointers and HEAD, backed by a storage backend. Every
//! mutation is a compare-and-swap through
//! `StorageBackend::write_conditional`.

use crate::error::{DbError, Result};
use crate::hash::Hash;
use crate::storage::{StorageBackend, WriteOptions};

const HEAD_PATH: &str = "HEAD";

fn ref_path(name: &str) -> String {
    format!("refs/heads/{name}")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Head {
    Branch(String),
    Detached(Hash),
}

pub struct RefStore<'a> {
    storage: &'a dyn StorageBackend,
}

impl<'a> RefStore<'a> {
    pub fn new(storage: &'a dyn StorageBackend) -> Self {
        Self { storage }
    }

    /// CAS a branch ref to `hash`. `expected` is the etag this write must
    /// observe; `None` requires the ref not to exist yet.
    pub fn update_ref(&self, name: &str, hash: &Hash, expected: Option<&str>) -> Result<()> {
        let path = ref_path(name);
        let content = format!("{hash}\n");
        self.storage
            .write_conditional(&path, content.as_bytes(), expected)?;
        Ok(())
    }

    /// Unconditional ref write, used by callers that already hold a fresh
    /// etag from a prior read in the same turn (e.g. branch creation).
    pub fn force_update_ref(&self, name: &str, hash: &Hash) -> Result<()> {
        let path = ref_path(name);
        let content = format!("{hash}\n");
        self.storage.write_atomic(&path, content.as_bytes())?;
        Ok(())
    }

    pub fn resolve_ref(&self, name: &str) -> Result<Hash> {
        let data = self.storage.read(&ref_path(name))?;
        parse_ref_content(&data)
    }

    /// Current etag for a ref, used as the CAS `expected` for a subsequent
    /// `update_ref`.
    pub fn ref_etag(&self, name: &str) -> Result<String> {
        Ok(self.storage.stat(&ref_path(name))?.etag)
    }

    pub fn ref_exists(&self, name: &str) -> Result<bool> {
        self.storage.exists(&ref_path(name))
    }

    pub fn delete_ref(&self, name: &str) -> Result<bool> {
        self.storage.delete(&ref_path(name))
    }

    pub fn list_refs(&self) -> Result<Vec<String>> {
        let listed = self.storage.list("refs/heads", &Default::default())?;
        Ok(listed
            .files
            .into_iter()
            .filter_map(|f| f.strip_prefix("refs/heads/").map(str::to_string))
            .collect())
    }

    pub fn head(&self) -> Result<Head> {
        let data = self.storage.read(HEAD_PATH)?;
        let text = std::str::from_utf8(&data)
            .map_err(|_| DbError::Corruption("HEAD is not valid UTF-8".into()))?
            .trim();
        if let Some(name) = text.strip_prefix("ref: refs/heads/") {
            Ok(Head::Branch(name.to_string()))
        } else {
            Ok(Head::Detached(text.to_string()))
        }
    }

    pub fn set_head(&self, branch: &str) -> Result<()> {
        let content = format!("ref: refs/heads/{branch}\n");
        self.storage
            .write(HEAD_PATH, content.as_bytes(), &WriteOptions::default())?;
        Ok(())
    }

    pub fn detach_head(&self, commit: &Hash) -> Result<()> {
        let content = format!("{commit}\n");
        self.storage
            .write(HEAD_PATH, content.as_bytes(), &WriteOptions::default())?;
        Ok(())
    }

    /// Resolve HEAD to a commit hash, following a branch ref if attached.
    pub fn resolve_head(&self) -> Result<Hash> {
        match self.head()? {
            Head::Branch(name) => self.resolve_ref(&name),
            Head::Detached(hash) => Ok(hash),
        }
    }
}

fn parse_ref_content(data: &[u8]) -> Result<Hash> {
    std::str::from_utf8(data)
        .map(|s| s.trim().to_string())
        .map_err(|_| DbError::Corruption("ref content is not valid UTF-8".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryBackend;

    #[test]
    fn update_ref_is_cas() {
        let storage = MemoryBackend::new();
        let refs = RefStore::new(&storage);
        refs.update_ref("main", &"h1".to_string(), None).unwrap();
        assert_eq!(refs.resolve_ref("main").unwrap(), "h1");

        let etag = refs.ref_etag("main").unwrap();
        assert!(refs
            .update_ref("main", &"h2".to_string(), Some("wrong"))
            .is_err());
        refs.update_ref("main", &"h2".to_string(), Some(&etag))
            .unwrap();
        assert_eq!(refs.resolve_ref("main").unwrap(), "h2");
    }

    #[test]
    fn head_attached_and_detached() {
        let storage = MemoryBackend::new();
        let refs = RefStore::new(&storage);
        refs.set_head("main").unwrap();
        assert_eq!(refs.head().unwrap(), Head::Branch("main".into()));

        refs.detach_head(&"deadbeef".to_string()).unwrap();
        assert_eq!(refs.head().unwrap(), Head::Detached("deadbeef".into()));
    }

    #[test]
    fn concurrent_cas_one_winner() {
        let storage = MemoryBackend::new();
        let refs = RefStore::new(&storage);
        refs.update_ref("main", &"base".to_string(), None).unwrap();
        let etag = refs.ref_etag("main").unwrap();

        let r1 = refs.update_ref("main", &"a".to_string(), Some(&etag));
        let r2 = refs.update_ref("main", &"b".to_string(), Some(&etag));
        assert!(r1.is_ok() ^ r2.is_ok());
    }
}

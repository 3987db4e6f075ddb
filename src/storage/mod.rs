//! A uniform, block-addressable storage backend. The trait is deliberately
//! narrow so every durable subsystem — refs, commits, merge state, Parquet
//! tables — goes through the same atomicity and conditional-write
//! guarantees.

mod memory;
mod prefixed;
mod sqlite;
mod stream;
mod validate;

pub use memory::MemoryBackend;
pub use prefixed::PrefixedBackend;
pub use sqlite::SqliteBackend;
pub use stream::StreamingBackend;
pub use validate::validate_range;

use crate::error::{DbError, Result};

/// Preconditions for `write`, mirroring HTTP conditional semantics.
#[derive(Debug, Clone, Default)]
pub struct WriteOptions {
    /// Succeed only if the object's current etag equals this value.
    pub if_match: Option<String>,
    /// `Some("*")` succeeds only if the object does not exist.
    pub if_none_match: Option<String>,
}

impl WriteOptions {
    pub fn if_match(etag: impl Into<String>) -> Self {
        Self {
            if_match: Some(etag.into()),
            if_none_match: None,
        }
    }

    pub fn if_not_exists() -> Self {
        Self {
            if_match: None,
            if_none_match: Some("*".into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteOutcome {
    pub etag: String,
    pub size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectStat {
    pub size: u64,
    pub etag: String,
    pub is_directory: bool,
    pub content_type: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ListOptions {
    pub cursor: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Default)]
pub struct ListResult {
    pub files: Vec<String>,
    pub has_more: bool,
    pub cursor: Option<String>,
}

/// Normalize a path: strip leading/trailing `/`. Rejects paths that
/// normalize to empty or that step outside their own tree via `..`.
pub fn normalize_path(path: &str) -> Result<String> {
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() {
        return Err(DbError::InvalidPath("path must not be empty".into()));
    }
    if trimmed.split('/').any(|seg| seg == "..") {
        return Err(DbError::InvalidPath(format!(
            "path must not contain '..': {path}"
        )));
    }
    Ok(trimmed.to_string())
}

/// Uniform object-per-key storage contract. All paths passed in are
/// caller-relative; implementations normalize internally.
pub trait StorageBackend: Send + Sync {
    fn read(&self, path: &str) -> Result<Vec<u8>>;

    fn read_range(&self, path: &str, start: u64, end: u64) -> Result<Vec<u8>>;

    fn write(&self, path: &str, data: &[u8], opts: &WriteOptions) -> Result<WriteOutcome>;

    /// Durable replace, no torn reads visible to concurrent readers.
    fn write_atomic(&self, path: &str, data: &[u8]) -> Result<WriteOutcome> {
        self.write(path, data, &WriteOptions::default())
    }

    /// Atomic CAS against the object's current content address.
    /// `expected_version: None` means "must not exist".
    fn write_conditional(
        &self,
        path: &str,
        data: &[u8],
        expected_version: Option<&str>,
    ) -> Result<WriteOutcome> {
        let opts = match expected_version {
            Some(v) => WriteOptions::if_match(v),
            None => WriteOptions::if_not_exists(),
        };
        self.write(path, data, &opts)
    }

    fn exists(&self, path: &str) -> Result<bool>;

    fn stat(&self, path: &str) -> Result<ObjectStat>;

    /// Returns whether the object existed prior to deletion.
    fn delete(&self, path: &str) -> Result<bool>;

    /// Returns the number of objects removed.
    fn delete_prefix(&self, prefix: &str) -> Result<usize>;

    fn list(&self, prefix: &str, opts: &ListOptions) -> Result<ListResult>;

    fn copy(&self, from: &str, to: &str) -> Result<WriteOutcome> {
        let data = self.read(from)?;
        self.write(to, &data, &WriteOptions::default())
    }

    fn mv(&self, from: &str, to: &str) -> Result<WriteOutcome> {
        let outcome = self.copy(from, to)?;
        self.delete(from)?;
        Ok(outcome)
    }

    /// Append to an object, creating it if absent.
    fn append(&self, path: &str, data: &[u8]) -> Result<WriteOutcome> {
        let mut existing = match self.read(path) {
            Ok(bytes) => bytes,
            Err(DbError::NotFound(_)) => Vec::new(),
            Err(e) => return Err(e),
        };
        existing.extend_from_slice(data);
        self.write(path, &existing, &WriteOptions::default())
    }

    /// Whether this backend natively supports byte streaming. Callers opt
    /// in to stream use with this predicate rather than probing.
    fn supports_streaming(&self) -> bool {
        false
    }
}

impl StorageBackend for Box<dyn StorageBackend> {
    fn read(&self, path: &str) -> Result<Vec<u8>> {
        (**self).read(path)
    }

    fn read_range(&self, path: &str, start: u64, end: u64) -> Result<Vec<u8>> {
        (**self).read_range(path, start, end)
    }

    fn write(&self, path: &str, data: &[u8], opts: &WriteOptions) -> Result<WriteOutcome> {
        (**self).write(path, data, opts)
    }

    fn exists(&self, path: &str) -> Result<bool> {
        (**self).exists(path)
    }

    fn stat(&self, path: &str) -> Result<ObjectStat> {
        (**self).stat(path)
    }

    fn delete(&self, path: &str) -> Result<bool> {
        (**self).delete(path)
    }

    fn delete_prefix(&self, prefix: &str) -> Result<usize> {
        (**self).delete_prefix(prefix)
    }

    fn list(&self, prefix: &str, opts: &ListOptions) -> Result<ListResult> {
        (**self).list(prefix, opts)
    }

    fn supports_streaming(&self) -> bool {
        (**self).supports_streaming()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_slashes() {
        assert_eq!(normalize_path("/a/b/").unwrap(), "a/b");
    }

    #[test]
    fn normalize_rejects_empty() {
        assert!(normalize_path("///").is_err());
    }

    #[test]
    fn normalize_rejects_dotdot() {
        assert!(normalize_path("a/../b").is_err());
    }
}

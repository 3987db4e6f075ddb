//! Prefix-scoping decorator: applies a fixed path prefix transparently so
//! every name observed by the caller appears prefix-less.

use super::{ListOptions, ListResult, ObjectStat, StorageBackend, WriteOptions, WriteOutcome};
use crate::error::Result;

pub struct PrefixedBackend<B: StorageBackend> {
    inner: B,
    prefix: String,
}

impl<B: StorageBackend> PrefixedBackend<B> {
    pub fn new(inner: B, prefix: impl Into<String>) -> Self {
        Self {
            inner,
            prefix: prefix.into().trim_matches('/').to_string(),
        }
    }

    fn scoped(&self, path: &str) -> String {
        if self.prefix.is_empty() {
            path.trim_matches('/').to_string()
        } else {
            format!("{}/{}", self.prefix, path.trim_matches('/'))
        }
    }

    fn unscope(&self, path: &str) -> String {
        if self.prefix.is_empty() {
            path.to_string()
        } else {
            path.strip_prefix(&format!("{}/", self.prefix))
                .unwrap_or(path)
                .to_string()
        }
    }
}

impl<B: StorageBackend> StorageBackend for PrefixedBackend<B> {
    fn read(&self, path: &str) -> Result<Vec<u8>> {
        self.inner.read(&self.scoped(path))
    }

    fn read_range(&self, path: &str, start: u64, end: u64) -> Result<Vec<u8>> {
        self.inner.read_range(&self.scoped(path), start, end)
    }

    fn write(&self, path: &str, data: &[u8], opts: &WriteOptions) -> Result<WriteOutcome> {
        self.inner.write(&self.scoped(path), data, opts)
    }

    fn exists(&self, path: &str) -> Result<bool> {
        self.inner.exists(&self.scoped(path))
    }

    fn stat(&self, path: &str) -> Result<ObjectStat> {
        self.inner.stat(&self.scoped(path))
    }

    fn delete(&self, path: &str) -> Result<bool> {
        self.inner.delete(&self.scoped(path))
    }

    fn delete_prefix(&self, prefix: &str) -> Result<usize> {
        self.inner.delete_prefix(&self.scoped(prefix))
    }

    fn list(&self, prefix: &str, opts: &ListOptions) -> Result<ListResult> {
        let mut result = self.inner.list(&self.scoped(prefix), opts)?;
        result.files = result.files.iter().map(|f| self.unscope(f)).collect();
        Ok(result)
    }

    fn supports_streaming(&self) -> bool {
        self.inner.supports_streaming()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryBackend;

    #[test]
    fn names_appear_prefix_less_to_caller() {
        let backend = PrefixedBackend::new(MemoryBackend::new(), "tenant-a");
        backend
            .write("refs/heads/main", b"h1", &WriteOptions::default())
            .unwrap();
        assert_eq!(backend.read("refs/heads/main").unwrap(), b"h1");
        let listed = backend.list("refs", &ListOptions::default()).unwrap();
        assert_eq!(listed.files, vec!["refs/heads/main"]);
    }
}

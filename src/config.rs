//! Repository-wide configuration: storage backend selection and the
//! shredding policy, plus a single-flight cache so concurrent callers
//! loading the same policy share one load instead of racing.

use crate::error::Result;
use crate::schema::ShredConfig;
use crate::storage::{MemoryBackend, PrefixedBackend, SqliteBackend, StorageBackend};
use std::path::PathBuf;
use std::sync::{Mutex, RwLock};
use std::time::{Duration, Instant};

/// Which `StorageBackend` to construct. `Memory` is for tests and
/// short-lived processes; `Sqlite` is the durable default.
#[derive(Debug, Clone)]
pub enum BackendKind {
    Memory,
    Sqlite { path: PathBuf },
    SqliteInMemory,
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub backend: BackendKind,
    /// Key prefix every path is scoped under, for multi-tenant sharing of
    /// one physical backend.
    pub prefix: Option<String>,
}

impl StorageConfig {
    pub fn memory() -> Self {
        Self {
            backend: BackendKind::Memory,
            prefix: None,
        }
    }

    pub fn sqlite(path: impl Into<PathBuf>) -> Self {
        Self {
            backend: BackendKind::Sqlite { path: path.into() },
            prefix: None,
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// Build the concrete backend this config describes, wrapping it in a
    /// `PrefixedBackend` when a prefix was set.
    pub fn build(&self) -> Result<Box<dyn StorageBackend>> {
        let backend: Box<dyn StorageBackend> = match &self.backend {
            BackendKind::Memory => Box::new(MemoryBackend::new()),
            BackendKind::Sqlite { path } => Box::new(SqliteBackend::open(path)?),
            BackendKind::SqliteInMemory => Box::new(SqliteBackend::open_in_memory()?),
        };
        Ok(match &self.prefix {
            Some(prefix) => Box::new(PrefixedBackend::new(backend, prefix.clone())),
            None => backend,
        })
    }
}

/// Per-collection shredding policy overrides, keyed by collection name.
/// Collections absent from this map use `ShredConfig::default()`.
#[derive(Debug, Clone, Default)]
pub struct ShredPolicy {
    pub default: ShredConfig,
    pub overrides: std::collections::HashMap<String, ShredConfig>,
}

impl ShredPolicy {
    pub fn for_collection(&self, collection: &str) -> &ShredConfig {
        self.overrides.get(collection).unwrap_or(&self.default)
    }
}

/// Single-flight, TTL'd cache for a value expensive enough to load once per
/// process rather than once per call (the shredding policy and storage
/// config, loaded from the repository's own metadata collection). Readers
/// racing `get_or_init` before the first load all block on the same loader
/// call rather than each issuing their own.
pub struct ConfigCache<T> {
    ttl: Duration,
    inner: RwLock<Option<(T, Instant)>>,
    load_lock: Mutex<()>,
}

impl<T: Clone> ConfigCache<T> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            inner: RwLock::new(None),
            load_lock: Mutex::new(()),
        }
    }

    /// Return the cached value if still fresh, otherwise run `loader` once
    /// (serialized across callers via `load_lock`) and cache its result.
    pub fn get_or_init(&self, loader: impl FnOnce() -> Result<T>) -> Result<T> {
        if let Some(value) = self.fresh_value() {
            return Ok(value);
        }
        let _guard = self.load_lock.lock().unwrap();
        // Re-check: another thread may have populated the cache while we
        // waited for the load lock.
        if let Some(value) = self.fresh_value() {
            return Ok(value);
        }
        let value = loader()?;
        *self.inner.write().unwrap() = Some((value.clone(), Instant::now()));
        Ok(value)
    }

    fn fresh_value(&self) -> Option<T> {
        let guard = self.inner.read().unwrap();
        match &*guard {
            Some((value, loaded_at)) if loaded_at.elapsed() < self.ttl => Some(value.clone()),
            _ => None,
        }
    }

    /// Force the next `get_or_init` to reload, used by tests that mutate
    /// the underlying policy out from under a long-lived cache.
    pub fn clear_on_test(&self) {
        *self.inner.write().unwrap() = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn get_or_init_loads_once_until_ttl_expires() {
        let cache = ConfigCache::new(Duration::from_secs(3600));
        let calls = Arc::new(AtomicUsize::new(0));
        let c = calls.clone();
        let v1 = cache.get_or_init(|| {
            c.fetch_add(1, Ordering::SeqCst);
            Ok(42)
        }).unwrap();
        let v2 = cache.get_or_init(|| {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(99)
        }).unwrap();
        assert_eq!(v1, 42);
        assert_eq!(v2, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn clear_on_test_forces_reload() {
        let cache = ConfigCache::new(Duration::from_secs(3600));
        cache.get_or_init(|| Ok(1)).unwrap();
        cache.clear_on_test();
        let v = cache.get_or_init(|| Ok(2)).unwrap();
        assert_eq!(v, 2);
    }

    #[test]
    fn shred_policy_falls_back_to_default() {
        let mut policy = ShredPolicy::default();
        policy.overrides.insert(
            "posts".into(),
            ShredConfig { always: vec!["title".into()], ..ShredConfig::default() },
        );
        assert!(policy.for_collection("posts").always.contains(&"title".to_string()));
        assert!(policy.for_collection("users").always.is_empty());
    }
}

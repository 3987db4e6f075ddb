//! In-memory `StorageBackend`, the workhorse for unit tests across every
//! component: a bare put/get map generalized to the full conditional-write
//! contract.

use super::{
    normalize_path, validate_range, ListOptions, ListResult, ObjectStat, StorageBackend,
    WriteOptions, WriteOutcome,
};
use crate::error::{DbError, Result};
use crate::hash::content_hash;
use std::collections::BTreeMap;
use std::sync::Mutex;

#[derive(Clone)]
struct Object {
    data: Vec<u8>,
    etag: String,
}

#[derive(Default)]
pub struct MemoryBackend {
    objects: Mutex<BTreeMap<String, Object>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StorageBackend for MemoryBackend {
    fn read(&self, path: &str) -> Result<Vec<u8>> {
        let path = normalize_path(path)?;
        let objects = self.objects.lock().unwrap();
        objects
            .get(&path)
            .map(|o| o.data.clone())
            .ok_or_else(|| DbError::NotFound(path))
    }

    fn read_range(&self, path: &str, start: u64, end: u64) -> Result<Vec<u8>> {
        let data = self.read(path)?;
        let len = data.len() as u64;
        if start >= len {
            return Ok(Vec::new());
        }
        validate_range(start, end)?;
        let end = end.min(len);
        Ok(data[start as usize..end as usize].to_vec())
    }

    fn write(&self, path: &str, data: &[u8], opts: &WriteOptions) -> Result<WriteOutcome> {
        let norm = normalize_path(path)?;
        let mut objects = self.objects.lock().unwrap();
        let current = objects.get(&norm);

        if opts.if_none_match.as_deref() == Some("*") && current.is_some() {
            return Err(DbError::AlreadyExists(norm));
        }
        if let Some(expected) = &opts.if_match {
            let actual = current.map(|o| o.etag.clone());
            if actual.as_deref() != Some(expected.as_str()) {
                return Err(DbError::EtagMismatch {
                    path: norm,
                    expected: Some(expected.clone()),
                    actual,
                });
            }
        }

        // Etag must change on every distinct write to the same path so a
        // stale `ifMatch` from an earlier write never validates against a
        // later one, even if content happens to repeat.
        let etag = content_hash(
            format!("{}:{}:{}", norm, data.len(), objects.len()).as_bytes(),
        ) + &content_hash(data)[..8];
        let size = data.len() as u64;
        objects.insert(
            norm,
            Object {
                data: data.to_vec(),
                etag: etag.clone(),
            },
        );
        Ok(WriteOutcome { etag, size })
    }

    fn exists(&self, path: &str) -> Result<bool> {
        let path = normalize_path(path)?;
        Ok(self.objects.lock().unwrap().contains_key(&path))
    }

    fn stat(&self, path: &str) -> Result<ObjectStat> {
        let norm = normalize_path(path)?;
        let objects = self.objects.lock().unwrap();
        let obj = objects.get(&norm).ok_or_else(|| DbError::NotFound(norm))?;
        Ok(ObjectStat {
            size: obj.data.len() as u64,
            etag: obj.etag.clone(),
            is_directory: false,
            content_type: None,
        })
    }

    fn delete(&self, path: &str) -> Result<bool> {
        let norm = normalize_path(path)?;
        Ok(self.objects.lock().unwrap().remove(&norm).is_some())
    }

    fn delete_prefix(&self, prefix: &str) -> Result<usize> {
        let prefix = prefix.trim_matches('/');
        let mut objects = self.objects.lock().unwrap();
        let to_remove: Vec<String> = objects
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect();
        for k in &to_remove {
            objects.remove(k);
        }
        Ok(to_remove.len())
    }

    fn list(&self, prefix: &str, opts: &ListOptions) -> Result<ListResult> {
        let prefix = prefix.trim_matches('/');
        let objects = self.objects.lock().unwrap();
        let mut matches: Vec<&String> = objects
            .keys()
            .filter(|k| k.starts_with(prefix))
            .filter(|k| match opts.cursor.as_deref() {
                Some(c) => k.as_str() > c,
                None => true,
            })
            .collect();
        matches.sort();

        let limit = opts.limit.unwrap_or(usize::MAX);
        let has_more = matches.len() > limit;
        let files: Vec<String> = matches.into_iter().take(limit).cloned().collect();
        let cursor = if has_more {
            files.last().cloned()
        } else {
            None
        };
        Ok(ListResult {
            files,
            has_more,
            cursor,
        })
    }

    fn supports_streaming(&self) -> bool {
        false
    }
}

//! Reference `StorageBackend`: a single SQLite table, transactional
//! conditional writes. Opens a `rusqlite::Connection`, runs schema install
//! on open, and drives every mutation through an explicit `Transaction`.

use super::{normalize_path, validate_range, ListOptions, ListResult, ObjectStat, StorageBackend, WriteOptions, WriteOutcome};
use crate::error::{DbError, Result};
use crate::hash::content_hash;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;

pub struct SqliteBackend {
    conn: Mutex<Connection>,
}

impl SqliteBackend {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS blocks (
                path TEXT PRIMARY KEY,
                data BLOB NOT NULL,
                size INTEGER NOT NULL,
                etag TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn now() -> i64 {
        // Monotonic-enough wall clock for bookkeeping columns; never
        // observed by callers, only used to order `created_at`/`updated_at`.
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0)
    }
}

impl StorageBackend for SqliteBackend {
    fn read(&self, path: &str) -> Result<Vec<u8>> {
        let path = normalize_path(path)?;
        let conn = self.conn.lock().unwrap();
        conn.query_row("SELECT data FROM blocks WHERE path = ?1", params![path], |r| {
            r.get::<_, Vec<u8>>(0)
        })
        .optional()?
        .ok_or(DbError::NotFound(path))
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
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        let current_etag: Option<String> = tx
            .query_row("SELECT etag FROM blocks WHERE path = ?1", params![norm], |r| {
                r.get(0)
            })
            .optional()?;

        if opts.if_none_match.as_deref() == Some("*") && current_etag.is_some() {
            return Err(DbError::AlreadyExists(norm));
        }
        if let Some(expected) = &opts.if_match {
            if current_etag.as_deref() != Some(expected.as_str()) {
                return Err(DbError::EtagMismatch {
                    path: norm,
                    expected: Some(expected.clone()),
                    actual: current_etag,
                });
            }
        }

        let now = Self::now();
        let etag = format!("{}-{}", content_hash(data), now);
        let size = data.len() as i64;
        tx.execute(
            "INSERT INTO blocks(path, data, size, etag, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)
             ON CONFLICT(path) DO UPDATE SET data=excluded.data, size=excluded.size,
                etag=excluded.etag, updated_at=excluded.updated_at",
            params![norm, data, size, etag, now],
        )?;
        tx.commit()?;
        Ok(WriteOutcome {
            etag,
            size: size as u64,
        })
    }

    fn exists(&self, path: &str) -> Result<bool> {
        let path = normalize_path(path)?;
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM blocks WHERE path = ?1",
            params![path],
            |r| r.get(0),
        )?;
        Ok(count > 0)
    }

    fn stat(&self, path: &str) -> Result<ObjectStat> {
        let norm = normalize_path(path)?;
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT size, etag FROM blocks WHERE path = ?1",
            params![norm],
            |r| {
                Ok(ObjectStat {
                    size: r.get::<_, i64>(0)? as u64,
                    etag: r.get(1)?,
                    is_directory: false,
                    content_type: None,
                })
            },
        )
        .optional()?
        .ok_or(DbError::NotFound(norm))
    }

    fn delete(&self, path: &str) -> Result<bool> {
        let norm = normalize_path(path)?;
        let conn = self.conn.lock().unwrap();
        let n = conn.execute("DELETE FROM blocks WHERE path = ?1", params![norm])?;
        Ok(n > 0)
    }

    fn delete_prefix(&self, prefix: &str) -> Result<usize> {
        let prefix = prefix.trim_matches('/');
        let like = format!("{prefix}%");
        let conn = self.conn.lock().unwrap();
        let n = conn.execute("DELETE FROM blocks WHERE path LIKE ?1", params![like])?;
        Ok(n)
    }

    fn list(&self, prefix: &str, opts: &ListOptions) -> Result<ListResult> {
        let prefix = prefix.trim_matches('/');
        let like = format!("{prefix}%");
        let cursor = opts.cursor.clone().unwrap_or_default();
        let limit = opts.limit.unwrap_or(usize::MAX);
        // Fetch one extra row to detect `has_more` without a second query.
        let fetch = (limit as i64).saturating_add(1).min(i64::MAX);

        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT path FROM blocks WHERE path LIKE ?1 AND path > ?2 ORDER BY path LIMIT ?3",
        )?;
        let mut rows = stmt.query(params![like, cursor, fetch])?;
        let mut files = Vec::new();
        while let Some(row) = rows.next()? {
            files.push(row.get::<_, String>(0)?);
        }
        let has_more = files.len() > limit;
        if has_more {
            files.truncate(limit);
        }
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conditional_write_round_trip() {
        let s = SqliteBackend::open_in_memory().unwrap();
        let w1 = s.write("k", b"b1", &WriteOptions::default()).unwrap();
        assert!(matches!(
            s.write("k", b"b2", &WriteOptions::if_match("wrong")),
            Err(DbError::EtagMismatch { .. })
        ));
        let w2 = s.write("k", b"b2", &WriteOptions::if_match(&w1.etag)).unwrap();
        assert_ne!(w1.etag, w2.etag);
        assert_eq!(s.read("k").unwrap(), b"b2");
    }

    #[test]
    fn if_none_match_rejects_existing() {
        let s = SqliteBackend::open_in_memory().unwrap();
        s.write("k", b"v", &WriteOptions::if_not_exists()).unwrap();
        assert!(matches!(
            s.write("k", b"v2", &WriteOptions::if_not_exists()),
            Err(DbError::AlreadyExists(_))
        ));
    }

    #[test]
    fn delete_prefix_and_list() {
        let s = SqliteBackend::open_in_memory().unwrap();
        s.write("commits/a", b"1", &WriteOptions::default()).unwrap();
        s.write("commits/b", b"2", &WriteOptions::default()).unwrap();
        s.write("refs/heads/main", b"3", &WriteOptions::default())
            .unwrap();
        let listed = s.list("commits", &ListOptions::default()).unwrap();
        assert_eq!(listed.files, vec!["commits/a", "commits/b"]);
        assert_eq!(s.delete_prefix("commits").unwrap(), 2);
        assert!(s.exists("refs/heads/main").unwrap());
    }
}

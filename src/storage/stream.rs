//! Streaming decorator: builds stream capability out of `read`/`write` for
//! backends lacking native streams, modeled as blocking
//! `std::io::Read`/`Write` adapters.

use super::{ListOptions, ListResult, ObjectStat, StorageBackend, WriteOptions, WriteOutcome};
use crate::error::Result;
use std::io;

const DEFAULT_HIGH_WATER_MARK: usize = 64 * 1024;

#[derive(Debug, Clone, Default)]
pub struct StreamOptions {
    pub start: Option<u64>,
    pub end: Option<u64>,
    pub high_water_mark: Option<usize>,
}

pub struct StreamingBackend<B: StorageBackend> {
    inner: B,
}

impl<B: StorageBackend> StreamingBackend<B> {
    pub fn new(inner: B) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &B {
        &self.inner
    }

    pub fn create_read_stream(&self, path: &str, opts: &StreamOptions) -> Result<ReadStream<'_, B>> {
        let size = self.inner.stat(path)?.size;
        let start = opts.start.unwrap_or(0);
        let end = opts.end.unwrap_or(size).min(size);
        Ok(ReadStream {
            backend: &self.inner,
            path: path.to_string(),
            cursor: start,
            end,
            chunk: opts.high_water_mark.unwrap_or(DEFAULT_HIGH_WATER_MARK),
        })
    }

    pub fn create_write_stream(&self, path: &str, opts: &WriteOptions) -> WriteStream<'_, B> {
        WriteStream {
            backend: &self.inner,
            path: path.to_string(),
            opts: opts.clone(),
            buf: Vec::new(),
            aborted: false,
        }
    }
}

/// Reads in `high_water_mark`-sized chunks via `read_range`, emitting no
/// chunk larger than that bound.
pub struct ReadStream<'a, B: StorageBackend> {
    backend: &'a B,
    path: String,
    cursor: u64,
    end: u64,
    chunk: usize,
}

impl<'a, B: StorageBackend> io::Read for ReadStream<'a, B> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.cursor >= self.end {
            return Ok(0);
        }
        let want = (self.end - self.cursor).min(self.chunk as u64).min(buf.len() as u64);
        if want == 0 {
            return Ok(0);
        }
        let data = self
            .backend
            .read_range(&self.path, self.cursor, self.cursor + want)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;
        buf[..data.len()].copy_from_slice(&data);
        self.cursor += data.len() as u64;
        Ok(data.len())
    }
}

/// Buffers writes and commits atomically on `close`; `abort` discards the
/// buffer without touching the target object.
pub struct WriteStream<'a, B: StorageBackend> {
    backend: &'a B,
    path: String,
    opts: WriteOptions,
    buf: Vec<u8>,
    aborted: bool,
}

impl<'a, B: StorageBackend> io::Write for WriteStream<'a, B> {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a, B: StorageBackend> WriteStream<'a, B> {
    pub fn close(self) -> Result<WriteOutcome> {
        self.backend.write(&self.path, &self.buf, &self.opts)
    }

    pub fn abort(mut self) {
        self.aborted = true;
        self.buf.clear();
    }
}

// Delegate the unused capability predicate so `StreamingBackend` can be
// used anywhere a plain `StorageBackend` is expected.
impl<B: StorageBackend> StorageBackend for StreamingBackend<B> {
    fn read(&self, path: &str) -> Result<Vec<u8>> {
        self.inner.read(path)
    }
    fn read_range(&self, path: &str, start: u64, end: u64) -> Result<Vec<u8>> {
        self.inner.read_range(path, start, end)
    }
    fn write(&self, path: &str, data: &[u8], opts: &WriteOptions) -> Result<WriteOutcome> {
        self.inner.write(path, data, opts)
    }
    fn exists(&self, path: &str) -> Result<bool> {
        self.inner.exists(path)
    }
    fn stat(&self, path: &str) -> Result<ObjectStat> {
        self.inner.stat(path)
    }
    fn delete(&self, path: &str) -> Result<bool> {
        self.inner.delete(path)
    }
    fn delete_prefix(&self, prefix: &str) -> Result<usize> {
        self.inner.delete_prefix(prefix)
    }
    fn list(&self, prefix: &str, opts: &ListOptions) -> Result<ListResult> {
        self.inner.list(prefix, opts)
    }
    fn supports_streaming(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryBackend;
    use std::io::{Read, Write};

    #[test]
    fn read_stream_chunks_respect_high_water_mark() {
        let backend = StreamingBackend::new(MemoryBackend::new());
        backend
            .inner()
            .write("k", &vec![7u8; 10], &WriteOptions::default())
            .unwrap();
        let mut stream = backend
            .create_read_stream(
                "k",
                &StreamOptions {
                    start: None,
                    end: None,
                    high_water_mark: Some(3),
                },
            )
            .unwrap();
        let mut buf = [0u8; 3];
        let n = stream.read(&mut buf).unwrap();
        assert_eq!(n, 3);
    }

    #[test]
    fn write_stream_commits_on_close() {
        let backend = StreamingBackend::new(MemoryBackend::new());
        let mut stream = backend.create_write_stream("k", &WriteOptions::default());
        stream.write_all(b"hello").unwrap();
        stream.close().unwrap();
        assert_eq!(backend.inner().read("k").unwrap(), b"hello");
    }

    #[test]
    fn write_stream_abort_does_not_mutate_target() {
        let backend = StreamingBackend::new(MemoryBackend::new());
        let mut stream = backend.create_write_stream("k", &WriteOptions::default());
        stream.write_all(b"hello").unwrap();
        stream.abort();
        assert!(!backend.inner().exists("k").unwrap());
    }
}

use thiserror::Error;

/// Error taxonomy shared by every component. Kinds are intentionally coarse
/// and comparable so callers (merge engine, branch manager, external
/// collaborators) can match on them without downcasting.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("etag mismatch on {path}: expected {expected:?}, actual {actual:?}")]
    EtagMismatch {
        path: String,
        expected: Option<String>,
        actual: Option<String>,
    },

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("invalid range: {0}")]
    InvalidRange(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("corruption: {0}")]
    Corruption(String),

    #[error("merge already in progress")]
    MergeInProgress,

    #[error("{count} conflict(s) remaining")]
    ConflictsRemaining { count: usize },

    #[error("permission denied: {0}")]
    PermissionDenied(String),
}

pub type Result<T> = std::result::Result<T, DbError>;

impl From<std::io::Error> for DbError {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::NotFound => DbError::NotFound(e.to_string()),
            _ => DbError::Io(e.to_string()),
        }
    }
}

impl From<serde_json::Error> for DbError {
    fn from(e: serde_json::Error) -> Self {
        DbError::Corruption(format!("json: {e}"))
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(e: rusqlite::Error) -> Self {
        DbError::Io(format!("sqlite: {e}"))
    }
}

impl From<parquet::errors::ParquetError> for DbError {
    fn from(e: parquet::errors::ParquetError) -> Self {
        DbError::Corruption(format!("parquet: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn etag_mismatch_carries_context() {
        let e = DbError::EtagMismatch {
            path: "refs/heads/main".into(),
            expected: Some("e1".into()),
            actual: Some("e2".into()),
        };
        assert!(e.to_string().contains("e1"));
        assert!(e.to_string().contains("e2"));
    }

    #[test]
    fn conflicts_remaining_counts() {
        let e = DbError::ConflictsRemaining { count: 3 };
        assert!(e.to_string().contains('3'));
    }
}

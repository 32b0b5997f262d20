//! Error types for the media catalog scanner

use std::io;
use std::path::PathBuf;
use thiserror::Error;

use crate::models::EntryId;

/// Errors that abort a whole scan operation
#[derive(Debug, Error)]
pub enum ScanError {
    /// The scan root does not exist or is not a directory
    #[error("invalid scan root {path:?}: {reason}")]
    InvalidRoot { path: PathBuf, reason: String },

    /// The catalog failed outside of a recoverable batch
    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),

    /// The hash worker pool could not be used
    #[error("hasher error: {0}")]
    Hasher(#[from] HashError),
}

impl ScanError {
    /// Create an invalid root error
    pub fn invalid_root(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::InvalidRoot {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// Errors raised while computing a content digest
#[derive(Debug, Error)]
pub enum HashError {
    #[error("file not found: {0:?}")]
    NotFound(PathBuf),

    #[error("permission denied: {0:?}")]
    PermissionDenied(PathBuf),

    #[error("not a regular file: {0:?}")]
    NotAFile(PathBuf),

    #[error("I/O error reading {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The rayon pool could not be created
    #[error("failed to build hash worker pool: {0}")]
    PoolBuild(String),

    /// `shutdown()` was already called on the hasher
    #[error("hash worker pool has been shut down")]
    ShutDown,
}

impl HashError {
    /// Map an I/O error on `path` to the matching variant
    pub fn from_io(path: impl Into<PathBuf>, err: io::Error) -> Self {
        let path = path.into();
        match err.kind() {
            io::ErrorKind::NotFound => Self::NotFound(path),
            io::ErrorKind::PermissionDenied => Self::PermissionDenied(path),
            _ => Self::Io { path, source: err },
        }
    }
}

/// Errors reported by a [`Catalog`](crate::catalog::Catalog) implementation
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("entry has no id; insert it before updating")]
    MissingId,

    #[error("entry {0} not found")]
    NotFound(EntryId),

    #[error("no batch transaction is open")]
    NoActiveBatch,

    #[error("a batch transaction is already open")]
    BatchAlreadyOpen,

    /// A stored row could not be decoded
    #[error("corrupt catalog row: {0}")]
    Corrupt(String),
}

/// Category of a per-file failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileErrorKind {
    /// Stat or open failed (missing file, permission denied)
    FileAccess,
    /// Reading the content for hashing failed
    HashComputation,
    /// The catalog rejected the write, or its batch was rolled back
    CatalogWrite,
}

impl FileErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileErrorKind::FileAccess => "file_access",
            FileErrorKind::HashComputation => "hash_computation",
            FileErrorKind::CatalogWrite => "catalog_write",
        }
    }
}

/// A failure confined to one file; recorded in the scan report, never thrown
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{path:?}: {message}")]
pub struct FileError {
    pub kind: FileErrorKind,
    pub path: PathBuf,
    pub message: String,
}

impl FileError {
    /// Create a new file error
    pub fn new(kind: FileErrorKind, path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self {
            kind,
            path: path.into(),
            message: message.into(),
        }
    }

    /// Stat/open failure
    pub fn access(path: impl Into<PathBuf>, err: &io::Error) -> Self {
        Self::new(FileErrorKind::FileAccess, path, err.to_string())
    }

    /// Hashing failure. Missing or unreadable files keep the access kind.
    pub fn from_hash(path: impl Into<PathBuf>, err: &HashError) -> Self {
        let kind = match err {
            HashError::NotFound(_) | HashError::PermissionDenied(_) | HashError::NotAFile(_) => {
                FileErrorKind::FileAccess
            }
            _ => FileErrorKind::HashComputation,
        };
        Self::new(kind, path, err.to_string())
    }

    /// Catalog lookup or write failure
    pub fn catalog(path: impl Into<PathBuf>, err: &CatalogError) -> Self {
        Self::new(FileErrorKind::CatalogWrite, path, err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_error_from_io_kind() {
        let err = HashError::from_io("/a", io::Error::from(io::ErrorKind::NotFound));
        assert!(matches!(err, HashError::NotFound(_)));

        let err = HashError::from_io("/a", io::Error::from(io::ErrorKind::PermissionDenied));
        assert!(matches!(err, HashError::PermissionDenied(_)));

        let err = HashError::from_io("/a", io::Error::from(io::ErrorKind::UnexpectedEof));
        assert!(matches!(err, HashError::Io { .. }));
    }

    #[test]
    fn test_file_error_kind_from_hash() {
        let missing = FileError::from_hash("/a.mp4", &HashError::NotFound("/a.mp4".into()));
        assert_eq!(missing.kind, FileErrorKind::FileAccess);

        let io = HashError::from_io("/a.mp4", io::Error::other("bad sector"));
        assert_eq!(
            FileError::from_hash("/a.mp4", &io).kind,
            FileErrorKind::HashComputation
        );
    }

    #[test]
    fn test_file_error_display_contains_path() {
        let err = FileError::new(FileErrorKind::CatalogWrite, "/m/x.mp3", "rolled back");
        let text = err.to_string();
        assert!(text.contains("x.mp3"));
        assert!(text.contains("rolled back"));
    }
}

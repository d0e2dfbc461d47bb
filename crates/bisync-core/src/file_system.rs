use std::path::Path;
use std::sync::Arc;

use thiserror::Error;

/// Errors from the local filesystem seam.
///
/// Trimmed from the teacher's `file_system::FsError`: only the variants
/// this crate's working-directory and lock-file operations can actually
/// produce are kept.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FsError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("not a directory: {0}")]
    NotADirectory(String),
}

/// The only local filesystem operations the engine performs directly —
/// everything against the *synced* trees goes through
/// [`crate::transfer::TransferDriver`] instead (spec §4.2). Kept as a
/// trait so the engine and snapshot store can be unit-tested against an
/// in-memory fake.
pub trait FileSystem: Send + Sync {
    fn exists(&self, path: &Path) -> bool;
    fn is_dir(&self, path: &Path) -> bool;
    fn create_dir_all(&self, path: &Path) -> Result<(), FsError>;
    fn read_to_string(&self, path: &Path) -> Result<String, FsError>;
    fn write(&self, path: &Path, content: &str) -> Result<(), FsError>;
    fn rename(&self, from: &Path, to: &Path) -> Result<(), FsError>;
    fn remove_file(&self, path: &Path) -> Result<(), FsError>;
}

/// Lets a shared `Arc<FakeFileSystem>` be boxed into an `Engine` while a
/// test keeps its own handle to inspect written files afterward, mirroring
/// the equivalent blanket impl on [`crate::transfer::TransferDriver`].
impl<T: FileSystem + ?Sized> FileSystem for Arc<T> {
    fn exists(&self, path: &Path) -> bool {
        (**self).exists(path)
    }

    fn is_dir(&self, path: &Path) -> bool {
        (**self).is_dir(path)
    }

    fn create_dir_all(&self, path: &Path) -> Result<(), FsError> {
        (**self).create_dir_all(path)
    }

    fn read_to_string(&self, path: &Path) -> Result<String, FsError> {
        (**self).read_to_string(path)
    }

    fn write(&self, path: &Path, content: &str) -> Result<(), FsError> {
        (**self).write(path, content)
    }

    fn rename(&self, from: &Path, to: &Path) -> Result<(), FsError> {
        (**self).rename(from, to)
    }

    fn remove_file(&self, path: &Path) -> Result<(), FsError> {
        (**self).remove_file(path)
    }
}

#[derive(Debug, Default)]
pub struct RealFileSystem;

impl RealFileSystem {
    pub fn new() -> Self {
        Self
    }

    fn map_io_error(e: std::io::Error, path: &Path) -> FsError {
        match e.kind() {
            std::io::ErrorKind::NotFound => FsError::NotFound(path.display().to_string()),
            std::io::ErrorKind::PermissionDenied => {
                FsError::PermissionDenied(path.display().to_string())
            }
            _ => FsError::Io(format!("{}: {}", path.display(), e)),
        }
    }
}

impl FileSystem for RealFileSystem {
    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn create_dir_all(&self, path: &Path) -> Result<(), FsError> {
        std::fs::create_dir_all(path).map_err(|e| Self::map_io_error(e, path))
    }

    fn read_to_string(&self, path: &Path) -> Result<String, FsError> {
        std::fs::read_to_string(path).map_err(|e| Self::map_io_error(e, path))
    }

    fn write(&self, path: &Path, content: &str) -> Result<(), FsError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| Self::map_io_error(e, parent))?;
        }
        std::fs::write(path, content).map_err(|e| Self::map_io_error(e, path))
    }

    fn rename(&self, from: &Path, to: &Path) -> Result<(), FsError> {
        std::fs::rename(from, to).map_err(|e| Self::map_io_error(e, from))
    }

    fn remove_file(&self, path: &Path) -> Result<(), FsError> {
        std::fs::remove_file(path).map_err(|e| Self::map_io_error(e, path))
    }
}

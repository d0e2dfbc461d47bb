use std::path::{Path, PathBuf};
use std::thread::sleep;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use thiserror::Error;

use crate::file_system::FileSystem;

const POLL_INTERVAL: Duration = Duration::from_secs(1);
const POLL_ATTEMPTS: u32 = 5;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LockError {
    #[error("could not acquire lock at {path}: held by another run")]
    AlreadyHeld { path: String },

    #[error("lock file I/O error: {0}")]
    Io(String),
}

/// Advisory, cooperative single-run guard backed by a well-known lock
/// file (spec §4.6). Acquisition polls for up to 5 seconds at 1-second
/// intervals; release happens on every code path via `Drop`.
///
/// The lock is not OS-level mandatory: on process crash the file
/// survives and blocks subsequent runs until removed manually.
pub struct RunLock<'a> {
    fs: &'a dyn FileSystem,
    path: PathBuf,
    released: bool,
}

impl<'a> RunLock<'a> {
    pub fn acquire(fs: &'a dyn FileSystem, path: &Path, owner: &str) -> Result<Self, LockError> {
        for attempt in 0..=POLL_ATTEMPTS {
            if !fs.exists(path) {
                let now = SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .unwrap_or_default()
                    .as_secs();
                let contents = format!("{owner}\n{now}\n");
                fs.write(path, &contents)
                    .map_err(|e| LockError::Io(e.to_string()))?;
                return Ok(Self {
                    fs,
                    path: path.to_path_buf(),
                    released: false,
                });
            }
            if attempt < POLL_ATTEMPTS {
                sleep(POLL_INTERVAL);
            }
        }
        Err(LockError::AlreadyHeld {
            path: path.display().to_string(),
        })
    }
}

impl Drop for RunLock<'_> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        if let Err(err) = self.fs.remove_file(&self.path) {
            log::warn!(
                "failed to release run lock at {}: {err}",
                self.path.display()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fake_fs::FakeFileSystem;

    #[test]
    fn acquires_and_releases_lock() {
        let fs = FakeFileSystem::new();
        let path = PathBuf::from("/tmp/test_LOCK");
        {
            let _lock = RunLock::acquire(&fs, &path, "owner").unwrap();
            assert!(fs.exists(&path));
        }
        assert!(!fs.exists(&path));
    }

    #[test]
    fn fails_when_already_held() {
        let fs = FakeFileSystem::new();
        let path = PathBuf::from("/tmp/test_LOCK");
        fs.write(&path, "other-owner\n0\n").unwrap();
        let result = RunLock::acquire(&fs, &path, "owner");
        assert!(matches!(result, Err(LockError::AlreadyHeld { .. })));
    }
}

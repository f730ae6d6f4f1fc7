//! Cross-process advisory locking for the registry file.
//!
//! Every CLI invocation that loads the registry takes an exclusive advisory
//! lock on a sibling lock file before touching the JSON. The lock file's
//! content is irrelevant and never read; only the OS-level lock on it matters.
//! In-process mutexes cannot replace this; correctness depends on excluding
//! other *processes* that share nothing but the filesystem.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use fs2::FileExt;

use crate::errors::RegistryError;

/// How long `acquire` waits before giving up with `LockTimeout`.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// Poll interval between lock attempts while another process holds it.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// An exclusive advisory file lock, released on drop.
///
/// The lock file itself is never deleted; removing it while another process
/// is blocked on it would let two holders in.
#[derive(Debug)]
pub struct FileLock {
    file: File,
    path: PathBuf,
}

impl FileLock {
    /// Acquire the lock at `path`, polling until `timeout` elapses.
    ///
    /// Parent directories are created as needed. Contention past the deadline
    /// returns `RegistryError::LockTimeout`; the caller surfaces that to the
    /// user rather than retrying internally.
    pub fn acquire(path: &Path, timeout: Duration) -> Result<Self, RegistryError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)?;

        let deadline = Instant::now() + timeout;
        loop {
            match file.try_lock_exclusive() {
                Ok(()) => {
                    tracing::debug!("acquired registry lock at {}", path.display());
                    return Ok(Self {
                        file,
                        path: path.to_path_buf(),
                    });
                }
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
                    if Instant::now() >= deadline {
                        return Err(RegistryError::LockTimeout {
                            path: path.to_path_buf(),
                            waited_ms: timeout.as_millis() as u64,
                        });
                    }
                    std::thread::sleep(POLL_INTERVAL);
                }
                Err(err) => return Err(RegistryError::Io(err)),
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        // The OS releases the lock when the descriptor closes; the explicit
        // unlock just makes the release point deterministic.
        let _ = FileExt::unlock(&self.file);
        tracing::debug!("released registry lock at {}", self.path.display());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn acquire_creates_lock_file_and_parents() {
        let tmp = TempDir::new().unwrap();
        let lock_path = tmp.path().join(".dual").join("registry.lock");

        let lock = FileLock::acquire(&lock_path, DEFAULT_LOCK_TIMEOUT).unwrap();
        assert!(lock_path.exists());
        assert_eq!(lock.path(), lock_path);
    }

    #[test]
    fn second_acquire_times_out_while_first_is_held() {
        let tmp = TempDir::new().unwrap();
        let lock_path = tmp.path().join("registry.lock");

        let _held = FileLock::acquire(&lock_path, DEFAULT_LOCK_TIMEOUT).unwrap();
        let err = FileLock::acquire(&lock_path, Duration::from_millis(120)).unwrap_err();
        match err {
            RegistryError::LockTimeout { path, waited_ms } => {
                assert_eq!(path, lock_path);
                assert_eq!(waited_ms, 120);
            }
            other => panic!("Expected LockTimeout, got {other:?}"),
        }
    }

    #[test]
    fn lock_is_reacquirable_after_drop() {
        let tmp = TempDir::new().unwrap();
        let lock_path = tmp.path().join("registry.lock");

        drop(FileLock::acquire(&lock_path, DEFAULT_LOCK_TIMEOUT).unwrap());
        let reacquired = FileLock::acquire(&lock_path, Duration::from_millis(200));
        assert!(reacquired.is_ok());
    }
}

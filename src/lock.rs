//! Filesystem locking for the mirror output directory
//!
//! A sync run is a read-modify-write over the whole mirror, so only one
//! process may run against a given output root at a time. The lock is an
//! `flock()` on a file named after the root; the OS releases it if the
//! process dies.

use crate::error::{MirrorError, StoreError};
use crate::mirror::MirrorStore;
use anyhow::{Context, Result};
use fs2::FileExt;
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Lock file path for a given output root
fn lock_file_path(lock_dir: &Path, output_root: &str) -> PathBuf {
    let mut hasher = Sha256::new();
    hasher.update(output_root.as_bytes());
    let hash = format!("{:x}", hasher.finalize());
    lock_dir.join(format!("{}.lock", &hash[..16]))
}

/// Normalize the output root so different spellings share one lock
fn normalize(output_root: &Path) -> String {
    output_root
        .canonicalize()
        .unwrap_or_else(|_| output_root.to_path_buf())
        .display()
        .to_string()
}

/// Exclusive lock on a mirror output root, released on drop
#[derive(Debug)]
pub struct MirrorLock {
    _file: File,
    path: PathBuf,
}

impl MirrorLock {
    /// Try to lock `output_root` without blocking.
    ///
    /// Returns `Ok(None)` if another holder has it.
    pub fn try_acquire(lock_dir: &Path, output_root: &Path) -> Result<Option<Self>> {
        let normalized = normalize(output_root);
        let lock_path = lock_file_path(lock_dir, &normalized);

        fs::create_dir_all(lock_dir).context("Failed to create lock directory")?;
        let file = File::create(&lock_path).context("Failed to create lock file")?;

        match file.try_lock_exclusive() {
            Ok(()) => {
                tracing::debug!("Locked mirror {} ({:?})", normalized, lock_path);
                Ok(Some(Self {
                    _file: file,
                    path: lock_path,
                }))
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                tracing::debug!("Mirror {} is locked by another holder", normalized);
                Ok(None)
            }
            Err(e) => Err(e).context("Failed to acquire mirror lock"),
        }
    }

    /// Poll for the lock until `timeout` expires
    pub fn acquire_blocking(
        lock_dir: &Path,
        output_root: &Path,
        timeout: Duration,
    ) -> Result<Option<Self>> {
        let start = Instant::now();
        let sleep_interval = Duration::from_millis(250);

        loop {
            if let Some(guard) = Self::try_acquire(lock_dir, output_root)? {
                return Ok(Some(guard));
            }
            if start.elapsed() >= timeout {
                tracing::warn!(
                    "Timed out after {:?} waiting for lock on {}",
                    timeout,
                    output_root.display()
                );
                return Ok(None);
            }
            std::thread::sleep(sleep_interval);
        }
    }

    /// Lock `store` for a one-off write, waiting up to `timeout` for a
    /// running sync to finish.
    pub fn acquire_store(
        lock_dir: &Path,
        store: &MirrorStore,
        timeout: Duration,
    ) -> Result<Self, MirrorError> {
        Self::acquire_blocking(lock_dir, store.root(), timeout)?
            .ok_or_else(|| StoreError::Locked(store.root().display().to_string()).into())
    }

}

impl Drop for MirrorLock {
    fn drop(&mut self) {
        tracing::debug!("Releasing mirror lock {:?}", self.path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use tempfile::tempdir;

    #[test]
    fn test_acquire_and_release() {
        let locks = tempdir().unwrap();
        let root = tempdir().unwrap();

        let guard = MirrorLock::try_acquire(locks.path(), root.path()).unwrap();
        assert!(guard.is_some());
        drop(guard);

        let again = MirrorLock::try_acquire(locks.path(), root.path()).unwrap();
        assert!(again.is_some());
    }

    #[test]
    fn test_second_holder_is_refused() {
        let locks = tempdir().unwrap();
        let root = tempdir().unwrap();

        let _held = MirrorLock::try_acquire(locks.path(), root.path())
            .unwrap()
            .unwrap();

        let lock_dir = locks.path().to_path_buf();
        let output = root.path().to_path_buf();
        let handle = thread::spawn(move || MirrorLock::try_acquire(&lock_dir, &output).unwrap());
        assert!(handle.join().unwrap().is_none());
    }

    #[test]
    fn test_blocking_acquire_times_out() {
        let locks = tempdir().unwrap();
        let root = tempdir().unwrap();
        let _held = MirrorLock::try_acquire(locks.path(), root.path())
            .unwrap()
            .unwrap();

        let lock_dir = locks.path().to_path_buf();
        let output = root.path().to_path_buf();
        let handle = thread::spawn(move || {
            MirrorLock::acquire_blocking(&lock_dir, &output, Duration::from_millis(100)).unwrap()
        });
        assert!(handle.join().unwrap().is_none());
    }

    #[test]
    fn test_store_lock_waits_for_holder() {
        let locks = tempdir().unwrap();
        let root = tempdir().unwrap();
        let store = MirrorStore::new(root.path());

        let held = MirrorLock::try_acquire(locks.path(), root.path())
            .unwrap()
            .unwrap();

        let lock_dir = locks.path().to_path_buf();
        let contender = store.clone();
        let err = thread::spawn(move || {
            MirrorLock::acquire_store(&lock_dir, &contender, Duration::from_millis(100))
        })
        .join()
        .unwrap()
        .unwrap_err();
        assert!(matches!(err, MirrorError::Store(StoreError::Locked(_))));

        let lock_dir = locks.path().to_path_buf();
        let waiter = thread::spawn(move || {
            MirrorLock::acquire_store(&lock_dir, &store, Duration::from_secs(5)).map(|_| ())
        });
        thread::sleep(Duration::from_millis(200));
        drop(held);
        assert!(waiter.join().unwrap().is_ok());
    }

    #[test]
    fn test_lock_file_path_uniqueness() {
        let dir = Path::new("/locks");
        assert_ne!(
            lock_file_path(dir, "/srv/mirror-a"),
            lock_file_path(dir, "/srv/mirror-b")
        );
        assert_eq!(
            lock_file_path(dir, "/srv/mirror-a"),
            lock_file_path(dir, "/srv/mirror-a")
        );
    }
}

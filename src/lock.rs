use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::fs::{self, File, OpenOptions};
use std::hash::{Hash, Hasher};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process;
use std::time::{Duration, SystemTime};

use crate::error::AppError;

const LOCK_DIR: &str = "/tmp/arrsweep-locks";

#[derive(Debug, Serialize, Deserialize)]
struct LockInfo {
    pid: u32,
    hostname: String,
    started_at: SystemTime,
    command: String,
    config_path: PathBuf,
}

/// Exclusive per-config lock: two daemons must never sweep the same
/// media managers and download clients at once.
pub struct InstanceLockGuard {
    lock_path: PathBuf,
    lock_file: File,
}

impl InstanceLockGuard {
    fn canonical(config_path: &Path) -> PathBuf {
        config_path
            .canonicalize()
            .unwrap_or_else(|_| config_path.to_path_buf())
    }

    fn generate_lock_path(config_path: &Path) -> PathBuf {
        let mut hasher = DefaultHasher::new();
        Self::canonical(config_path).hash(&mut hasher);
        PathBuf::from(LOCK_DIR).join(format!("lock-{:016x}.lock", hasher.finish()))
    }

    /// Non-blocking; fails with [`AppError::InstanceLocked`] when another live
    /// process holds the lock for the same configuration file.
    pub fn try_lock(config_path: &Path) -> Result<Self, AppError> {
        // Ensure lock directory exists
        fs::create_dir_all(LOCK_DIR).map_err(|e| AppError::LockError {
            message: format!("Failed to create lock directory {LOCK_DIR}: {e}"),
        })?;

        let lock_path = Self::generate_lock_path(config_path);
        let config_path = Self::canonical(config_path);

        // Clean up stale locks from dead processes
        if lock_path.exists() {
            Self::cleanup_stale_lock(&lock_path);
        }

        // Truncating before the lock is held would wipe the owner's info.
        let mut lock_file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .read(true)
            .open(&lock_path)
            .map_err(|e| AppError::LockError {
                message: format!("Failed to open lock file {}: {e}", lock_path.display()),
            })?;

        // Try to acquire exclusive lock (non-blocking)
        if lock_file.try_lock_exclusive().is_err() {
            // Held by another process, report its owner
            let (owner_pid, owner_host, locked_for) = match Self::read_lock_info(&lock_path) {
                Some(info) => (
                    info.pid,
                    info.hostname,
                    SystemTime::now()
                        .duration_since(info.started_at)
                        .unwrap_or_default(),
                ),
                None => (0, "unknown".to_string(), Duration::ZERO),
            };
            return Err(AppError::InstanceLocked {
                config: config_path.display().to_string(),
                owner_pid,
                owner_host,
                locked_for,
            });
        }

        let info = LockInfo {
            pid: process::id(),
            hostname: hostname::get().map_or_else(
                |_| "unknown".to_string(),
                |h| h.to_string_lossy().to_string(),
            ),
            started_at: SystemTime::now(),
            command: std::env::args().collect::<Vec<_>>().join(" "),
            config_path,
        };

        // Write process info to lock file
        lock_file.set_len(0).ok();
        lock_file
            .write_all(serde_json::to_string(&info)?.as_bytes())
            .map_err(|e| AppError::LockError {
                message: format!("Failed to write lock info: {e}"),
            })?;
        lock_file.sync_all().ok();

        Ok(Self {
            lock_path,
            lock_file,
        })
    }

    fn cleanup_stale_lock(lock_path: &Path) {
        let Ok(file) = OpenOptions::new().write(true).read(true).open(lock_path) else {
            return;
        };
        // Holding the flock means the previous owner exited without cleanup.
        if file.try_lock_exclusive().is_err() {
            return;
        }
        if let Some(info) = Self::read_lock_info(lock_path)
            && !Self::is_process_alive(info.pid)
        {
            tracing::warn!(
                "Removing stale lock from dead process {} ({}) at {}",
                info.pid,
                info.hostname,
                lock_path.display()
            );
            // Unlock before removing
            let _ = file.unlock();
            drop(file);
            fs::remove_file(lock_path).ok();
            return;
        }
        // Owner is still alive, leave its lock in place
        let _ = file.unlock();
    }

    /// Read lock info from file
    fn read_lock_info(lock_path: &Path) -> Option<LockInfo> {
        let mut contents = String::new();
        File::open(lock_path)
            .ok()?
            .read_to_string(&mut contents)
            .ok()?;
        serde_json::from_str(&contents).ok()
    }

    /// Check if a process is still alive
    fn is_process_alive(pid: u32) -> bool {
        #[cfg(unix)]
        {
            // Signal 0 only checks that the process exists
            use nix::sys::signal::kill;
            use nix::unistd::Pid;

            i32::try_from(pid).is_ok_and(|pid| kill(Pid::from_raw(pid), None).is_ok())
        }

        // No reliable check elsewhere; the flock still guards correctness
        #[cfg(not(unix))]
        {
            let _ = pid;
            true
        }
    }

    /// Get lock file path for display
    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }
}

impl Drop for InstanceLockGuard {
    fn drop(&mut self) {
        // Release lock and remove lock file
        let _ = self.lock_file.unlock();
        if let Err(e) = fs::remove_file(&self.lock_path) {
            tracing::warn!(
                "Failed to remove lock file {}: {}",
                self.lock_path.display(),
                e
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config_file(dir: &TempDir, name: &str) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, "{}").unwrap();
        path
    }

    #[test]
    fn test_lock_and_release() {
        let dir = TempDir::new().unwrap();
        let config = config_file(&dir, "config.yaml");

        let guard = InstanceLockGuard::try_lock(&config).unwrap();
        let lock_path = guard.lock_path().to_path_buf();
        assert!(lock_path.exists());
        assert!(lock_path.starts_with(LOCK_DIR));

        drop(guard);
        assert!(!lock_path.exists());
    }

    #[test]
    fn test_lock_conflict() {
        let dir = TempDir::new().unwrap();
        let config = config_file(&dir, "config.yaml");

        let _guard = InstanceLockGuard::try_lock(&config).unwrap();
        match InstanceLockGuard::try_lock(&config) {
            Err(AppError::InstanceLocked { owner_pid, .. }) => {
                assert_eq!(owner_pid, process::id());
            }
            Err(other) => panic!("Expected InstanceLocked, got {other:?}"),
            Ok(_) => panic!("Expected InstanceLocked, got a second guard"),
        }
    }

    #[test]
    fn test_different_configs_different_locks() {
        let dir = TempDir::new().unwrap();
        let first = InstanceLockGuard::try_lock(&config_file(&dir, "a.yaml")).unwrap();
        let second = InstanceLockGuard::try_lock(&config_file(&dir, "b.yaml")).unwrap();
        assert_ne!(first.lock_path(), second.lock_path());
    }

    #[test]
    fn test_same_file_through_relative_segments() {
        let dir = TempDir::new().unwrap();
        let config = config_file(&dir, "config.yaml");
        fs::create_dir_all(dir.path().join("sub")).unwrap();
        let indirect = dir.path().join("sub").join("..").join("config.yaml");

        assert_eq!(
            InstanceLockGuard::generate_lock_path(&config),
            InstanceLockGuard::generate_lock_path(&indirect)
        );
    }

    #[test]
    fn test_process_liveness() {
        assert!(InstanceLockGuard::is_process_alive(process::id()));
        #[cfg(unix)]
        assert!(!InstanceLockGuard::is_process_alive(999_999_999));
    }

    #[test]
    fn test_stale_lock_cleanup() {
        let dir = TempDir::new().unwrap();
        let config = config_file(&dir, "stale.yaml");
        fs::create_dir_all(LOCK_DIR).unwrap();

        let lock_path = InstanceLockGuard::generate_lock_path(&config);
        let stale_info = LockInfo {
            pid: 999_999_999,
            hostname: "test-host".to_string(),
            started_at: SystemTime::now(),
            command: "test".to_string(),
            config_path: config.clone(),
        };
        fs::write(&lock_path, serde_json::to_string(&stale_info).unwrap()).unwrap();

        assert!(InstanceLockGuard::try_lock(&config).is_ok());
    }
}

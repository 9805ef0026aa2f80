//! Singleton-consumer lock for the event queue.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use courier_persistence::atomic::ensure_dir;
use tracing::{debug, info, warn};

use crate::error::{QueueError, Result};
use crate::queue::EventQueue;

const LOCK_FILE: &str = "consumer.lock";

/// Exclusive claim on the consumer side of a queue.
///
/// The lock is a `consumer.lock` file holding the owner's pid, created with
/// `O_EXCL`. A lock left behind by a dead process is taken over. The file is
/// removed when the lock is dropped.
#[derive(Debug)]
pub struct ConsumerLock {
    path: PathBuf,
    pid: u32,
}

impl ConsumerLock {
    /// Acquires the consumer lock for `queue`.
    pub fn acquire(queue: &EventQueue) -> Result<Self> {
        Self::acquire_in(&queue.queue_dir())
    }

    /// Acquires a consumer lock file inside `dir`.
    pub fn acquire_in(dir: &Path) -> Result<Self> {
        ensure_dir(dir)?;
        let path = dir.join(LOCK_FILE);
        let pid = std::process::id();

        match Self::try_create(&path, pid) {
            Ok(lock) => Ok(lock),
            Err(QueueError::ConsumerActive { pid: holder }) if !is_process_alive(holder) => {
                warn!(path = %path.display(), stale_pid = holder, "Removing stale consumer lock");
                Self::remove(&path)?;
                Self::try_create(&path, pid)
            }
            Err(e) => Err(e),
        }
    }

    /// Pid recorded in the lock.
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Path of the lock file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn try_create(path: &Path, pid: u32) -> Result<Self> {
        match OpenOptions::new().write(true).create_new(true).open(path) {
            Ok(mut file) => {
                file.write_all(pid.to_string().as_bytes())
                    .and_then(|_| file.sync_all())
                    .map_err(|source| QueueError::Lock {
                        path: path.to_path_buf(),
                        source,
                    })?;
                info!(path = %path.display(), pid, "Acquired consumer lock");
                Ok(Self {
                    path: path.to_path_buf(),
                    pid,
                })
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                // Unparseable content is treated as held by a dead process.
                let holder = read_pid(path).unwrap_or(0);
                Err(QueueError::ConsumerActive { pid: holder })
            }
            Err(source) => Err(QueueError::Lock {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    fn remove(path: &Path) -> Result<()> {
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(source) => Err(QueueError::Lock {
                path: path.to_path_buf(),
                source,
            }),
        }
    }
}

impl Drop for ConsumerLock {
    fn drop(&mut self) {
        // Leave the file alone if someone else took it over.
        if read_pid(&self.path) == Some(self.pid) {
            if let Err(e) = fs::remove_file(&self.path) {
                warn!(path = %self.path.display(), error = %e, "Failed to release consumer lock");
            } else {
                debug!(path = %self.path.display(), "Released consumer lock");
            }
        }
    }
}

fn read_pid(path: &Path) -> Option<u32> {
    fs::read_to_string(path).ok()?.trim().parse().ok()
}

/// Checks whether a process is alive using `kill -0`.
#[cfg(unix)]
fn is_process_alive(pid: u32) -> bool {
    if pid == 0 {
        return false;
    }
    std::process::Command::new("kill")
        .args(["-0", &pid.to_string()])
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_process_alive(pid: u32) -> bool {
    pid != 0
}

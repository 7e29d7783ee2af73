//! Process-scoped file locks.
//!
//! The OS advisory lock (via `fs2`) is held once per process per file. Every
//! in-process open of the same file shares that lock, so opens made by
//! different engine handles in one process never conflict with each other;
//! only other processes are kept out.
//!
//! ```text
//! LOCKS: canonical path -> Held { file, shared, exclusive }
//!   first opener      takes the OS lock (shared or exclusive)
//!   exclusive arrives upgrades a shared OS lock
//!   last guard drops  releases the OS lock
//! ```

use crate::error::{EngineError, EngineResult};
use fs2::FileExt;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::thread;
use std::time::Duration;

static LOCKS: LazyLock<Mutex<HashMap<PathBuf, Held>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

#[derive(Debug)]
struct Held {
    file: File,
    shared: usize,
    exclusive: usize,
}

/// Bounded retry budget for acquiring a lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockPolicy {
    /// Attempts before giving up (at least one is always made).
    pub attempts: u32,
    /// Pause between attempts.
    pub delay: Duration,
}

/// A held lock on a file. Released when dropped.
#[derive(Debug)]
pub struct FileLock {
    key: PathBuf,
    exclusive: bool,
}

impl FileLock {
    /// Acquires a shared or exclusive lock on `path`.
    pub fn acquire(path: &Path, exclusive: bool, policy: LockPolicy) -> EngineResult<Self> {
        let key = lock_key(path);
        let attempts = policy.attempts.max(1);
        let mut table = LOCKS.lock();

        match table.get_mut(&key) {
            Some(held) => {
                if exclusive && held.exclusive == 0 {
                    retry(&key, attempts, policy.delay, || {
                        FileExt::try_lock_exclusive(&held.file)
                    })?;
                }
                if exclusive {
                    held.exclusive += 1;
                } else {
                    held.shared += 1;
                }
            }
            None => {
                let file = OpenOptions::new()
                    .read(true)
                    .open(&key)
                    .map_err(|e| EngineError::Open {
                        path: key.clone(),
                        reason: e.to_string(),
                    })?;
                retry(&key, attempts, policy.delay, || {
                    if exclusive {
                        FileExt::try_lock_exclusive(&file)
                    } else {
                        FileExt::try_lock_shared(&file)
                    }
                })?;
                table.insert(
                    key.clone(),
                    Held {
                        file,
                        shared: usize::from(!exclusive),
                        exclusive: usize::from(exclusive),
                    },
                );
            }
        }
        tracing::trace!(path = %key.display(), exclusive, "file lock acquired");
        Ok(Self { key, exclusive })
    }

    /// Returns whether this guard holds an exclusive lock.
    #[must_use]
    pub fn is_exclusive(&self) -> bool {
        self.exclusive
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        let mut table = LOCKS.lock();
        let Some(held) = table.get_mut(&self.key) else {
            return;
        };
        if self.exclusive {
            held.exclusive = held.exclusive.saturating_sub(1);
        } else {
            held.shared = held.shared.saturating_sub(1);
        }
        if held.exclusive == 0 && held.shared == 0 {
            if let Some(held) = table.remove(&self.key) {
                let _ = FileExt::unlock(&held.file);
            }
        } else if held.exclusive == 0 && self.exclusive {
            // Downgrade; flock converts in place.
            if let Err(e) = FileExt::try_lock_shared(&held.file) {
                tracing::warn!(path = %self.key.display(), error = %e, "lock downgrade failed");
            }
        }
    }
}

/// Canonical form of a path, used to key the lock table.
#[must_use]
pub fn lock_key(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}

fn retry(
    path: &Path,
    attempts: u32,
    delay: Duration,
    mut attempt: impl FnMut() -> std::io::Result<()>,
) -> EngineResult<()> {
    for n in 1..=attempts {
        if attempt().is_ok() {
            return Ok(());
        }
        if n < attempts {
            thread::sleep(delay);
        }
    }
    Err(EngineError::Locked {
        path: path.to_path_buf(),
        attempts,
    })
}

//! Cross-process locks on a shared lock directory.
//!
//! Each lock name maps to one file under the lock directory, held with an
//! exclusive `flock(2)`. The kernel drops the lock if the holder dies, so a
//! crashed writer never wedges a role. Every process that saves roles must
//! point at the same lock directory.

use super::{LockHandle, LockService};
use crate::{Error, Result};
use nix::errno::Errno;
use nix::fcntl::{Flock, FlockArg};
use sha2::{Digest, Sha256};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

/// How often a blocked acquire retries the lock.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// [`LockService`] using advisory file locks.
#[derive(Debug, Clone)]
pub struct FileLockService {
    dir: PathBuf,
    timeout: Duration,
}

impl FileLockService {
    pub fn new(dir: &Path, timeout: Duration) -> Self {
        Self {
            dir: dir.to_path_buf(),
            timeout,
        }
    }

    /// Directory holding the lock files.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the lock file for `name`.
    ///
    /// Names are sanitized for the filesystem and suffixed with a short hash
    /// of the original so that distinct names never share a file.
    pub fn lock_path(&self, name: &str) -> PathBuf {
        let sanitized: String = name
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                    c
                } else {
                    '_'
                }
            })
            .collect();

        let mut hasher = Sha256::new();
        hasher.update(name.as_bytes());
        let hash_hex = format!("{:x}", hasher.finalize());

        self.dir
            .join(format!("{}-{}.lock", sanitized.trim_start_matches('.'), &hash_hex[..12]))
    }
}

impl LockService for FileLockService {
    fn acquire(&self, name: &str) -> Result<LockHandle> {
        fs::create_dir_all(&self.dir)?;
        let path = self.lock_path(name);
        let mut file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&path)?;

        let start = Instant::now();
        loop {
            match Flock::lock(file, FlockArg::LockExclusiveNonblock) {
                Ok(mut lock) => {
                    // Holder info is diagnostic only; the flock is what counts.
                    if let Err(e) = write_holder(&mut lock) {
                        tracing::debug!("Could not record holder in {}: {}", path.display(), e);
                    }
                    tracing::trace!("Acquired lock {} after {:?}", name, start.elapsed());
                    return Ok(LockHandle::new(name, Some(Box::new(lock))));
                }
                Err((returned, errno)) if errno == Errno::EWOULDBLOCK => {
                    let waited = start.elapsed();
                    if waited >= self.timeout {
                        return Err(Error::LockTimeout {
                            name: name.to_string(),
                            waited,
                        });
                    }
                    file = returned;
                    thread::sleep(POLL_INTERVAL.min(self.timeout - waited));
                }
                Err((_, errno)) => return Err(Error::Io(io::Error::from(errno))),
            }
        }
    }

    fn release(&self, mut handle: LockHandle) -> Result<()> {
        let state = handle
            .take_state()
            .ok_or_else(|| Error::InvalidInput(format!("lock {} has no file", handle.name())))?;
        let lock = state.downcast::<Flock<File>>().map_err(|_| {
            Error::InvalidInput(format!("lock {} was not issued by a file lock service", handle.name()))
        })?;
        lock.unlock()
            .map(drop)
            .map_err(|(_, errno)| Error::Io(io::Error::from(errno)))
    }
}

fn write_holder(file: &mut File) -> io::Result<()> {
    file.set_len(0)?;
    writeln!(
        file,
        "pid={} acquired_at={}",
        std::process::id(),
        chrono::Utc::now().to_rfc3339()
    )?;
    file.sync_data()
}

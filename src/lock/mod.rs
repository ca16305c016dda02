//! Named lock service.
//!
//! Role saves must be serialized per role name across every process that
//! writes to the backend, so the lock is a named, cluster-wide primitive
//! rather than a local mutex:
//! - `FileLockService` - `flock(2)` on a shared lock directory (unix)
//! - `MemoryLockService` - in-process lock table
//!
//! Both bound the wait with a timeout; a lock that cannot be taken in time
//! yields [`crate::Error::LockTimeout`] instead of blocking forever.

#[cfg(unix)]
pub mod file;
pub mod memory;

#[cfg(unix)]
pub use file::FileLockService;
pub use memory::MemoryLockService;

use crate::Result;
use std::any::Any;
use std::fmt;

/// Proof of holding a named lock. Hand it back to [`LockService::release`].
pub struct LockHandle {
    name: String,
    held: Option<Box<dyn Any + Send>>,
}

impl LockHandle {
    /// Create a handle, optionally carrying service-specific state.
    pub fn new(name: impl Into<String>, held: Option<Box<dyn Any + Send>>) -> Self {
        Self {
            name: name.into(),
            held,
        }
    }

    /// Name of the lock this handle holds.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Take the service-specific state out of the handle.
    pub fn take_state(&mut self) -> Option<Box<dyn Any + Send>> {
        self.held.take()
    }
}

impl fmt::Debug for LockHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockHandle")
            .field("name", &self.name)
            .field("stateful", &self.held.is_some())
            .finish()
    }
}

/// Trait for cluster-wide mutual exclusion keyed by name.
pub trait LockService: Send + Sync {
    /// Block until the named lock is held, or fail after the service timeout.
    fn acquire(&self, name: &str) -> Result<LockHandle>;

    /// Release a lock previously returned by [`LockService::acquire`].
    fn release(&self, handle: LockHandle) -> Result<()>;
}

/// Scoped lock acquisition. The lock is released when the guard drops,
/// on every exit path.
pub struct LockGuard<'a> {
    service: &'a dyn LockService,
    handle: Option<LockHandle>,
}

impl<'a> LockGuard<'a> {
    /// Acquire `name` on `service`.
    pub fn acquire(service: &'a dyn LockService, name: &str) -> Result<Self> {
        let handle = service.acquire(name)?;
        Ok(Self {
            service,
            handle: Some(handle),
        })
    }

    /// Name of the held lock.
    pub fn name(&self) -> &str {
        self.handle.as_ref().map(LockHandle::name).unwrap_or_default()
    }

    /// Release now, reporting any failure to the caller.
    pub fn release(mut self) -> Result<()> {
        match self.handle.take() {
            Some(handle) => self.service.release(handle),
            None => Ok(()),
        }
    }
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            let name = handle.name().to_string();
            if let Err(e) = self.service.release(handle) {
                tracing::warn!("Failed to release lock {}: {}", name, e);
            }
        }
    }
}

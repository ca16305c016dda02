//! In-process lock table.

use super::{LockHandle, LockService};
use crate::{Error, Result};
use std::collections::HashMap;
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Held names mapped to the token of the acquisition holding them.
#[derive(Debug, Default)]
struct LockTable {
    held: HashMap<String, u64>,
    next_token: u64,
}

/// [`LockService`] backed by a mutex-protected table of held names.
///
/// Only serializes callers inside one process. Each acquisition carries a
/// token in its handle; release only succeeds with the holder's token.
#[derive(Debug)]
pub struct MemoryLockService {
    table: Mutex<LockTable>,
    released: Condvar,
    timeout: Duration,
}

impl MemoryLockService {
    pub fn new(timeout: Duration) -> Self {
        Self {
            table: Mutex::new(LockTable::default()),
            released: Condvar::new(),
            timeout,
        }
    }

    /// Whether `name` is currently held.
    pub fn is_held(&self, name: &str) -> bool {
        self.table()
            .map(|table| table.held.contains_key(name))
            .unwrap_or(false)
    }

    fn table(&self) -> Result<MutexGuard<'_, LockTable>> {
        self.table
            .lock()
            .map_err(|_| Error::Other("lock table poisoned".to_string()))
    }
}

impl LockService for MemoryLockService {
    fn acquire(&self, name: &str) -> Result<LockHandle> {
        let start = Instant::now();
        let mut table = self.table()?;
        while table.held.contains_key(name) {
            let waited = start.elapsed();
            let Some(remaining) = self.timeout.checked_sub(waited).filter(|d| !d.is_zero()) else {
                return Err(Error::LockTimeout {
                    name: name.to_string(),
                    waited,
                });
            };
            table = self
                .released
                .wait_timeout(table, remaining)
                .map_err(|_| Error::Other("lock table poisoned".to_string()))?
                .0;
        }
        let token = table.next_token;
        table.next_token = table.next_token.wrapping_add(1);
        table.held.insert(name.to_string(), token);
        Ok(LockHandle::new(name, Some(Box::new(token))))
    }

    fn release(&self, mut handle: LockHandle) -> Result<()> {
        let token = handle
            .take_state()
            .and_then(|state| state.downcast::<u64>().ok())
            .map(|token| *token);
        let mut table = self.table()?;
        if token.is_none() || table.held.get(handle.name()) != token.as_ref() {
            return Err(Error::InvalidInput(format!(
                "lock {} is not held by this handle",
                handle.name()
            )));
        }
        table.held.remove(handle.name());
        drop(table);
        self.released.notify_all();
        Ok(())
    }
}

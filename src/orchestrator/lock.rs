//! The process-wide mutex serializing promote/demote/registry mutations.
//!
//! Modeled as a `tokio::sync::Mutex<Option<LockHolder>>` rather than a plain
//! `Mutex<()>` so a future diagnostic endpoint can report who holds it and
//! since when. Exclusion itself comes from the mutex being held for the
//! guard's lifetime; the `Option<LockHolder>` is bookkeeping, not the lock.
//!
//! `LockGuard` owns its share of the mutex (via `OwnedMutexGuard`) rather
//! than borrowing from `&OperationLock`, so a guard acquired by `promote`/
//! `demote_all` can be moved into a detached `tokio::spawn`ed task and keep
//! the lock held for that task's true lifetime, not just until the HTTP
//! caller's deadline fires.

use crate::error::OrchestratorError;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Debug, Clone)]
pub struct LockHolder {
    pub operation: &'static str,
    pub id: u64,
    pub started_at: Instant,
    pub deadline: Instant,
}

pub struct OperationLock {
    inner: Arc<Mutex<Option<LockHolder>>>,
    next_id: AtomicU64,
}

impl OperationLock {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(None)),
            next_id: AtomicU64::new(1),
        }
    }

    /// Fails fast with `BUSY` on contention; never blocks the caller.
    pub fn try_acquire(
        &self,
        operation: &'static str,
        timeout: Duration,
    ) -> Result<LockGuard, OrchestratorError> {
        match self.inner.clone().try_lock_owned() {
            Ok(mut guard) => {
                let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                let now = Instant::now();
                *guard = Some(LockHolder {
                    operation,
                    id,
                    started_at: now,
                    deadline: now + timeout,
                });
                Ok(LockGuard { guard })
            }
            Err(_) => Err(OrchestratorError::Busy(operation.to_string())),
        }
    }
}

impl Default for OperationLock {
    fn default() -> Self {
        Self::new()
    }
}

/// Held for the lifetime of a mutating operation, including the detached
/// task that keeps running past its client-facing deadline. Clears the
/// holder record on every return path — success, error, or deadline — via
/// `Drop`.
pub struct LockGuard {
    guard: OwnedMutexGuard<Option<LockHolder>>,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        *self.guard = None;
    }
}

//! Single-value cache with a fixed time-to-live.
//!
//! Expiry is checked lazily on read; there is no background eviction.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::time::Instant;

struct Slot<T> {
    value: T,
    deadline: Instant,
}

/// Holds at most one value, readable until `timeout` after the last write.
pub struct ExpiringCache<T> {
    timeout: Duration,
    slot: Mutex<Option<Slot<T>>>,
}

impl<T: Clone> ExpiringCache<T> {
    /// Create an empty cache.
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            slot: Mutex::new(None),
        }
    }

    /// Replace the cached value and restart the timeout.
    pub fn set(&self, value: T) {
        let deadline = Instant::now() + self.timeout;
        *self.lock() = Some(Slot { value, deadline });
    }

    /// The cached value, if one was written and has not expired.
    pub fn get(&self) -> Option<T> {
        let slot = self.lock();
        match slot.as_ref() {
            Some(slot) if Instant::now() <= slot.deadline => Some(slot.value.clone()),
            _ => None,
        }
    }

    // Writers never panic while holding the lock, so a poisoned slot is still consistent
    fn lock(&self) -> MutexGuard<'_, Option<Slot<T>>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T> std::fmt::Debug for ExpiringCache<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExpiringCache")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

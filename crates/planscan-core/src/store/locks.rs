//! Per-property mutual exclusion within one process.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type LockMap = HashMap<String, Arc<AsyncMutex<()>>>;

/// Keyed async locks, one per property id. Entries are dropped once no
/// lease holds or waits on them.
#[derive(Debug, Clone, Default)]
pub struct PropertyLocks {
    inner: Arc<Mutex<LockMap>>,
}

/// Waiting for a property lock took longer than allowed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("property {property_id} is busy (waited {waited:?})")]
pub struct LeaseTimeout {
    pub property_id: String,
    pub waited: Duration,
}

/// Exclusive access to one property until dropped.
#[derive(Debug)]
pub struct PropertyLease {
    property_id: String,
    guard: Option<OwnedMutexGuard<()>>,
    locks: PropertyLocks,
}

impl PropertyLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait up to `wait` for exclusive access to `property_id`.
    pub async fn acquire(&self, property_id: &str, wait: Duration) -> Result<PropertyLease, LeaseTimeout> {
        let lock = {
            let mut map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            map.entry(property_id.to_string()).or_default().clone()
        };
        // Cleans up after a waiter that times out or is cancelled.
        let _pending = PendingAcquire {
            locks: self,
            property_id,
        };

        let acquired = tokio::time::timeout(wait, lock.lock_owned()).await;
        let Ok(guard) = acquired else {
            return Err(LeaseTimeout {
                property_id: property_id.to_string(),
                waited: wait,
            });
        };

        Ok(PropertyLease {
            property_id: property_id.to_string(),
            guard: Some(guard),
            locks: self.clone(),
        })
    }

    /// Number of properties with a live lock entry.
    pub fn tracked(&self) -> usize {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn release_if_idle(&self, property_id: &str) {
        let mut map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        // Only the map's own reference left: nobody holds or awaits it.
        if map
            .get(property_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            map.remove(property_id);
        }
    }
}

struct PendingAcquire<'a> {
    locks: &'a PropertyLocks,
    property_id: &'a str,
}

impl Drop for PendingAcquire<'_> {
    fn drop(&mut self) {
        self.locks.release_if_idle(self.property_id);
    }
}

impl PropertyLease {
    pub fn property_id(&self) -> &str {
        &self.property_id
    }
}

impl Drop for PropertyLease {
    fn drop(&mut self) {
        drop(self.guard.take());
        self.locks.release_if_idle(&self.property_id);
    }
}

//! Keyed lock map (C1): mutual exclusion and result memoization keyed by an
//! opaque string.
//!
//! Generalizes the thundering-herd protection the teacher hand-rolls once
//! (an in-flight `HashSet` plus a `broadcast` channel in its firmware
//! manager) into a reusable, arbitrary-key, arbitrary-payload primitive.
//! Every entry is refcounted; the last holder to release deletes it, so the
//! map never grows without bound.

use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex as AsyncMutex;

struct Entry<V> {
    mutex: AsyncMutex<Option<V>>,
    refcount: AtomicUsize,
}

/// A map from opaque string keys to a per-key mutex and an optional computed
/// value. At most one holder per key system-wide; a second caller for the
/// same key blocks until the first releases.
pub struct LockMap<V> {
    entries: DashMap<String, Arc<Entry<V>>>,
}

impl<V> Default for LockMap<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> LockMap<V> {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Acquires exclusive access to the value slot under `key`. The
    /// returned guard releases on `Drop`, including on panic, so the
    /// contract cannot be violated by an early return or an abnormal
    /// termination mid-critical-section.
    pub async fn lock(&self, key: &str) -> LockGuard<'_, V> {
        // Bump the refcount while still holding the shard's `RefMut` so a
        // concurrent `remove_if` on the same key (which itself needs that
        // shard lock) cannot observe a stale zero refcount and evict the
        // entry between our lookup and our increment.
        let entry = {
            let mut ref_mut = self.entries.entry(key.to_string()).or_insert_with(|| {
                Arc::new(Entry {
                    mutex: AsyncMutex::new(None),
                    refcount: AtomicUsize::new(0),
                })
            });
            ref_mut.refcount.fetch_add(1, Ordering::SeqCst);
            Arc::clone(&ref_mut)
        };

        let owned = Arc::clone(&entry);
        let permit = owned.mutex.lock_owned().await;

        LockGuard {
            map: self,
            key: key.to_string(),
            entry,
            user_data: Some(permit),
        }
    }
}

pub struct LockGuard<'a, V> {
    map: &'a LockMap<V>,
    key: String,
    entry: Arc<Entry<V>>,
    user_data: Option<tokio::sync::OwnedMutexGuard<Option<V>>>,
}

impl<'a, V> LockGuard<'a, V> {
    /// The value deposited by whichever holder computed it first, if any.
    pub fn user_data(&self) -> Option<&V> {
        self.user_data.as_ref().and_then(|g| g.as_ref())
    }

    /// Deposits the first-computed result for subsequent holders to observe.
    pub fn set_user_data(&mut self, value: V) {
        if let Some(guard) = self.user_data.as_mut() {
            **guard = Some(value);
        }
    }
}

impl<'a, V> Drop for LockGuard<'a, V> {
    fn drop(&mut self) {
        // Drop the mutex guard first so the next waiter can acquire it
        // immediately; only then touch the refcount/eviction bookkeeping.
        self.user_data.take();
        if self.entry.refcount.fetch_sub(1, Ordering::SeqCst) == 1 {
            // We were the last holder. Remove the entry only if nobody
            // raced in after our decrement (remove_if re-checks the count).
            self.map
                .entries
                .remove_if(&self.key, |_, v| v.refcount.load(Ordering::SeqCst) == 0);
        }
    }
}

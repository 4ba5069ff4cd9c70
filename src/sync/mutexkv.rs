//! Named mutexes keyed by string.
//!
//! # Responsibilities
//! - Hand out one exclusive lock per key, created lazily on first use
//! - Keep every key's lock alive for the lifetime of the store
//! - Release the key when the returned guard is dropped
//!
//! The map itself is a `DashMap`; its shard lock is held only while the
//! per-key lock is looked up or inserted, never while a caller holds a key.

use std::sync::{Arc, Condvar, Mutex, PoisonError};

use dashmap::DashMap;

/// A single key's lock.
///
/// A plain `Mutex<()>` guard borrows its mutex, so an owned guard handed out by
/// the store would be self-referential. The flag + condvar pair gives the same
/// exclusion with a guard that only holds an `Arc`.
#[derive(Debug, Default)]
struct KeyLock {
    locked: Mutex<bool>,
    released: Condvar,
}

impl KeyLock {
    fn acquire(&self) {
        let mut locked = self.locked.lock().unwrap_or_else(PoisonError::into_inner);
        while *locked {
            locked = self
                .released
                .wait(locked)
                .unwrap_or_else(PoisonError::into_inner);
        }
        *locked = true;
    }

    fn try_acquire(&self) -> bool {
        let mut locked = self.locked.lock().unwrap_or_else(PoisonError::into_inner);
        if *locked {
            return false;
        }
        *locked = true;
        true
    }

    fn release(&self) {
        let mut locked = self.locked.lock().unwrap_or_else(PoisonError::into_inner);
        *locked = false;
        drop(locked);
        self.released.notify_one();
    }
}

/// Registry of named mutexes.
///
/// Shared by handing out `Arc<MutexKV>`; components that must coordinate on the
/// same logical resource receive the same store and lock the same key.
#[derive(Debug, Default)]
pub struct MutexKV {
    store: DashMap<String, Arc<KeyLock>>,
}

impl MutexKV {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock `key`, blocking the calling thread until it is available.
    ///
    /// The key stays locked until the returned guard is dropped.
    pub fn lock(&self, key: &str) -> MutexKVGuard {
        let entry = self.get(key);
        tracing::trace!(key, "Locking");
        entry.acquire();
        tracing::trace!(key, "Locked");
        MutexKVGuard {
            key: key.to_string(),
            entry,
        }
    }

    /// Lock `key` only if no one else holds it.
    pub fn try_lock(&self, key: &str) -> Option<MutexKVGuard> {
        let entry = self.get(key);
        entry.try_acquire().then(|| MutexKVGuard {
            key: key.to_string(),
            entry,
        })
    }

    /// Number of keys that have ever been locked.
    pub fn len(&self) -> usize {
        self.store.len()
    }

    /// True when no key has been locked yet.
    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// Return the lock for `key`, creating it if this is the first use.
    fn get(&self, key: &str) -> Arc<KeyLock> {
        if let Some(existing) = self.store.get(key) {
            return Arc::clone(existing.value());
        }
        Arc::clone(self.store.entry(key.to_string()).or_default().value())
    }
}

/// Holds a key of a [`MutexKV`] locked until dropped.
#[derive(Debug)]
pub struct MutexKVGuard {
    key: String,
    entry: Arc<KeyLock>,
}

impl MutexKVGuard {
    /// The key this guard holds.
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Drop for MutexKVGuard {
    fn drop(&mut self) {
        self.entry.release();
        tracing::trace!(key = %self.key, "Unlocked");
    }
}

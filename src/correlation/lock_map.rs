//! # Per-Key Lock Map
//!
//! Lazily-created async mutexes keyed by string. Used to serialize the
//! check-then-act exchange in the correlation store per correlation key while
//! leaving unrelated keys fully concurrent.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Default)]
pub struct LockMap {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl LockMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock handle for `key`, created on first use. Callers holding the
    /// returned `Arc` remain safe to lock even after [`LockMap::remove`]; they
    /// simply contend on a lock no longer reachable through the map.
    pub fn lock_for(&self, key: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .value()
            .clone()
    }

    /// Drop the map's reference to `key`'s lock.
    pub fn remove(&self, key: &str) {
        self.locks.remove(key);
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

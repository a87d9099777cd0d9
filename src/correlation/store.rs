//! # Correlation Store
//!
//! Exchange point for two events that arrive in either order and meet on a
//! shared key. The first arrival stores its half and gets `None`; the second
//! removes the counterpart and gets both halves back as a pair. All
//! check-then-act sequences for one key run under that key's lock, so exactly
//! one of two racing arrivals observes the match.
//!
//! A matched pair leaves no entry behind, but the per-key lock is kept until
//! the caller finishes its downstream work and calls [`CorrelationStore::remove`].
//! A caller whose downstream work fails can put the counterpart back with the
//! opposite exchange call, which makes the whole join safe to retry.

use dashmap::DashMap;
use std::time::Instant;
use tracing::{debug, warn};

use super::lock_map::LockMap;

enum Half<L, R> {
    Left(L),
    Right(R),
}

struct Entry<L, R> {
    half: Half<L, R>,
    stored_at: Instant,
}

pub struct CorrelationStore<L, R> {
    entries: DashMap<String, Entry<L, R>>,
    locks: LockMap,
}

impl<L, R> Default for CorrelationStore<L, R>
where
    L: Send + Sync + 'static,
    R: Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<L, R> CorrelationStore<L, R>
where
    L: Send + Sync + 'static,
    R: Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            locks: LockMap::new(),
        }
    }

    /// Offer the left half for `key`.
    ///
    /// Returns `Some((left, right))` when the right half was already waiting;
    /// the entry is removed and the caller owns both halves. Returns `None`
    /// when this half was stored to wait for its counterpart. A duplicate
    /// left half replaces the stored one.
    pub async fn exchange_left(&self, key: &str, left: L) -> Option<(L, R)> {
        let lock = self.locks.lock_for(key);
        let _guard = lock.lock().await;

        match self.entries.remove(key) {
            Some((_, entry)) => match entry.half {
                Half::Right(right) => {
                    debug!(key, "correlation matched");
                    Some((left, right))
                }
                Half::Left(_) => {
                    warn!(key, "duplicate left half, replacing stored value");
                    self.store(key, Half::Left(left));
                    None
                }
            },
            None => {
                debug!(key, "left half stored, awaiting counterpart");
                self.store(key, Half::Left(left));
                None
            }
        }
    }

    /// Offer the right half for `key`. Mirror of [`CorrelationStore::exchange_left`].
    pub async fn exchange_right(&self, key: &str, right: R) -> Option<(L, R)> {
        let lock = self.locks.lock_for(key);
        let _guard = lock.lock().await;

        match self.entries.remove(key) {
            Some((_, entry)) => match entry.half {
                Half::Left(left) => {
                    debug!(key, "correlation matched");
                    Some((left, right))
                }
                Half::Right(_) => {
                    warn!(key, "duplicate right half, replacing stored value");
                    self.store(key, Half::Right(right));
                    None
                }
            },
            None => {
                debug!(key, "right half stored, awaiting counterpart");
                self.store(key, Half::Right(right));
                None
            }
        }
    }

    /// Withdraw a stored left half without disturbing a stored right half.
    ///
    /// Used by callers abandoning their side of a pending join: the caller
    /// gets its own half back, while a counterpart that arrived in the
    /// meantime stays in the store for a later exchange.
    pub async fn take_left(&self, key: &str) -> Option<L> {
        let lock = self.locks.lock_for(key);
        let _guard = lock.lock().await;
        match self.entries.remove(key) {
            Some((_, entry)) => match entry.half {
                Half::Left(left) => {
                    self.locks.remove(key);
                    Some(left)
                }
                Half::Right(right) => {
                    self.store(key, Half::Right(right));
                    None
                }
            },
            None => None,
        }
    }

    /// Release `key` once the join's downstream work is complete: drops any
    /// stored half and the per-key lock.
    pub async fn remove(&self, key: &str) {
        let lock = self.locks.lock_for(key);
        let _guard = lock.lock().await;
        self.entries.remove(key);
        self.locks.remove(key);
    }

    /// Drop halves that have waited longer than `max_age`. Returns the number
    /// of entries dropped. Counterparts that never arrive would otherwise pin
    /// their entries forever; callers decide if and how often to reap.
    pub fn reap(&self, max_age: std::time::Duration) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| entry.stored_at.elapsed() <= max_age);
        let dropped = before - self.entries.len();
        if dropped > 0 {
            warn!(dropped, "reaped expired correlation entries");
        }
        dropped
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn store(&self, key: &str, half: Half<L, R>) {
        self.entries.insert(
            key.to_string(),
            Entry {
                half,
                stored_at: Instant::now(),
            },
        );
    }
}

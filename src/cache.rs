//! In-memory prediction memo: bounded LRU with one computation in flight per key.
//!
//! A second caller asking for a key that is still being computed blocks on the first caller's
//! `OnceCell` instead of starting its own simulation. Failed computations are not cached.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use once_cell::sync::OnceCell;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::error::Result;
use crate::prediction::Prediction;
use crate::state::MatchHistory;

pub const DEFAULT_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub match_id: String,
    pub round_number: u32,
    pub hypothetical_action: String,
    pub history_fingerprint: String,
}

impl CacheKey {
    pub fn new(history: &MatchHistory, round_number: u32, hypothetical_action: &str) -> Self {
        Self {
            match_id: history.context.match_id.clone(),
            round_number,
            hypothetical_action: hypothetical_action.trim().to_ascii_lowercase(),
            history_fingerprint: history_fingerprint(history),
        }
    }

    /// Folds any other input the prediction depends on into the fingerprint.
    pub fn with_context<T: Serialize>(mut self, extra: &T) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(self.history_fingerprint.as_bytes());
        hasher.update(serde_json::to_vec(extra).unwrap_or_default());
        self.history_fingerprint = hex(&hasher.finalize());
        self
    }
}

/// Hex SHA-256 of the serialized history.
pub fn history_fingerprint(history: &MatchHistory) -> String {
    let bytes = serde_json::to_vec(history).unwrap_or_default();
    hex(&Sha256::digest(&bytes))
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

type Cell = Arc<OnceCell<Arc<Prediction>>>;

struct Slot {
    cell: Cell,
    last_used: u64,
}

#[derive(Default)]
struct Slots {
    entries: HashMap<CacheKey, Slot>,
    tick: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

pub struct PredictionCache {
    capacity: usize,
    slots: Mutex<Slots>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl std::fmt::Debug for PredictionCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PredictionCache")
            .field("capacity", &self.capacity)
            .field("stats", &self.stats())
            .finish()
    }
}

impl Default for PredictionCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl PredictionCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            slots: Mutex::new(Slots::default()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn lock(&self) -> MutexGuard<'_, Slots> {
        // A panic while holding the lock cannot leave the map half-updated.
        self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Returns the cached prediction for `key`, computing it at most once across threads.
    pub fn get_or_compute<F>(&self, key: CacheKey, compute: F) -> Result<Arc<Prediction>>
    where
        F: FnOnce() -> Result<Prediction>,
    {
        let cell = self.checkout(&key);
        let mut computed = false;
        let result = cell.get_or_try_init(|| {
            computed = true;
            compute().map(Arc::new)
        });

        match result {
            Ok(prediction) => {
                if computed {
                    self.misses.fetch_add(1, Ordering::Relaxed);
                } else {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                }
                Ok(Arc::clone(prediction))
            }
            Err(err) => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                self.discard_if_empty(&key, &cell);
                Err(err)
            }
        }
    }

    pub fn get(&self, key: &CacheKey) -> Option<Arc<Prediction>> {
        let mut slots = self.lock();
        slots.tick += 1;
        let tick = slots.tick;
        let slot = slots.entries.get_mut(key)?;
        let value = slot.cell.get().cloned()?;
        slot.last_used = tick;
        Some(value)
    }

    /// Drops every entry for `match_id`. Returns how many were removed.
    pub fn invalidate(&self, match_id: &str) -> usize {
        let mut slots = self.lock();
        let before = slots.entries.len();
        slots.entries.retain(|k, _| k.match_id != match_id);
        let removed = before - slots.entries.len();
        if removed > 0 {
            log::debug!("invalidated {removed} cached predictions for {match_id}");
        }
        removed
    }

    pub fn clear(&self) {
        self.lock().entries.clear();
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.len(),
        }
    }

    fn checkout(&self, key: &CacheKey) -> Cell {
        let mut slots = self.lock();
        slots.tick += 1;
        let tick = slots.tick;
        let cell = {
            let slot = slots.entries.entry(key.clone()).or_insert_with(|| Slot {
                cell: Arc::new(OnceCell::new()),
                last_used: tick,
            });
            slot.last_used = tick;
            Arc::clone(&slot.cell)
        };

        // In-flight slots are never evicted; the map may overshoot until they complete.
        while slots.entries.len() > self.capacity {
            let victim = slots
                .entries
                .iter()
                .filter(|(k, slot)| *k != key && slot.cell.get().is_some())
                .min_by_key(|(_, slot)| slot.last_used)
                .map(|(k, _)| k.clone());
            match victim {
                Some(victim) => {
                    log::debug!(
                        "evicting prediction {} round {} ({})",
                        victim.match_id,
                        victim.round_number,
                        victim.hypothetical_action
                    );
                    slots.entries.remove(&victim);
                }
                None => break,
            }
        }
        cell
    }

    fn discard_if_empty(&self, key: &CacheKey, cell: &Cell) {
        let mut slots = self.lock();
        let stale = slots
            .entries
            .get(key)
            .is_some_and(|slot| Arc::ptr_eq(&slot.cell, cell) && slot.cell.get().is_none());
        if stale {
            slots.entries.remove(key);
        }
    }
}

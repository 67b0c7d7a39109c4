//! Time-bounded assignment cache keyed by a worker-set fingerprint.
//!
//! The entry map lives behind an `ArcSwap`: the scheduling cycle is the only
//! writer and replaces the whole map on every change, so readers always see
//! a complete snapshot (possibly one generation old), never a partial write.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;
use serde::Serialize;
use tracing::debug;
use weave_id::{CategoryKey, Tick, WorkerId};

use super::StrategyKind;
use crate::worker::Worker;

/// Cheap summary of a worker set: its size and its boundary identities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Fingerprint {
    pub count: usize,
    pub first: Option<WorkerId>,
    pub last: Option<WorkerId>,
}

impl Fingerprint {
    /// Fingerprint of a roster; independent of roster order.
    pub fn of(workers: &[Worker]) -> Self {
        let first = workers.iter().map(Worker::id).min();
        let last = workers.iter().map(Worker::id).max();
        Self {
            count: workers.len(),
            first,
            last,
        }
    }
}

/// A computed assignment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheEntry {
    pub fingerprint: Fingerprint,
    pub assignments: BTreeMap<WorkerId, CategoryKey>,
    /// Workers with no capable category.
    pub unassigned: Vec<WorkerId>,
    pub total_score: f64,
    pub strategy: StrategyKind,
    pub computed_at: Tick,
}

impl CacheEntry {
    /// True once more than `ttl` ticks have passed since computation.
    pub fn is_expired(&self, now: Tick, ttl: u64) -> bool {
        now.since(self.computed_at) > ttl
    }
}

/// Cache counters.
#[derive(Debug, Default)]
pub struct CacheStats {
    pub hits: AtomicU64,
    pub misses: AtomicU64,
    pub evictions: AtomicU64,
}

/// Plain-value copy of [`CacheStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStatsSnapshot {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

impl CacheStatsSnapshot {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

impl std::fmt::Display for CacheStatsSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "cache: {} entries, {} hits, {} misses ({:.1}% hit rate), {} evicted",
            self.entries,
            self.hits,
            self.misses,
            self.hit_rate() * 100.0,
            self.evictions
        )
    }
}

type EntryMap = HashMap<Fingerprint, Arc<CacheEntry>>;

/// Fingerprint-keyed cache with lazy expiry.
pub struct AssignmentCache {
    ttl: u64,
    entries: ArcSwap<EntryMap>,
    stats: CacheStats,
}

impl AssignmentCache {
    pub fn new(ttl: u64) -> Self {
        Self {
            ttl,
            entries: ArcSwap::from_pointee(EntryMap::new()),
            stats: CacheStats::default(),
        }
    }

    pub fn ttl(&self) -> u64 {
        self.ttl
    }

    /// Live entry for a fingerprint. An expired entry is evicted and reported as a miss.
    pub fn lookup(&self, fingerprint: &Fingerprint, now: Tick) -> Option<Arc<CacheEntry>> {
        let snapshot = self.entries.load();
        match snapshot.get(fingerprint) {
            Some(entry) if !entry.is_expired(now, self.ttl) => {
                self.stats.hits.fetch_add(1, Ordering::Relaxed);
                Some(Arc::clone(entry))
            }
            Some(entry) => {
                debug!(
                    computed_at = %entry.computed_at,
                    now = %now,
                    "Evicting expired assignment"
                );
                self.entries.rcu(|current| {
                    let mut next = EntryMap::clone(current);
                    next.remove(fingerprint);
                    next
                });
                self.stats.evictions.fetch_add(1, Ordering::Relaxed);
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            None => {
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Insert or replace the entry for its fingerprint.
    pub fn insert(&self, entry: Arc<CacheEntry>) {
        self.entries.rcu(|current| {
            let mut next = EntryMap::clone(current);
            next.insert(entry.fingerprint, Arc::clone(&entry));
            next
        });
    }

    /// Drop every expired entry. Returns how many were removed.
    pub fn purge_expired(&self, now: Tick) -> usize {
        let ttl = self.ttl;
        let before = self.entries.load().len();
        self.entries.rcu(|current| {
            current
                .iter()
                .filter(|(_, entry)| !entry.is_expired(now, ttl))
                .map(|(key, entry)| (*key, Arc::clone(entry)))
                .collect::<EntryMap>()
        });
        let removed = before.saturating_sub(self.entries.load().len());
        self.stats
            .evictions
            .fetch_add(removed as u64, Ordering::Relaxed);
        removed
    }

    pub fn clear(&self) {
        self.entries.store(Arc::new(EntryMap::new()));
    }

    pub fn len(&self) -> usize {
        self.entries.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStatsSnapshot {
        CacheStatsSnapshot {
            entries: self.len(),
            hits: self.stats.hits.load(Ordering::Relaxed),
            misses: self.stats.misses.load(Ordering::Relaxed),
            evictions: self.stats.evictions.load(Ordering::Relaxed),
        }
    }
}

impl std::fmt::Debug for AssignmentCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssignmentCache")
            .field("ttl", &self.ttl)
            .field("stats", &self.stats())
            .finish()
    }
}

// ABOUTME: Keyed cache stores for scores, results and tallies with a fixed TTL
// ABOUTME: Entries are timestamped (proxy-pull, expire) or untimestamped (master-push, invalidated)

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use thiserror::Error;

use crate::types::{Athlete, EventKey, NationKey, Results, Tally};

/// Scores churn fastest, so they get the shortest TTL.
pub const SCORE_TTL: Duration = Duration::from_secs(10);
pub const RESULT_TTL: Duration = Duration::from_secs(100);
pub const TALLY_TTL: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CacheError {
    #[error("not in cache")]
    NotCached,
    #[error("cache entry is stale")]
    Stale,
}

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    inserted_at: Option<Instant>,
}

/// A single mutex-guarded cache keyed by event or nation.
#[derive(Debug)]
pub struct CacheStore<K, V> {
    entries: Mutex<HashMap<K, CacheEntry<V>>>,
    ttl: Duration,
}

impl<K, V> CacheStore<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Untimestamped lookup (master-push).
    pub fn lookup(&self, key: &K) -> Result<V, CacheError> {
        let entries = self.lock();
        entries
            .get(key)
            .map(|entry| entry.value.clone())
            .ok_or(CacheError::NotCached)
    }

    /// TTL-checked lookup (proxy-pull). Fresh while `now <= inserted_at + ttl`.
    ///
    /// An entry cached without a timestamp has no freshness to vouch for and
    /// reads as stale here.
    pub fn lookup_at(&self, key: &K, now: Instant) -> Result<V, CacheError> {
        let entries = self.lock();
        let entry = entries.get(key).ok_or(CacheError::NotCached)?;
        match entry.inserted_at {
            Some(inserted_at) if now <= inserted_at + self.ttl => Ok(entry.value.clone()),
            _ => Err(CacheError::Stale),
        }
    }

    pub fn put(&self, key: K, value: V) {
        self.lock().insert(
            key,
            CacheEntry {
                value,
                inserted_at: None,
            },
        );
    }

    pub fn put_at(&self, key: K, value: V, now: Instant) {
        self.lock().insert(
            key,
            CacheEntry {
                value,
                inserted_at: Some(now),
            },
        );
    }

    /// Drops the value and its timestamp. No-op when absent.
    pub fn invalidate(&self, key: &K) {
        self.lock().remove(key);
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<K, CacheEntry<V>>> {
        // A poisoned cache only means a reader panicked mid-clone; the map is intact.
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

pub type ScoreCache = CacheStore<EventKey, Vec<Athlete>>;
pub type ResultCache = CacheStore<EventKey, Results>;
pub type TallyCache = CacheStore<NationKey, Tally>;

/// The three stores a replica owns. Each is locked independently.
#[derive(Debug)]
pub struct CacheSet {
    pub scores: ScoreCache,
    pub results: ResultCache,
    pub tallies: TallyCache,
}

impl CacheSet {
    pub fn new() -> Self {
        Self::with_ttls(SCORE_TTL, RESULT_TTL, TALLY_TTL)
    }

    pub fn with_ttls(scores: Duration, results: Duration, tallies: Duration) -> Self {
        Self {
            scores: CacheStore::new(scores),
            results: CacheStore::new(results),
            tallies: CacheStore::new(tallies),
        }
    }

    /// Wipes all three stores unconditionally.
    pub fn clear(&self) {
        self.scores.clear();
        self.results.clear();
        self.tallies.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty() && self.results.is_empty() && self.tallies.is_empty()
    }
}

impl Default for CacheSet {
    fn default() -> Self {
        Self::new()
    }
}

// ABOUTME: Master-side record of which replicas have pulled which keys into their caches
// ABOUTME: Drives targeted invalidation; wiped whenever mastership changes

use std::collections::{HashMap, HashSet};
use std::hash::Hash;
use std::sync::{Mutex, MutexGuard};

use crate::types::{EventKey, NationKey};

/// `replica_name -> keys that replica cached`, for one cache kind.
#[derive(Debug)]
pub struct InterestTracker<K> {
    by_replica: Mutex<HashMap<String, HashSet<K>>>,
}

impl<K> InterestTracker<K>
where
    K: Eq + Hash + Clone,
{
    pub fn new() -> Self {
        Self {
            by_replica: Mutex::new(HashMap::new()),
        }
    }

    pub fn register(&self, replica: &str, key: K) {
        self.lock()
            .entry(replica.to_string())
            .or_default()
            .insert(key);
    }

    /// Replicas that registered interest in `key`, sorted by name.
    pub fn replicas_for(&self, key: &K) -> Vec<String> {
        let mut replicas: Vec<String> = self
            .lock()
            .iter()
            .filter(|(_, keys)| keys.contains(key))
            .map(|(replica, _)| replica.clone())
            .collect();
        replicas.sort();
        replicas
    }

    pub fn keys_of(&self, replica: &str) -> HashSet<K> {
        self.lock().get(replica).cloned().unwrap_or_default()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, HashSet<K>>> {
        self.by_replica
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl<K> Default for InterestTracker<K>
where
    K: Eq + Hash + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

/// One tracker per cache kind.
#[derive(Debug, Default)]
pub struct InterestMaps {
    pub scores: InterestTracker<EventKey>,
    pub results: InterestTracker<EventKey>,
    pub tallies: InterestTracker<NationKey>,
}

impl InterestMaps {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&self) {
        self.scores.clear();
        self.results.clear();
        self.tallies.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty() && self.results.is_empty() && self.tallies.is_empty()
    }
}

// ABOUTME: Per-event subscriber sets plus the subscriber-to-host directory
// ABOUTME: Subscriptions are one-shot: removed atomically when results are pushed

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use crate::types::{EventKey, Results};

/// A subscriber resolved to its last known host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscriber {
    pub client_id: String,
    pub host: Option<String>,
}

/// What `subscribe` did with the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscribeOutcome {
    /// Stored; the client will receive future pushes.
    Subscribed,
    /// The event already finished; deliver these results now. Nothing stored.
    AlreadyComplete(Results),
}

#[derive(Debug, Default)]
struct Subscriptions {
    by_event: HashMap<EventKey, HashSet<String>>,
    completed: HashMap<EventKey, Results>,
}

/// Subscriber bookkeeping for push fan-out.
///
/// Subscriptions and completed events share one lock so a late `subscribe`
/// either lands before `complete` removes the entry (and is delivered with
/// everyone else) or sees the event as completed.
#[derive(Debug, Default)]
pub struct SubscriptionTable {
    subscriptions: Mutex<Subscriptions>,
    hosts: Mutex<HashMap<String, String>>,
}

impl SubscriptionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, client_id: &str, client_host: &str, event: &EventKey) -> SubscribeOutcome {
        self.lock_hosts()
            .insert(client_id.to_string(), client_host.to_string());

        let mut subs = self.lock_subscriptions();
        if let Some(results) = subs.completed.get(event) {
            return SubscribeOutcome::AlreadyComplete(results.clone());
        }
        subs.by_event
            .entry(event.clone())
            .or_default()
            .insert(client_id.to_string());
        SubscribeOutcome::Subscribed
    }

    /// Current subscribers of an event with their hosts, sorted by client id.
    pub fn subscribers(&self, event: &EventKey) -> Vec<Subscriber> {
        let ids: Vec<String> = match self.lock_subscriptions().by_event.get(event) {
            Some(ids) => ids.iter().cloned().collect(),
            None => return Vec::new(),
        };
        self.resolve(ids)
    }

    /// Marks the event complete and removes its subscription in one step,
    /// returning everyone who was subscribed.
    pub fn complete(&self, event: &EventKey, results: Results) -> Vec<Subscriber> {
        let ids: Vec<String> = {
            let mut subs = self.lock_subscriptions();
            subs.completed.insert(event.clone(), results);
            subs.by_event
                .remove(event)
                .map(|ids| ids.into_iter().collect())
                .unwrap_or_default()
        };
        self.resolve(ids)
    }

    pub fn is_complete(&self, event: &EventKey) -> bool {
        self.lock_subscriptions().completed.contains_key(event)
    }

    pub fn has_subscription(&self, event: &EventKey) -> bool {
        self.lock_subscriptions().by_event.contains_key(event)
    }

    pub fn host_of(&self, client_id: &str) -> Option<String> {
        self.lock_hosts().get(client_id).cloned()
    }

    fn resolve(&self, mut ids: Vec<String>) -> Vec<Subscriber> {
        ids.sort();
        let hosts = self.lock_hosts();
        ids.into_iter()
            .map(|client_id| Subscriber {
                host: hosts.get(&client_id).cloned(),
                client_id,
            })
            .collect()
    }

    fn lock_subscriptions(&self) -> MutexGuard<'_, Subscriptions> {
        self.subscriptions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_hosts(&self) -> MutexGuard<'_, HashMap<String, String>> {
        self.hosts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

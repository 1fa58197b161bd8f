// ABOUTME: Periodic failure detection, eviction and client rebalancing for the registry
// ABOUTME: tick() runs one pass synchronously; spawn() drives it on an interval until cancelled

use medalcast_core::metrics::METRICS;
use rand::seq::SliceRandom;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use crate::registry::ServiceRegistry;

/// What one balancing pass changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BalanceReport {
    /// Instance names whose heartbeat aged past the hold time, sorted.
    pub evicted: Vec<String>,
    /// Clients of evicted replicas moved to a survivor.
    pub reassigned: usize,
    /// Clients placed by the full reshuffle.
    pub rebalanced: usize,
    /// Clients dropped because no replica survived.
    pub dropped: usize,
}

pub struct LoadBalancer {
    registry: Arc<ServiceRegistry>,
    interval: Duration,
    hold_time: Duration,
}

impl LoadBalancer {
    pub fn new(registry: Arc<ServiceRegistry>, interval: Duration, hold_time: Duration) -> Self {
        Self {
            registry,
            interval,
            hold_time,
        }
    }

    /// One balancing pass as of `now`.
    ///
    /// 1. Heartbeats at least `hold_time` old mark their instance stale.
    /// 2. Stale instances leave the instance list.
    /// 3. Each stale replica's clients move to a random survivor.
    /// 4. Every assigned client is reassigned to a random survivor.
    ///
    /// Instances that registered but never beat are left alone.
    pub fn tick(&self, now: Instant) -> BalanceReport {
        let mut rng = rand::thread_rng();
        let mut report = BalanceReport::default();
        let mut state = self.registry.lock();

        let mut stale: Vec<String> = state
            .heartbeats
            .iter()
            .filter(|(_, beat)| now.saturating_duration_since(**beat) >= self.hold_time)
            .map(|(name, _)| name.clone())
            .collect();
        stale.sort();
        if stale.is_empty() && state.affinity.values().all(HashSet::is_empty) {
            return report;
        }

        let stale_set: HashSet<&String> = stale.iter().collect();
        for name in &stale {
            state.heartbeats.remove(name);
        }
        state
            .instances
            .retain(|i| !stale_set.contains(&i.instance_name()));
        if state
            .master
            .as_ref()
            .is_some_and(|master| stale_set.contains(master))
        {
            // Next peer resolve designates a successor and refreshes caches.
            state.master = None;
        }

        let mut orphans: Vec<String> = Vec::new();
        for name in &stale {
            if let Some(clients) = state.affinity.remove(name) {
                orphans.extend(clients);
            }
        }

        let mut survivors: Vec<String> = state.affinity.keys().cloned().collect();
        survivors.sort();

        if survivors.is_empty() {
            report.dropped = orphans.len();
        } else {
            for client in orphans {
                if let Some(target) = survivors.choose(&mut rng) {
                    if let Some(clients) = state.affinity.get_mut(target) {
                        clients.insert(client);
                        report.reassigned += 1;
                    }
                }
            }

            let mut pool: Vec<String> = Vec::new();
            for clients in state.affinity.values_mut() {
                pool.extend(clients.drain());
            }
            pool.sort();
            for client in pool {
                if let Some(target) = survivors.choose(&mut rng) {
                    if let Some(clients) = state.affinity.get_mut(target) {
                        clients.insert(client);
                        report.rebalanced += 1;
                    }
                }
            }
        }
        drop(state);

        for name in &stale {
            tracing::warn!(instance = %name, "Evicted instance after missed heartbeats");
        }
        if report.dropped > 0 {
            tracing::warn!(dropped = report.dropped, "No replicas left; dropped client assignments");
        }
        METRICS.add_evicted(stale.len() as u64);
        METRICS.add_rebalanced((report.reassigned + report.rebalanced) as u64);

        report.evicted = stale;
        report
    }

    /// Runs `tick` every `interval` until `cancel` fires.
    pub fn spawn(self, cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        tracing::debug!("Load balancer shutting down");
                        break;
                    }
                    _ = interval.tick() => {
                        let report = self.tick(Instant::now());
                        if !report.evicted.is_empty() {
                            tracing::info!(
                                evicted = report.evicted.len(),
                                reassigned = report.reassigned,
                                rebalanced = report.rebalanced,
                                "Balancing pass evicted instances"
                            );
                        }
                    }
                }
            }
        })
    }
}

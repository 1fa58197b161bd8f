// ABOUTME: Global metrics counters for the Prometheus endpoint
// ABOUTME: Atomic counters incremented by replica and registry code, rendered as text on /metrics

use once_cell::sync::Lazy;
use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics counters accessible from any crate
pub struct Metrics {
    // === Replica cache metrics ===
    /// Reads answered from the local cache
    pub cache_hits: AtomicU64,
    /// Reads that missed (absent or stale) and went to the backend
    pub cache_misses: AtomicU64,
    /// Backend reads or writes that failed
    pub backend_errors: AtomicU64,
    /// Interest notifications to the master that failed
    pub master_notify_failures: AtomicU64,
    /// Targeted invalidations delivered to peers
    pub invalidations_sent: AtomicU64,
    /// Targeted invalidations that could not be delivered
    pub invalidations_failed: AtomicU64,

    // === Push fan-out metrics ===
    pub score_pushes: AtomicU64,
    pub result_pushes: AtomicU64,
    pub push_failures: AtomicU64,
    /// Average per-subscriber latency of the most recent score batch, in microseconds
    pub push_latency_avg_us: AtomicU64,

    // === Registry metrics ===
    pub heartbeats_received: AtomicU64,
    pub instances_evicted: AtomicU64,
    pub clients_rebalanced: AtomicU64,
    pub master_changes: AtomicU64,
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            cache_hits: AtomicU64::new(0),
            cache_misses: AtomicU64::new(0),
            backend_errors: AtomicU64::new(0),
            master_notify_failures: AtomicU64::new(0),
            invalidations_sent: AtomicU64::new(0),
            invalidations_failed: AtomicU64::new(0),
            score_pushes: AtomicU64::new(0),
            result_pushes: AtomicU64::new(0),
            push_failures: AtomicU64::new(0),
            push_latency_avg_us: AtomicU64::new(0),
            heartbeats_received: AtomicU64::new(0),
            instances_evicted: AtomicU64::new(0),
            clients_rebalanced: AtomicU64::new(0),
            master_changes: AtomicU64::new(0),
        }
    }

    pub fn inc_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_cache_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_backend_error(&self) {
        self.backend_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_master_notify_failure(&self) {
        self.master_notify_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_invalidations(&self, sent: u64, failed: u64) {
        self.invalidations_sent.fetch_add(sent, Ordering::Relaxed);
        self.invalidations_failed.fetch_add(failed, Ordering::Relaxed);
    }

    pub fn add_score_pushes(&self, delivered: u64, failed: u64) {
        self.score_pushes.fetch_add(delivered, Ordering::Relaxed);
        self.push_failures.fetch_add(failed, Ordering::Relaxed);
    }

    pub fn add_result_pushes(&self, delivered: u64, failed: u64) {
        self.result_pushes.fetch_add(delivered, Ordering::Relaxed);
        self.push_failures.fetch_add(failed, Ordering::Relaxed);
    }

    pub fn set_push_latency_avg_us(&self, micros: u64) {
        self.push_latency_avg_us.store(micros, Ordering::Relaxed);
    }

    pub fn inc_heartbeat(&self) {
        self.heartbeats_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_evicted(&self, count: u64) {
        self.instances_evicted.fetch_add(count, Ordering::Relaxed);
    }

    pub fn add_rebalanced(&self, count: u64) {
        self.clients_rebalanced.fetch_add(count, Ordering::Relaxed);
    }

    pub fn inc_master_change(&self) {
        self.master_changes.fetch_add(1, Ordering::Relaxed);
    }

    /// Format all metrics as Prometheus text
    pub fn to_prometheus(&self) -> String {
        let series: [(&str, &str, &str, &AtomicU64); 14] = [
            ("medalcast_cache_hits_total", "counter", "Reads answered from the local cache", &self.cache_hits),
            ("medalcast_cache_misses_total", "counter", "Reads that fell through to the backend", &self.cache_misses),
            ("medalcast_backend_errors_total", "counter", "Failed backend reads or writes", &self.backend_errors),
            ("medalcast_master_notify_failures_total", "counter", "Interest notifications the master did not receive", &self.master_notify_failures),
            ("medalcast_invalidations_sent_total", "counter", "Targeted invalidations delivered to peers", &self.invalidations_sent),
            ("medalcast_invalidations_failed_total", "counter", "Targeted invalidations skipped because the peer was unreachable", &self.invalidations_failed),
            ("medalcast_score_pushes_total", "counter", "Score updates delivered to subscribers", &self.score_pushes),
            ("medalcast_result_pushes_total", "counter", "Final results delivered to subscribers", &self.result_pushes),
            ("medalcast_push_failures_total", "counter", "Pushes that failed for one subscriber", &self.push_failures),
            ("medalcast_push_latency_avg_microseconds", "gauge", "Average per-subscriber latency of the last score batch", &self.push_latency_avg_us),
            ("medalcast_heartbeats_received_total", "counter", "Heartbeats recorded by the registry", &self.heartbeats_received),
            ("medalcast_instances_evicted_total", "counter", "Instances evicted for missing heartbeats", &self.instances_evicted),
            ("medalcast_clients_rebalanced_total", "counter", "Client assignments made by the load balancer", &self.clients_rebalanced),
            ("medalcast_master_changes_total", "counter", "Times the registry designated a new master replica", &self.master_changes),
        ];

        let mut output = String::new();
        for (name, kind, help, value) in series {
            if !output.is_empty() {
                output.push('\n');
            }
            output.push_str(&format!("# HELP {name} {help}\n"));
            output.push_str(&format!("# TYPE {name} {kind}\n"));
            output.push_str(&format!("{name} {}\n", value.load(Ordering::Relaxed)));
        }
        output
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Global metrics instance
pub static METRICS: Lazy<Metrics> = Lazy::new(Metrics::new);

// ABOUTME: Fire-and-forget delivery of score updates and final results to subscribed clients
// ABOUTME: Each batch is a tracked task; one subscriber failing never affects the others

use futures::future::join_all;
use medalcast_core::error::Error;
use medalcast_core::metrics::{Metrics, METRICS};
use medalcast_core::subscription::Subscriber;
use medalcast_core::traits::PushSink;
use medalcast_core::types::{Athlete, EventKey, Results};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio_util::task::TaskTracker;

/// Outcome of one push batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PushOutcome {
    pub delivered: Vec<String>,
    pub failed: Vec<String>,
}

pub struct PushFanout {
    sink: Arc<dyn PushSink>,
    tasks: TaskTracker,
    drain_lock: Mutex<()>,
}

impl PushFanout {
    pub fn new(sink: Arc<dyn PushSink>) -> Self {
        Self {
            sink,
            tasks: TaskTracker::new(),
            drain_lock: Mutex::new(()),
        }
    }

    /// Schedules a score push to `subscribers` and returns immediately.
    pub fn push_scores(&self, subscribers: Vec<Subscriber>, event: EventKey, scores: Vec<Athlete>) {
        if subscribers.is_empty() {
            return;
        }
        let sink = self.sink.clone();
        self.tasks.spawn(async move {
            let started = Instant::now();
            let outcome = deliver_scores(sink.as_ref(), &subscribers, &event, &scores).await;
            let average = record_score_batch(&METRICS, &outcome, started.elapsed());
            tracing::debug!(
                event = %event,
                delivered = outcome.delivered.len(),
                failed = outcome.failed.len(),
                avg_latency_us = average.as_micros() as u64,
                "Pushed score update"
            );
        });
    }

    /// Schedules a result push. The subscription must already be removed.
    pub fn push_results(&self, subscribers: Vec<Subscriber>, event: EventKey, results: Results) {
        if subscribers.is_empty() {
            return;
        }
        let sink = self.sink.clone();
        self.tasks.spawn(async move {
            let outcome = deliver_results(sink.as_ref(), &subscribers, &event, &results).await;
            METRICS.add_result_pushes(outcome.delivered.len() as u64, outcome.failed.len() as u64);
            tracing::info!(
                event = %event,
                delivered = outcome.delivered.len(),
                failed = outcome.failed.len(),
                "Pushed final results"
            );
        });
    }

    /// Waits for every scheduled push to finish, then accepts new ones again.
    /// Concurrent drains take turns.
    pub async fn drain(&self) {
        let _turn = self.drain_lock.lock().await;
        self.tasks.close();
        self.tasks.wait().await;
        self.tasks.reopen();
    }

    pub fn in_flight(&self) -> usize {
        self.tasks.len()
    }
}

pub async fn deliver_scores(
    sink: &dyn PushSink,
    subscribers: &[Subscriber],
    event: &EventKey,
    scores: &[Athlete],
) -> PushOutcome {
    let attempts = subscribers.iter().map(|subscriber| async move {
        let result = match &subscriber.host {
            Some(host) => {
                sink.update_scores(host, &subscriber.client_id, event, scores)
                    .await
            }
            None => Err(Error::InstanceNotFound(subscriber.client_id.clone())),
        };
        (subscriber.client_id.clone(), result)
    });
    collect("scores", event, join_all(attempts).await)
}

pub async fn deliver_results(
    sink: &dyn PushSink,
    subscribers: &[Subscriber],
    event: &EventKey,
    results: &Results,
) -> PushOutcome {
    let attempts = subscribers.iter().map(|subscriber| async move {
        let result = match &subscriber.host {
            Some(host) => {
                sink.update_results(host, &subscriber.client_id, event, results)
                    .await
            }
            None => Err(Error::InstanceNotFound(subscriber.client_id.clone())),
        };
        (subscriber.client_id.clone(), result)
    });
    collect("results", event, join_all(attempts).await)
}

/// Counts a finished score batch and records its average per-subscriber latency.
fn record_score_batch(metrics: &Metrics, outcome: &PushOutcome, elapsed: Duration) -> Duration {
    let count = (outcome.delivered.len() + outcome.failed.len()).max(1) as u32;
    let average = elapsed / count;
    metrics.add_score_pushes(outcome.delivered.len() as u64, outcome.failed.len() as u64);
    metrics.set_push_latency_avg_us(average.as_micros() as u64);
    average
}

fn collect(
    what: &str,
    event: &EventKey,
    attempts: Vec<(String, medalcast_core::Result<()>)>,
) -> PushOutcome {
    let mut outcome = PushOutcome::default();
    for (client_id, result) in attempts {
        match result {
            Ok(()) => outcome.delivered.push(client_id),
            Err(e) => {
                tracing::warn!(client_id = %client_id, event = %event, "Failed to push {}: {}", what, e);
                outcome.failed.push(client_id);
            }
        }
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use medalcast_core::testing::{PushRecord, RecordingPushSink};
    use std::sync::atomic::Ordering;

    fn subscriber(client_id: &str, host: &str) -> Subscriber {
        Subscriber {
            client_id: client_id.to_string(),
            host: Some(host.to_string()),
        }
    }

    fn podium() -> Results {
        Results {
            gold: Athlete::new("Hasselborg", "SWE", 10),
            silver: Athlete::new("Muirhead", "GBR", 8),
            bronze: Athlete::new("Fujisawa", "JPN", 7),
        }
    }

    #[tokio::test]
    async fn test_one_unreachable_subscriber_does_not_block_others() {
        let sink = RecordingPushSink::new();
        sink.set_unreachable("h2");
        let subscribers = vec![subscriber("c1", "h1"), subscriber("c2", "h2")];
        let scores = vec![Athlete::new("Hasselborg", "SWE", 5)];

        let outcome = deliver_scores(&sink, &subscribers, &EventKey::new("curling"), &scores).await;

        assert_eq!(outcome.delivered, vec!["c1".to_string()]);
        assert_eq!(outcome.failed, vec!["c2".to_string()]);
        assert_eq!(sink.records().len(), 1);
    }

    #[tokio::test]
    async fn test_subscriber_without_host_fails() {
        let sink = RecordingPushSink::new();
        let subscribers = vec![Subscriber {
            client_id: "c9".into(),
            host: None,
        }];
        let outcome = deliver_results(&sink, &subscribers, &EventKey::new("curling"), &podium()).await;
        assert_eq!(outcome.failed, vec!["c9".to_string()]);
        assert!(sink.records().is_empty());
    }

    #[tokio::test]
    async fn test_scheduled_pushes_drain() {
        let sink = Arc::new(RecordingPushSink::new());
        let fanout = PushFanout::new(sink.clone());

        fanout.push_results(
            vec![subscriber("c1", "h1")],
            EventKey::new("curling"),
            podium(),
        );
        fanout.drain().await;

        assert_eq!(fanout.in_flight(), 0);
        assert_eq!(
            sink.records(),
            vec![PushRecord::Results {
                host: "h1".into(),
                client_id: "c1".into(),
                event: EventKey::new("curling"),
                results: podium(),
            }]
        );
    }

    #[tokio::test]
    async fn test_score_batch_records_counts_and_average_latency() {
        let sink = RecordingPushSink::new();
        sink.set_unreachable("h2");
        let subscribers = vec![subscriber("c1", "h1"), subscriber("c2", "h2")];
        let scores = vec![Athlete::new("Hasselborg", "SWE", 5)];
        let outcome = deliver_scores(&sink, &subscribers, &EventKey::new("curling"), &scores).await;

        let metrics = Metrics::new();
        let average = record_score_batch(&metrics, &outcome, Duration::from_millis(10));

        assert_eq!(average, Duration::from_millis(5));
        assert_eq!(metrics.score_pushes.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.push_failures.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.push_latency_avg_us.load(Ordering::Relaxed), 5000);
    }

    #[tokio::test]
    async fn test_overlapping_drains_both_return() {
        let sink = Arc::new(RecordingPushSink::new());
        let fanout = PushFanout::new(sink.clone());
        fanout.push_results(vec![subscriber("c1", "h1")], EventKey::new("curling"), podium());

        tokio::time::timeout(Duration::from_secs(1), async {
            tokio::join!(fanout.drain(), fanout.drain());
        })
        .await
        .unwrap();
        assert_eq!(sink.records().len(), 1);
    }

    #[tokio::test]
    async fn test_empty_batch_spawns_nothing() {
        let fanout = PushFanout::new(Arc::new(RecordingPushSink::new()));
        fanout.push_scores(Vec::new(), EventKey::new("curling"), Vec::new());
        assert_eq!(fanout.in_flight(), 0);
    }
}

// ABOUTME: Background task announcing a replica's liveness to the registry on a fixed interval
// ABOUTME: Missed beats are logged; the registry evicts the replica if they keep failing

use medalcast_core::traits::Discovery;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Beats once per `interval` until `cancel` fires. The first beat is immediate.
pub fn spawn_heartbeat(
    discovery: Arc<dyn Discovery>,
    instance_name: String,
    interval: Duration,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut consecutive_failures: u32 = 0;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::debug!(instance = %instance_name, "Heartbeat task shutting down");
                    break;
                }

                _ = ticker.tick() => {
                    match discovery.beat(&instance_name).await {
                        Ok(()) => {
                            if consecutive_failures > 0 {
                                tracing::info!(
                                    instance = %instance_name,
                                    failures = consecutive_failures,
                                    "Heartbeat recovered"
                                );
                            }
                            consecutive_failures = 0;
                        }
                        Err(e) => {
                            consecutive_failures += 1;
                            tracing::error!(
                                instance = %instance_name,
                                failures = consecutive_failures,
                                "Heartbeat failed: {}",
                                e
                            );
                        }
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use medalcast_core::testing::StaticDiscovery;

    #[tokio::test(start_paused = true)]
    async fn test_beats_on_interval_until_cancelled() {
        let discovery = Arc::new(StaticDiscovery::new(Vec::new()));
        let cancel = CancellationToken::new();
        let handle = spawn_heartbeat(
            discovery.clone(),
            "replica1".to_string(),
            Duration::from_secs(3),
            cancel.clone(),
        );

        tokio::time::sleep(Duration::from_millis(6500)).await;
        cancel.cancel();
        handle.await.unwrap();

        assert_eq!(discovery.beats(), vec!["replica1"; 3]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_beats_keep_the_task_alive() {
        let discovery = Arc::new(StaticDiscovery::new(Vec::new()));
        discovery.set_unavailable(true);
        let cancel = CancellationToken::new();
        let handle = spawn_heartbeat(
            discovery.clone(),
            "replica1".to_string(),
            Duration::from_secs(3),
            cancel.clone(),
        );

        tokio::time::sleep(Duration::from_millis(3500)).await;
        discovery.set_unavailable(false);
        tokio::time::sleep(Duration::from_secs(3)).await;
        cancel.cancel();
        handle.await.unwrap();

        assert_eq!(discovery.beats().len(), 1);
    }
}

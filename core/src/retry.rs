// ABOUTME: Bounded retry with a fixed wait for resolve-and-connect to one known peer
// ABOUTME: Fan-out to peer sets never retries; only single-peer setup paths use this

use std::future::Future;
use std::time::Duration;

use crate::error::{Error, Result};

pub const DEFAULT_RETRY_LIMIT: u32 = 3;
pub const DEFAULT_RETRY_WAIT: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub wait: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: DEFAULT_RETRY_LIMIT,
            wait: DEFAULT_RETRY_WAIT,
        }
    }
}

impl RetryPolicy {
    pub fn new(attempts: u32, wait: Duration) -> Self {
        Self { attempts, wait }
    }

    /// Runs `op` until it succeeds, fails with a non-retryable error, or the
    /// attempt budget is spent. Waits `self.wait` between attempts.
    pub async fn run<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let attempts = self.attempts.max(1);
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < attempts => {
                    tracing::warn!(
                        attempt,
                        attempts,
                        wait_ms = self.wait.as_millis() as u64,
                        "{} failed: {}, retrying",
                        what,
                        e
                    );
                    tokio::time::sleep(self.wait).await;
                    attempt += 1;
                }
                Err(e) => {
                    if e.is_retryable() {
                        return Err(Error::PeerUnreachable(format!(
                            "{what} after {attempts} attempts: {e}"
                        )));
                    }
                    return Err(e);
                }
            }
        }
    }
}

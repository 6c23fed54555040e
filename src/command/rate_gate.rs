//! Minimum spacing between outbound requests

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};
use tracing::debug;

/// Blocks callers until `min_interval` has passed since the previous call
///
/// The lock is held across check, sleep and stamp so two overlapping
/// callers never both sleep against the same stale timestamp. Waiters are
/// served in FIFO order by the tokio mutex.
pub struct RateGate {
    min_interval: Duration,
    last: Mutex<Option<Instant>>,
}

impl RateGate {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last: Mutex::new(None),
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Wait until the next request may be sent
    pub async fn wait(&self) {
        let mut last = self.last.lock().await;

        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < self.min_interval {
                let remaining = self.min_interval - elapsed;
                debug!(remaining_ms = remaining.as_millis() as u64, "rate gate sleeping");
                sleep(remaining).await;
            }
        }

        *last = Some(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_back_to_back_waits_are_spaced() {
        let gate = RateGate::new(Duration::from_millis(80));
        gate.wait().await;
        let first = Instant::now();
        gate.wait().await;
        assert!(first.elapsed() >= Duration::from_millis(80));
    }

    #[tokio::test]
    async fn test_zero_interval_never_sleeps() {
        let gate = RateGate::new(Duration::ZERO);
        let start = Instant::now();
        for _ in 0..5 {
            gate.wait().await;
        }
        assert!(start.elapsed() < Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_concurrent_callers_do_not_overlap() {
        let gate = Arc::new(RateGate::new(Duration::from_millis(60)));
        let start = Instant::now();

        let handles: Vec<_> = (0..3)
            .map(|_| {
                let gate = Arc::clone(&gate);
                tokio::spawn(async move {
                    gate.wait().await;
                    Instant::now()
                })
            })
            .collect();

        let mut stamps = Vec::new();
        for handle in handles {
            stamps.push(handle.await.unwrap());
        }
        stamps.sort();

        for pair in stamps.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::from_millis(60));
        }
        assert!(start.elapsed() >= Duration::from_millis(120));
    }
}

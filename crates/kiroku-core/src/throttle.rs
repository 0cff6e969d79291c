use std::sync::Arc;
use std::time::Duration;

use kiroku_api::delay::{wait, Cancelled, Delay, TokioDelay};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Minimum spacing between processed sync requests, shared by every drain
/// in the process.
///
/// The last-start timestamp is held under an async lock across the wait, so
/// concurrent callers queue up behind each other instead of racing.
pub struct Throttle {
    min_interval: Duration,
    delay: Arc<dyn Delay>,
    last: Mutex<Option<Instant>>,
}

impl Throttle {
    pub fn new(min_interval: Duration) -> Self {
        Self::with_delay(min_interval, TokioDelay::shared())
    }

    pub fn with_delay(min_interval: Duration, delay: Arc<dyn Delay>) -> Self {
        Self {
            min_interval,
            delay,
            last: Mutex::new(None),
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Wait until a new request may start, then claim the slot.
    pub async fn acquire(&self, cancel: &CancellationToken) -> Result<(), Cancelled> {
        let mut last = self.last.lock().await;
        if let Some(previous) = *last {
            let remaining = self.min_interval.saturating_sub(previous.elapsed());
            if !remaining.is_zero() {
                debug!(wait_ms = remaining.as_millis() as u64, "throttling sync");
                wait(self.delay.as_ref(), remaining, cancel).await?;
            }
        } else if cancel.is_cancelled() {
            return Err(Cancelled);
        }
        *last = Some(Instant::now());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_first_acquire_is_immediate() {
        let throttle = Throttle::new(Duration::from_secs(5));
        let start = Instant::now();
        throttle.acquire(&CancellationToken::new()).await.unwrap();
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_consecutive_acquires_are_spaced() {
        let throttle = Throttle::new(Duration::from_secs(5));
        let cancel = CancellationToken::new();

        let mut starts = Vec::new();
        for _ in 0..3 {
            throttle.acquire(&cancel).await.unwrap();
            starts.push(Instant::now());
            tokio::time::sleep(Duration::from_secs(1)).await;
        }

        for pair in starts.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::from_secs(5));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_elapsed_interval_needs_no_wait() {
        let throttle = Throttle::new(Duration::from_secs(5));
        let cancel = CancellationToken::new();
        throttle.acquire(&cancel).await.unwrap();
        tokio::time::sleep(Duration::from_secs(7)).await;

        let before = Instant::now();
        throttle.acquire(&cancel).await.unwrap();
        assert_eq!(before.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_callers_are_serialized() {
        let throttle = Arc::new(Throttle::new(Duration::from_secs(5)));
        let cancel = CancellationToken::new();

        let handles: Vec<_> = (0..3)
            .map(|_| {
                let throttle = throttle.clone();
                let cancel = cancel.clone();
                tokio::spawn(async move {
                    throttle.acquire(&cancel).await.unwrap();
                    Instant::now()
                })
            })
            .collect();

        let mut starts = Vec::new();
        for handle in handles {
            starts.push(handle.await.unwrap());
        }
        starts.sort();
        for pair in starts.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::from_secs(5));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_interrupts_wait() {
        let throttle = Throttle::new(Duration::from_secs(5));
        let cancel = CancellationToken::new();
        throttle.acquire(&cancel).await.unwrap();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });
        assert_eq!(throttle.acquire(&cancel).await, Err(Cancelled));
    }
}

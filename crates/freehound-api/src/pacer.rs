use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};

/// Smallest allowed spacing between remote calls.
pub const MIN_DELAY: Duration = Duration::from_millis(500);
/// Largest allowed spacing between remote calls.
pub const MAX_DELAY: Duration = Duration::from_secs(10);

/// Single-slot spacing gate for outbound API calls.
///
/// Every tracker request acquires the pacer before sending, so consecutive
/// calls are separated by at least the configured delay no matter which
/// caller issues them. The remote enforces per-credential rate limits, so
/// this must stay a single slot.
pub struct CallPacer {
    delay: Duration,
    last: Mutex<Option<Instant>>,
}

impl CallPacer {
    /// Create a pacer with the given spacing, clamped to [0.5s, 10s].
    pub fn new(delay: Duration) -> Self {
        Self {
            delay: delay.clamp(MIN_DELAY, MAX_DELAY),
            last: Mutex::new(None),
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Wait until the spacing since the previous call has elapsed, then
    /// claim the slot.
    pub async fn acquire(&self) {
        let mut last = self.last.lock().await;
        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            if elapsed < self.delay {
                sleep(self.delay - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_clamped() {
        assert_eq!(CallPacer::new(Duration::from_millis(10)).delay(), MIN_DELAY);
        assert_eq!(CallPacer::new(Duration::from_secs(60)).delay(), MAX_DELAY);
        assert_eq!(
            CallPacer::new(Duration::from_secs(2)).delay(),
            Duration::from_secs(2)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_consecutive_calls_are_spaced() {
        let pacer = CallPacer::new(Duration::from_secs(1));

        let start = Instant::now();
        pacer.acquire().await;
        // First call goes through immediately.
        assert_eq!(start.elapsed(), Duration::ZERO);

        pacer.acquire().await;
        assert!(start.elapsed() >= Duration::from_secs(1));

        pacer.acquire().await;
        assert!(start.elapsed() >= Duration::from_secs(2));
    }
}

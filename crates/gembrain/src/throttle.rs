//! Request-rate throttle.
//!
//! [`ThrottleGate`] enforces a minimum spacing between outbound request
//! *dispatches*: the timestamp is recorded when a caller is released, before
//! its network call executes, so the interval measures dispatch spacing
//! rather than completion spacing.

use std::time::Instant;

use tokio::sync::Mutex;

/// Minimum-interval gate shared by every concurrent caller.
///
/// Callers are serialized through the internal mutex, which is held across
/// the sleep: whoever locks first dispatches first, and a slow caller's wait
/// delays unrelated callers behind it.  There is deliberately no fairness
/// queue beyond scheduling order.
pub struct ThrottleGate {
    min_interval: std::time::Duration,
    last_dispatch: Mutex<Option<Instant>>,
}

impl ThrottleGate {
    /// Create a gate with the given minimum dispatch interval.
    pub fn new(min_interval: std::time::Duration) -> Self {
        Self {
            min_interval,
            last_dispatch: Mutex::new(None),
        }
    }

    /// Block until at least the minimum interval has elapsed since the
    /// previous dispatch, then record this call's dispatch time.
    pub async fn wait(&self) {
        let mut last = self.last_dispatch.lock().await;
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < self.min_interval {
                let remaining = self.min_interval - elapsed;
                tracing::debug!(wait_ms = remaining.as_millis() as u64, "throttling dispatch");
                tokio::time::sleep(remaining).await;
            }
        }
        *last = Some(Instant::now());
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn first_call_passes_immediately() {
        let gate = ThrottleGate::new(Duration::from_secs(3));
        let start = tokio::time::Instant::now();
        gate.wait().await;
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn second_call_waits_out_the_interval() {
        let gate = ThrottleGate::new(Duration::from_millis(3500));
        gate.wait().await;

        let start = tokio::time::Instant::now();
        gate.wait().await;
        assert!(start.elapsed() >= Duration::from_millis(3500));
    }

    #[tokio::test(start_paused = true)]
    async fn spacing_measures_dispatch_not_completion() {
        let gate = ThrottleGate::new(Duration::from_millis(100));
        gate.wait().await;

        // Simulate a slow network call after dispatch; the next wait only
        // needs to cover the remainder of the interval, not restart it.
        tokio::time::sleep(Duration::from_millis(80)).await;

        let start = tokio::time::Instant::now();
        gate.wait().await;
        let waited = start.elapsed();
        assert!(waited >= Duration::from_millis(20));
        assert!(waited < Duration::from_millis(100));
    }
}

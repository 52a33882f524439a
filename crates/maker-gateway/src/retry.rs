//! Explicit retry policy for REST calls.
//!
//! Composed around each gateway call at the call site, parameterized by
//! the error taxonomy's retry classification: transient errors back off
//! and retry, fatal errors propagate on the first attempt.

use crate::error::GatewayResult;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Bounded exponential backoff with jitter.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            max_delay,
        }
    }

    /// Backoff before retry number `attempt` (1-based): base * 2^(attempt-1),
    /// capped, plus jitter.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(10);
        let millis = (self.base_delay.as_millis() as u64).saturating_mul(1u64 << exponent);
        let capped = millis.min(self.max_delay.as_millis() as u64);
        Duration::from_millis(capped + jitter_ms(100))
    }

    /// Run `op`, retrying while the error classification is retryable and
    /// attempts remain. The last classified error propagates once the
    /// attempt budget is exhausted.
    pub async fn run<T, F, Fut>(&self, op_name: &str, mut op: F) -> GatewayResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = GatewayResult<T>>,
    {
        let mut attempt = 1u32;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < self.max_attempts => {
                    let delay = self.delay_for(attempt);
                    warn!(
                        op = op_name,
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Retrying after transient error"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Cheap jitter without an RNG dependency: sub-second clock noise.
fn jitter_ms(cap: u64) -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    (nanos as u64) % cap.max(1)
}

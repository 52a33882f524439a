//! Volatility circuit breaker.
//!
//! Compares the endpoints of the trailing price window. A move beyond
//! the threshold pauses quoting for `pause_duration`, followed by a
//! cooldown during which quoting stays disabled while the breaker
//! resets.

use chrono::{DateTime, Duration, Utc};
use maker_core::Price;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Breaker tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VolatilityConfig {
    pub enabled: bool,
    /// Evaluation window over the price history, in seconds.
    pub window_secs: u64,
    /// Fractional move that trips the breaker (0.05 = 5%).
    pub pause_threshold_pct: Decimal,
    pub pause_duration_secs: u64,
    pub cooldown_duration_secs: u64,
}

impl Default for VolatilityConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            window_secs: 60,
            pause_threshold_pct: Decimal::new(5, 2), // 5%
            pause_duration_secs: 300,
            cooldown_duration_secs: 120,
        }
    }
}

/// A breaker trip event.
#[derive(Debug, Clone, PartialEq)]
pub struct BreakerTrip {
    pub change_pct: Decimal,
    pub paused_until: DateTime<Utc>,
}

/// The volatility breaker state machine.
pub struct VolatilityBreaker {
    config: VolatilityConfig,
    paused_until: Option<DateTime<Utc>>,
    cooldown_until: Option<DateTime<Utc>>,
}

impl VolatilityBreaker {
    pub fn new(config: VolatilityConfig) -> Self {
        Self {
            config,
            paused_until: None,
            cooldown_until: None,
        }
    }

    pub fn config(&self) -> &VolatilityConfig {
        &self.config
    }

    /// Evaluate the trailing window endpoints. Trips when the absolute
    /// fractional move exceeds the threshold; the caller is expected to
    /// cancel all open orders on a trip.
    pub fn evaluate(
        &mut self,
        now: DateTime<Utc>,
        window_endpoints: Option<(Price, Price)>,
    ) -> Option<BreakerTrip> {
        if !self.config.enabled || self.is_paused(now) {
            return None;
        }

        let (start, end) = window_endpoints?;
        if start.is_zero() {
            return None;
        }

        let change_pct = (end.inner() - start.inner()).abs() / start.inner();
        if change_pct <= self.config.pause_threshold_pct {
            return None;
        }

        let paused_until = now + Duration::seconds(self.config.pause_duration_secs as i64);
        let cooldown_until =
            paused_until + Duration::seconds(self.config.cooldown_duration_secs as i64);
        self.paused_until = Some(paused_until);
        self.cooldown_until = Some(cooldown_until);

        warn!(
            change_pct = %change_pct,
            threshold = %self.config.pause_threshold_pct,
            window_secs = self.config.window_secs,
            pause_secs = self.config.pause_duration_secs,
            "CIRCUIT BREAKER TRIPPED"
        );

        Some(BreakerTrip {
            change_pct,
            paused_until,
        })
    }

    /// Inside the pause window: no quoting, no re-evaluation.
    pub fn is_paused(&self, now: DateTime<Utc>) -> bool {
        self.paused_until.is_some_and(|t| now < t)
    }

    /// Between pause expiry and cooldown expiry: still no new quotes.
    pub fn in_cooldown(&self, now: DateTime<Utc>) -> bool {
        !self.is_paused(now) && self.cooldown_until.is_some_and(|t| now < t)
    }

    /// Whether the quoting loop may place new orders.
    pub fn quoting_allowed(&self, now: DateTime<Utc>) -> bool {
        !self.is_paused(now) && !self.in_cooldown(now)
    }

    // Snapshot support.

    pub fn timers(&self) -> (Option<DateTime<Utc>>, Option<DateTime<Utc>>) {
        (self.paused_until, self.cooldown_until)
    }

    pub fn restore_timers(
        &mut self,
        paused_until: Option<DateTime<Utc>>,
        cooldown_until: Option<DateTime<Utc>>,
    ) {
        self.paused_until = paused_until;
        self.cooldown_until = cooldown_until;
    }
}

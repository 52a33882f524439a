//! Daily-loss breaker.
//!
//! At the first evaluation of each UTC day the guard captures a capital
//! baseline. When total capital (balance plus unrealized PnL) falls more
//! than the configured fraction below the baseline, the halt latch is
//! tripped — irreversible for the process lifetime.

use crate::halt::{HaltLatch, HaltReason};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};

/// Guard tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DailyLossConfig {
    pub enabled: bool,
    /// Maximum tolerated fraction of the daily baseline (0.10 = 10%).
    pub max_daily_loss_pct: Decimal,
}

impl Default for DailyLossConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_daily_loss_pct: Decimal::new(10, 2), // 10%
        }
    }
}

/// Tracks the daily capital baseline and evaluates drawdown against it.
pub struct DailyLossGuard {
    config: DailyLossConfig,
    halt: Arc<HaltLatch>,
    baseline_capital: Decimal,
    baseline_date: Option<NaiveDate>,
}

impl DailyLossGuard {
    pub fn new(config: DailyLossConfig, halt: Arc<HaltLatch>) -> Self {
        Self {
            config,
            halt,
            baseline_capital: Decimal::ZERO,
            baseline_date: None,
        }
    }

    /// Capture a fresh baseline if this is the first evaluation of a new
    /// UTC day. Returns true when the baseline rolled.
    pub fn roll_if_new_day(&mut self, today: NaiveDate, balance: Decimal) -> bool {
        let is_new_day = self.baseline_date.map_or(true, |d| d < today);
        if is_new_day || self.baseline_capital.is_zero() {
            self.baseline_capital = balance;
            self.baseline_date = Some(today);
            info!(
                baseline = %balance,
                date = %today,
                "Daily baseline capital captured"
            );
            return true;
        }
        false
    }

    /// Evaluate total capital against the baseline, tripping the halt
    /// latch on breach. Returns the loss fraction when tripped.
    pub fn evaluate(&self, total_capital: Decimal) -> Option<Decimal> {
        if !self.config.enabled || self.baseline_capital <= Decimal::ZERO {
            return None;
        }

        let loss_pct = (self.baseline_capital - total_capital) / self.baseline_capital;
        if loss_pct <= self.config.max_daily_loss_pct {
            return None;
        }

        error!(
            loss_pct = %loss_pct,
            max = %self.config.max_daily_loss_pct,
            baseline = %self.baseline_capital,
            total_capital = %total_capital,
            "DAILY LOSS LIMIT BREACHED"
        );
        self.halt.trip(HaltReason::DailyLossExceeded {
            loss_pct,
            max_loss_pct: self.config.max_daily_loss_pct,
        });
        Some(loss_pct)
    }

    // Snapshot support.

    pub fn baseline(&self) -> (Decimal, Option<NaiveDate>) {
        (self.baseline_capital, self.baseline_date)
    }

    pub fn restore_baseline(&mut self, capital: Decimal, date: Option<NaiveDate>) {
        self.baseline_capital = capital;
        self.baseline_date = date;
    }
}

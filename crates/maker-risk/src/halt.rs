//! Irreversible halt latch.
//!
//! Once tripped, the latch stays tripped for the remainder of the
//! process lifetime; resuming requires a restart. Thread-safe via
//! `Arc<HaltLatch>`.

use parking_lot::RwLock;
use rust_decimal::Decimal;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::error;

/// Why trading was halted.
#[derive(Debug, Clone, PartialEq)]
pub enum HaltReason {
    /// Daily loss exceeded the configured maximum fraction.
    DailyLossExceeded {
        loss_pct: Decimal,
        max_loss_pct: Decimal,
    },
    /// Operator-initiated or engine-internal stop.
    Fatal { message: String },
}

impl fmt::Display for HaltReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DailyLossExceeded {
                loss_pct,
                max_loss_pct,
            } => write!(
                f,
                "daily loss {:.2}% exceeds maximum {:.2}%",
                loss_pct * Decimal::ONE_HUNDRED,
                max_loss_pct * Decimal::ONE_HUNDRED
            ),
            Self::Fatal { message } => write!(f, "fatal: {message}"),
        }
    }
}

/// Emergency-stop latch with no reset path.
pub struct HaltLatch {
    triggered: AtomicBool,
    reason: RwLock<Option<HaltReason>>,
}

impl Default for HaltLatch {
    fn default() -> Self {
        Self::new()
    }
}

impl HaltLatch {
    #[must_use]
    pub fn new() -> Self {
        Self {
            triggered: AtomicBool::new(false),
            reason: RwLock::new(None),
        }
    }

    #[must_use]
    pub fn is_halted(&self) -> bool {
        self.triggered.load(Ordering::SeqCst)
    }

    /// Trip the latch. A second trip is a no-op; the original reason is
    /// preserved.
    pub fn trip(&self, reason: HaltReason) {
        if self
            .triggered
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            *self.reason.write() = Some(reason.clone());
            error!(reason = %reason, "TRADING HALTED");
        }
    }

    /// The reason recorded at trip time, if halted.
    #[must_use]
    pub fn reason(&self) -> Option<HaltReason> {
        if self.is_halted() {
            self.reason.read().clone()
        } else {
            None
        }
    }
}

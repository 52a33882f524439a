//! Risk governor.
//!
//! Two independent breakers protect capital:
//! - a volatility breaker that pauses quoting after sharp price moves
//! - a daily-loss breaker that trips an irreversible halt latch
//!
//! Either can act alone; the halt latch never resets within a process
//! lifetime.

pub mod daily;
pub mod halt;
pub mod volatility;

pub use daily::{DailyLossConfig, DailyLossGuard};
pub use halt::{HaltLatch, HaltReason};
pub use volatility::{BreakerTrip, VolatilityBreaker, VolatilityConfig};

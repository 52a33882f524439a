//! Immutable trade execution records.

use crate::{Price, Qty, Side};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Whether an execution added or removed liquidity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LiquidityRole {
    Maker,
    Taker,
}

impl fmt::Display for LiquidityRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Maker => write!(f, "Maker"),
            Self::Taker => write!(f, "Taker"),
        }
    }
}

/// A single execution against one of our orders.
///
/// Append-only: fills are recorded once and never mutated. The
/// `trade_id` is the idempotency key — applying the same fill twice is a
/// no-op upstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeFill {
    pub order_id: String,
    pub trade_id: String,
    pub symbol: String,
    pub side: Side,
    pub exec_price: Price,
    pub exec_qty: Qty,
    pub fee: Decimal,
    pub fee_currency: String,
    pub liquidity_role: LiquidityRole,
    /// Realized PnL contribution of this fill (zero for opening fills).
    pub realized_pnl_impact: Decimal,
    pub executed_at: DateTime<Utc>,
}

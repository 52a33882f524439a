//! Per-symbol market metadata.

use crate::{Price, Qty};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Immutable per-symbol precision and fee metadata.
///
/// Fetched once at startup; every outgoing price and quantity is rounded
/// through this before submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketInfo {
    pub symbol: String,
    /// Minimum price increment.
    pub price_tick: Price,
    /// Minimum quantity increment.
    pub qty_step: Qty,
    pub min_order_qty: Qty,
    /// Minimum order value in quote currency.
    pub min_notional: Decimal,
    pub maker_fee_rate: Decimal,
    pub taker_fee_rate: Decimal,
}

impl MarketInfo {
    /// Round a price down to the tick grid.
    pub fn round_price(&self, price: Price) -> Price {
        price.round_to_tick(self.price_tick)
    }

    /// Round a quantity down to the step grid.
    pub fn round_qty(&self, qty: Qty) -> Qty {
        qty.round_to_step(self.qty_step)
    }

    /// Whether an order of this size would be accepted by the venue.
    pub fn meets_minimums(&self, price: Price, qty: Qty) -> bool {
        qty >= self.min_order_qty && qty.notional(price) >= self.min_notional
    }
}

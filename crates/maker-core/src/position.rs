//! Position, cost-basis, and PnL accounting.
//!
//! Holdings are signed: positive = long, negative = short. The average
//! entry price is a size-weighted cost basis and is zero whenever the
//! position is flat.

use crate::{Price, Qty, Side};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Aggregated trading performance and cost-basis state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionMetrics {
    /// Signed position quantity (positive long, negative short).
    pub current_holdings: Decimal,
    /// Size-weighted average entry price. Zero while flat.
    pub average_entry_price: Price,
    pub realized_pnl: Decimal,
    pub gross_profit: Decimal,
    pub gross_loss: Decimal,
    pub total_fees: Decimal,
    pub wins: u64,
    pub losses: u64,
    pub total_trades: u64,
}

impl PositionMetrics {
    /// Apply a fill and return its realized PnL impact.
    ///
    /// A fill in the direction of the position (or opening from flat)
    /// blends the average entry price. A fill against the position
    /// realizes PnL on the closed quantity without touching the cost
    /// basis — unless holdings flip sign, in which case the basis resets
    /// to the fill price for the residual.
    pub fn apply_fill(&mut self, side: Side, exec_qty: Qty, exec_price: Price, fee: Decimal) -> Decimal {
        let signed_qty = exec_qty.inner() * Decimal::from(side.sign());
        let mut realized = Decimal::ZERO;

        if self.current_holdings.is_zero() || same_direction(self.current_holdings, signed_qty) {
            let old_abs = self.current_holdings.abs();
            let new_abs = old_abs + exec_qty.inner();
            self.average_entry_price = if old_abs.is_zero() {
                exec_price
            } else {
                Price::new(
                    (self.average_entry_price.inner() * old_abs
                        + exec_price.inner() * exec_qty.inner())
                        / new_abs,
                )
            };
            self.current_holdings += signed_qty;
        } else {
            let was_long = self.current_holdings.is_sign_positive();
            let closed_qty = self.current_holdings.abs().min(exec_qty.inner());
            realized = if was_long {
                (exec_price.inner() - self.average_entry_price.inner()) * closed_qty
            } else {
                (self.average_entry_price.inner() - exec_price.inner()) * closed_qty
            };
            self.realized_pnl += realized;
            self.current_holdings += signed_qty;

            if self.current_holdings.is_zero() {
                self.average_entry_price = Price::ZERO;
            } else if self.current_holdings.is_sign_positive() != was_long {
                // Flipped through flat: the residual opened at the fill price.
                self.average_entry_price = exec_price;
            }
        }

        self.total_trades += 1;
        self.total_fees += fee;
        if realized > Decimal::ZERO {
            self.gross_profit += realized;
            self.wins += 1;
        } else if realized < Decimal::ZERO {
            self.gross_loss += realized.abs();
            self.losses += 1;
        }

        realized
    }

    /// Realized PnL net of fees.
    #[must_use]
    pub fn net_realized_pnl(&self) -> Decimal {
        self.realized_pnl - self.total_fees
    }

    /// Fraction of closing fills that realized a profit.
    #[must_use]
    pub fn win_rate(&self) -> f64 {
        let decided = self.wins + self.losses;
        if decided == 0 {
            0.0
        } else {
            self.wins as f64 / decided as f64
        }
    }

    /// Mark-to-market PnL of the open position. Zero while flat.
    #[must_use]
    pub fn unrealized_pnl(&self, mark: Price) -> Decimal {
        if self.current_holdings.is_zero() || mark.is_zero() {
            return Decimal::ZERO;
        }
        (mark.inner() - self.average_entry_price.inner()) * self.current_holdings
    }
}

fn same_direction(holdings: Decimal, signed_qty: Decimal) -> bool {
    holdings.is_sign_positive() == signed_qty.is_sign_positive()
}

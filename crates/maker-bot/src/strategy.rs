//! Quote strategy interface and the reference implementation.
//!
//! The engine consumes [`QuoteStrategy`]: given a read-only view of
//! state and the instrument metadata, produce target bid/ask prices and
//! sizes. The engine owns rounding to tick/step and minimum-size
//! enforcement before submission.

use crate::config::StrategyConfig;
use maker_core::{MarketInfo, Price, Qty};
use rust_decimal::Decimal;

/// Read-only state exposed to the strategy.
#[derive(Debug, Clone)]
pub struct MarketView {
    pub smoothed_mid: Price,
    pub balance: Decimal,
    pub position_qty: Decimal,
}

/// Target quotes for one refresh cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetQuotes {
    pub bid_price: Price,
    pub bid_qty: Qty,
    pub ask_price: Price,
    pub ask_qty: Qty,
}

/// Consumed strategy interface.
pub trait QuoteStrategy: Send {
    /// Compute target quotes, or None to stand down this cycle.
    fn target_quotes(&self, view: &MarketView, info: &MarketInfo) -> Option<TargetQuotes>;
}

/// Reference quoter: a fixed fractional spread around the smoothed mid,
/// sized as a balance fraction.
pub struct FixedSpreadQuoter {
    spread_pct: Decimal,
    risk_per_trade_pct: Decimal,
    max_order_size_pct: Decimal,
}

impl FixedSpreadQuoter {
    pub fn new(spread_pct: Decimal, risk_per_trade_pct: Decimal, max_order_size_pct: Decimal) -> Self {
        Self {
            spread_pct,
            risk_per_trade_pct,
            max_order_size_pct,
        }
    }

    pub fn from_config(config: &StrategyConfig) -> Self {
        Self::new(
            config.spread_pct,
            config.risk_per_trade_pct,
            config.max_order_size_pct,
        )
    }
}

impl QuoteStrategy for FixedSpreadQuoter {
    fn target_quotes(&self, view: &MarketView, _info: &MarketInfo) -> Option<TargetQuotes> {
        if view.smoothed_mid.is_zero() || view.balance <= Decimal::ZERO {
            return None;
        }

        let mid = view.smoothed_mid.inner();
        let bid_price = Price::new(mid * (Decimal::ONE - self.spread_pct));
        let ask_price = Price::new(mid * (Decimal::ONE + self.spread_pct));

        let quote_value = (view.balance * self.risk_per_trade_pct)
            .min(view.balance * self.max_order_size_pct);
        let qty = Qty::new(quote_value / mid);

        Some(TargetQuotes {
            bid_price,
            bid_qty: qty,
            ask_price,
            ask_qty: qty,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn info() -> MarketInfo {
        MarketInfo {
            symbol: "BTCUSDT".to_string(),
            price_tick: Price::new(dec!(0.1)),
            qty_step: Qty::new(dec!(0.001)),
            min_order_qty: Qty::new(dec!(0.001)),
            min_notional: dec!(5),
            maker_fee_rate: dec!(0.0002),
            taker_fee_rate: dec!(0.0005),
        }
    }

    #[test]
    fn test_quotes_straddle_the_mid() {
        let quoter = FixedSpreadQuoter::new(dec!(0.001), dec!(0.005), dec!(0.1));
        let view = MarketView {
            smoothed_mid: Price::new(dec!(50000)),
            balance: dec!(10000),
            position_qty: dec!(0),
        };

        let quotes = quoter.target_quotes(&view, &info()).unwrap();
        assert_eq!(quotes.bid_price, Price::new(dec!(49950)));
        assert_eq!(quotes.ask_price, Price::new(dec!(50050)));
        assert!(quotes.bid_price < view.smoothed_mid);
        assert!(quotes.ask_price > view.smoothed_mid);
        // 0.5% of 10000 = 50 USDT at 50000 = 0.001 BTC.
        assert_eq!(quotes.bid_qty, Qty::new(dec!(0.001)));
        assert_eq!(quotes.ask_qty, quotes.bid_qty);
    }

    #[test]
    fn test_size_capped_by_max_fraction() {
        let quoter = FixedSpreadQuoter::new(dec!(0.001), dec!(0.5), dec!(0.1));
        let view = MarketView {
            smoothed_mid: Price::new(dec!(100)),
            balance: dec!(1000),
            position_qty: dec!(0),
        };

        let quotes = quoter.target_quotes(&view, &info()).unwrap();
        // Capped at 10% of balance = 100 USDT at price 100 = qty 1.
        assert_eq!(quotes.bid_qty, Qty::new(dec!(1)));
    }

    #[test]
    fn test_stands_down_without_mid_or_balance() {
        let quoter = FixedSpreadQuoter::new(dec!(0.001), dec!(0.005), dec!(0.1));

        let no_mid = MarketView {
            smoothed_mid: Price::ZERO,
            balance: dec!(1000),
            position_qty: dec!(0),
        };
        assert!(quoter.target_quotes(&no_mid, &info()).is_none());

        let no_balance = MarketView {
            smoothed_mid: Price::new(dec!(100)),
            balance: dec!(0),
            position_qty: dec!(0),
        };
        assert!(quoter.target_quotes(&no_balance, &info()).is_none());
    }
}

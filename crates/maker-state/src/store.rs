//! The three-region state store.
//!
//! Lock regions:
//! - market: mid-price, smoothed mid (EMA), bounded price history
//! - orders: the active-order map and the seen-trade-ID set
//! - account: balance, position, and cost-basis metrics
//!
//! Multi-field reads and updates within one region are atomic with
//! respect to other tasks. Lock sections are short and synchronous.

use chrono::{DateTime, Utc};
use maker_core::{Order, PositionMetrics, Price};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet, VecDeque};
use std::time::{Duration, Instant};

/// Cap on remembered trade IDs for fill idempotency.
const SEEN_TRADES_CAP: usize = 4096;

/// Store tuning, injected at construction.
#[derive(Debug, Clone)]
pub struct StateStoreConfig {
    /// EMA smoothing factor for the mid-price.
    pub ema_alpha: Decimal,
    /// Age bound of the price-history window.
    pub history_window: Duration,
    /// Hard cap on history points.
    pub history_max_points: usize,
}

impl Default for StateStoreConfig {
    fn default() -> Self {
        Self {
            ema_alpha: Decimal::new(2, 1), // 0.2
            history_window: Duration::from_secs(300),
            history_max_points: 2048,
        }
    }
}

pub(crate) struct MarketRegion {
    pub mid_price: Price,
    pub smoothed_mid: Price,
    pub history: VecDeque<(DateTime<Utc>, Price)>,
    pub last_message_at: Option<Instant>,
}

pub(crate) struct OrdersRegion {
    pub active: HashMap<String, Order>,
    seen_trades: HashSet<String>,
    seen_order: VecDeque<String>,
}

impl OrdersRegion {
    /// Record a trade ID; returns false if it was already seen.
    pub(crate) fn remember_trade(&mut self, trade_id: &str) -> bool {
        if self.seen_trades.contains(trade_id) {
            return false;
        }
        if self.seen_order.len() >= SEEN_TRADES_CAP {
            if let Some(evicted) = self.seen_order.pop_front() {
                self.seen_trades.remove(&evicted);
            }
        }
        self.seen_trades.insert(trade_id.to_string());
        self.seen_order.push_back(trade_id.to_string());
        true
    }
}

pub(crate) struct AccountRegion {
    pub balance: Decimal,
    pub available_balance: Decimal,
    pub position_qty: Decimal,
    pub venue_unrealized_pnl: Decimal,
    pub metrics: PositionMetrics,
}

/// Atomic view of the account region.
#[derive(Debug, Clone)]
pub struct AccountView {
    pub balance: Decimal,
    pub available_balance: Decimal,
    pub position_qty: Decimal,
    pub venue_unrealized_pnl: Decimal,
    pub metrics: PositionMetrics,
}

/// Everything the snapshot needs from the store, exported atomically
/// per region.
#[derive(Debug, Clone)]
pub struct StateExport {
    pub mid_price: Price,
    pub smoothed_mid: Price,
    pub price_history: Vec<(DateTime<Utc>, Price)>,
    pub balance: Decimal,
    pub available_balance: Decimal,
    pub position_qty: Decimal,
    pub metrics: PositionMetrics,
    pub active_orders: Vec<Order>,
}

/// The state store. Shared as `Arc<StateStore>`.
pub struct StateStore {
    config: StateStoreConfig,
    pub(crate) market: Mutex<MarketRegion>,
    pub(crate) orders: Mutex<OrdersRegion>,
    pub(crate) account: Mutex<AccountRegion>,
}

impl StateStore {
    pub fn new(config: StateStoreConfig) -> Self {
        Self {
            config,
            market: Mutex::new(MarketRegion {
                mid_price: Price::ZERO,
                smoothed_mid: Price::ZERO,
                history: VecDeque::new(),
                last_message_at: None,
            }),
            orders: Mutex::new(OrdersRegion {
                active: HashMap::new(),
                seen_trades: HashSet::new(),
                seen_order: VecDeque::new(),
            }),
            account: Mutex::new(AccountRegion {
                balance: Decimal::ZERO,
                available_balance: Decimal::ZERO,
                position_qty: Decimal::ZERO,
                venue_unrealized_pnl: Decimal::ZERO,
                metrics: PositionMetrics::default(),
            }),
        }
    }

    // --- market region ---

    /// Apply a top-of-book update: recompute the mid, advance the EMA,
    /// and append to the bounded history.
    pub fn apply_orderbook(&self, best_bid: Decimal, best_ask: Decimal) {
        let mid = Price::new((best_bid + best_ask) / Decimal::TWO);
        let now = Utc::now();

        let mut market = self.market.lock();
        market.last_message_at = Some(Instant::now());

        if mid != market.mid_price {
            market.mid_price = mid;
            market.smoothed_mid = if market.smoothed_mid.is_zero() {
                mid
            } else {
                let alpha = self.config.ema_alpha;
                Price::new(
                    alpha * mid.inner() + (Decimal::ONE - alpha) * market.smoothed_mid.inner(),
                )
            };
            market.history.push_back((now, mid));
        }

        // Trim by age and by cap.
        let window = chrono::Duration::from_std(self.config.history_window)
            .unwrap_or_else(|_| chrono::Duration::seconds(300));
        while let Some((ts, _)) = market.history.front() {
            if now - *ts > window || market.history.len() > self.config.history_max_points {
                market.history.pop_front();
            } else {
                break;
            }
        }
    }

    pub fn mid_price(&self) -> Price {
        self.market.lock().mid_price
    }

    pub fn smoothed_mid(&self) -> Price {
        self.market.lock().smoothed_mid
    }

    /// Age of the most recent stream message, if any was received.
    pub fn market_data_age(&self) -> Option<Duration> {
        self.market.lock().last_message_at.map(|t| t.elapsed())
    }

    /// First and last prices within the trailing window, for the
    /// volatility breaker. None with fewer than two points.
    pub fn price_window_endpoints(&self, window: Duration) -> Option<(Price, Price)> {
        let market = self.market.lock();
        let cutoff = Utc::now()
            - chrono::Duration::from_std(window).unwrap_or_else(|_| chrono::Duration::seconds(60));

        let mut iter = market.history.iter().filter(|(ts, _)| *ts >= cutoff);
        let first = iter.next()?;
        let last = iter.last()?;
        Some((first.1, last.1))
    }

    // --- orders region ---

    pub fn insert_order(&self, order: Order) {
        self.orders.lock().active.insert(order.order_id.clone(), order);
    }

    pub fn remove_order(&self, order_id: &str) -> Option<Order> {
        self.orders.lock().active.remove(order_id)
    }

    pub fn active_orders(&self) -> Vec<Order> {
        self.orders.lock().active.values().cloned().collect()
    }

    pub fn active_order_count(&self) -> usize {
        self.orders.lock().active.len()
    }

    pub fn clear_orders(&self) {
        self.orders.lock().active.clear();
    }

    // --- account region ---

    /// Overwrite the account region from an authoritative REST fetch.
    pub fn set_account(
        &self,
        balance: Decimal,
        available_balance: Decimal,
        position_qty: Decimal,
        venue_unrealized_pnl: Decimal,
    ) {
        let mut account = self.account.lock();
        account.balance = balance;
        account.available_balance = available_balance;
        account.position_qty = position_qty;
        account.venue_unrealized_pnl = venue_unrealized_pnl;
    }

    /// Adjust the virtual balance by a signed delta (dry-run fills).
    pub fn adjust_balance(&self, delta: Decimal) {
        let mut account = self.account.lock();
        account.balance += delta;
        account.available_balance = account.balance;
    }

    pub fn account_view(&self) -> AccountView {
        let account = self.account.lock();
        AccountView {
            balance: account.balance,
            available_balance: account.available_balance,
            position_qty: account.position_qty,
            venue_unrealized_pnl: account.venue_unrealized_pnl,
            metrics: account.metrics.clone(),
        }
    }

    // --- snapshot support ---

    /// Export all persisted fields, atomically per region.
    pub fn export(&self) -> StateExport {
        let (mid_price, smoothed_mid, price_history) = {
            let market = self.market.lock();
            (
                market.mid_price,
                market.smoothed_mid,
                market.history.iter().cloned().collect(),
            )
        };
        let active_orders = self.active_orders();
        let account = self.account_view();

        StateExport {
            mid_price,
            smoothed_mid,
            price_history,
            balance: account.balance,
            available_balance: account.available_balance,
            position_qty: account.position_qty,
            metrics: account.metrics,
            active_orders,
        }
    }

    /// Restore persisted fields from a snapshot.
    pub fn restore(&self, export: StateExport) {
        {
            let mut market = self.market.lock();
            market.mid_price = export.mid_price;
            market.smoothed_mid = export.smoothed_mid;
            market.history = export.price_history.into_iter().collect();
        }
        {
            let mut orders = self.orders.lock();
            orders.active = export
                .active_orders
                .into_iter()
                .map(|o| (o.order_id.clone(), o))
                .collect();
        }
        {
            let mut account = self.account.lock();
            account.balance = export.balance;
            account.available_balance = export.available_balance;
            account.position_qty = export.position_qty;
            account.metrics = export.metrics;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn store() -> StateStore {
        StateStore::new(StateStoreConfig {
            ema_alpha: dec!(0.5),
            history_window: Duration::from_secs(60),
            history_max_points: 16,
        })
    }

    #[test]
    fn test_mid_price_and_ema() {
        let s = store();
        s.apply_orderbook(dec!(99), dec!(101));
        assert_eq!(s.mid_price(), Price::new(dec!(100)));
        // EMA seeds with the first mid.
        assert_eq!(s.smoothed_mid(), Price::new(dec!(100)));

        s.apply_orderbook(dec!(103), dec!(105));
        assert_eq!(s.mid_price(), Price::new(dec!(104)));
        // 0.5 * 104 + 0.5 * 100 = 102
        assert_eq!(s.smoothed_mid(), Price::new(dec!(102)));
    }

    #[test]
    fn test_unchanged_mid_does_not_extend_history() {
        let s = store();
        s.apply_orderbook(dec!(99), dec!(101));
        s.apply_orderbook(dec!(99), dec!(101));
        let export = s.export();
        assert_eq!(export.price_history.len(), 1);
    }

    #[test]
    fn test_history_cap() {
        let s = store();
        for i in 0..40 {
            s.apply_orderbook(dec!(100) + Decimal::from(i), dec!(102) + Decimal::from(i));
        }
        let export = s.export();
        assert!(export.price_history.len() <= 17);
    }

    #[test]
    fn test_window_endpoints() {
        let s = store();
        s.apply_orderbook(dec!(99), dec!(101));
        s.apply_orderbook(dec!(102), dec!(104));
        s.apply_orderbook(dec!(105), dec!(107));

        let (start, end) = s.price_window_endpoints(Duration::from_secs(60)).unwrap();
        assert_eq!(start, Price::new(dec!(100)));
        assert_eq!(end, Price::new(dec!(106)));

        // A single point is not enough.
        let s2 = store();
        s2.apply_orderbook(dec!(99), dec!(101));
        assert!(s2.price_window_endpoints(Duration::from_secs(60)).is_none());
    }

    #[test]
    fn test_market_data_age_tracks_messages() {
        let s = store();
        assert!(s.market_data_age().is_none());
        s.apply_orderbook(dec!(99), dec!(101));
        assert!(s.market_data_age().unwrap() < Duration::from_secs(1));
    }

    #[test]
    fn test_account_overwrite() {
        let s = store();
        s.set_account(dec!(10000), dec!(9500), dec!(0.5), dec!(12));
        let view = s.account_view();
        assert_eq!(view.balance, dec!(10000));
        assert_eq!(view.available_balance, dec!(9500));
        assert_eq!(view.position_qty, dec!(0.5));
        assert_eq!(view.venue_unrealized_pnl, dec!(12));
    }

    #[test]
    fn test_seen_trades_bounded() {
        let s = store();
        let mut orders = s.orders.lock();
        for i in 0..(SEEN_TRADES_CAP + 10) {
            assert!(orders.remember_trade(&format!("t-{i}")));
        }
        // Oldest entries were evicted, so they read as new again.
        assert!(orders.remember_trade("t-0"));
        // Recent entries are still deduplicated.
        assert!(!orders.remember_trade(&format!("t-{}", SEEN_TRADES_CAP + 9)));
    }
}

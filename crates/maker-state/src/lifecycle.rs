//! Order lifecycle management.
//!
//! Transitions are driven exclusively by exchange-originated events.
//! Events for orders we do not know are adopted rather than discarded so
//! no fill is ever lost; duplicate executions are dropped by trade ID.

use crate::store::StateStore;
use chrono::Utc;
use maker_core::{
    ClientOrderId, LiquidityRole, Order, OrderType, Price, Qty, TradeFill,
};
use maker_gateway::{ExecutionUpdate, OrderUpdate, PositionUpdate, WalletUpdate};
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

/// Result of applying an exchange order event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderEventOutcome {
    /// Known order updated and still active.
    Updated,
    /// Known order reached a terminal status and left the active set.
    Closed,
    /// Unknown active order adopted into local state.
    Adopted,
    /// Unknown order arrived already terminal; nothing to track.
    AdoptedClosed,
    /// Update against an already-terminal local order; ignored.
    Stale,
}

impl StateStore {
    /// Apply an exchange order event to the active-order map.
    pub fn apply_order_update(&self, update: &OrderUpdate) -> OrderEventOutcome {
        let mut orders = self.orders.lock();

        if let Some(order) = orders.active.get_mut(&update.order_id) {
            if !order.apply_update(update.order_status, Qty::new(update.cum_exec_qty)) {
                debug!(
                    order_id = %update.order_id,
                    status = %update.order_status,
                    "Ignoring update against terminal order"
                );
                return OrderEventOutcome::Stale;
            }
            if order.is_terminal() {
                orders.active.remove(&update.order_id);
                info!(
                    order_id = %update.order_id,
                    status = %update.order_status,
                    "Order closed"
                );
                return OrderEventOutcome::Closed;
            }
            return OrderEventOutcome::Updated;
        }

        // Unknown order: adopt instead of discarding, so a fill that
        // raced ahead of our bookkeeping is never lost.
        if update.order_status.is_terminal() {
            warn!(
                order_id = %update.order_id,
                status = %update.order_status,
                "Event for unknown order arrived already terminal"
            );
            return OrderEventOutcome::AdoptedClosed;
        }

        warn!(
            order_id = %update.order_id,
            status = %update.order_status,
            "Adopting untracked active order from exchange event"
        );
        orders
            .active
            .insert(update.order_id.clone(), order_from_update(update));
        OrderEventOutcome::Adopted
    }

    /// Apply an execution event, idempotent by trade ID.
    ///
    /// Returns the recorded fill for audit logging, or None when the
    /// event is a duplicate or carries no tradable quantity.
    pub fn apply_execution(&self, exec: &ExecutionUpdate) -> Option<TradeFill> {
        if exec.exec_qty <= Decimal::ZERO || exec.exec_price <= Decimal::ZERO {
            warn!(
                order_id = %exec.order_id,
                trade_id = %exec.exec_id,
                "Execution with zero quantity or price, skipping"
            );
            return None;
        }

        {
            let mut orders = self.orders.lock();
            if !orders.remember_trade(&exec.exec_id) {
                debug!(trade_id = %exec.exec_id, "Duplicate execution, skipping");
                return None;
            }
        }

        let exec_price = Price::new(exec.exec_price);
        let exec_qty = Qty::new(exec.exec_qty);
        let realized = {
            let mut account = self.account.lock();
            account
                .metrics
                .apply_fill(exec.side, exec_qty, exec_price, exec.exec_fee)
        };

        info!(
            order_id = %exec.order_id,
            trade_id = %exec.exec_id,
            side = %exec.side,
            price = %exec_price,
            qty = %exec_qty,
            fee = %exec.exec_fee,
            realized_pnl = %realized,
            "Fill recorded"
        );

        Some(TradeFill {
            order_id: exec.order_id.clone(),
            trade_id: exec.exec_id.clone(),
            symbol: exec.symbol.clone(),
            side: exec.side,
            exec_price,
            exec_qty,
            fee: exec.exec_fee,
            fee_currency: exec.fee_currency.clone(),
            liquidity_role: if exec.is_maker {
                LiquidityRole::Maker
            } else {
                LiquidityRole::Taker
            },
            realized_pnl_impact: realized,
            executed_at: Utc::now(),
        })
    }

    /// Apply an exchange position event.
    pub fn apply_position_update(&self, update: &PositionUpdate) {
        let mut account = self.account.lock();
        let new_qty = update.signed_qty();
        if new_qty != account.position_qty {
            info!(
                symbol = %update.symbol,
                position = %new_qty,
                "Position update"
            );
            account.position_qty = new_qty;
        }
        account.venue_unrealized_pnl = update.unrealised_pnl;
    }

    /// Apply an exchange wallet event for the quote currency.
    pub fn apply_wallet_update(&self, update: &WalletUpdate) {
        let mut account = self.account.lock();
        account.balance = update.wallet_balance;
        account.available_balance = update.available_balance;
    }
}

fn order_from_update(update: &OrderUpdate) -> Order {
    Order {
        order_id: update.order_id.clone(),
        client_order_id: ClientOrderId::from_string(update.client_order_id.clone()),
        symbol: update.symbol.clone(),
        side: update.side,
        order_type: if update.order_type == "Market" {
            OrderType::Market
        } else {
            OrderType::Limit
        },
        price: Price::new(update.price),
        qty: Qty::new(update.qty),
        cum_filled_qty: Qty::new(update.cum_exec_qty),
        status: update.order_status,
        reduce_only: update.reduce_only,
        created_at: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::StateStoreConfig;
    use maker_core::{OrderStatus, Side};
    use rust_decimal_macros::dec;

    fn store() -> StateStore {
        StateStore::new(StateStoreConfig::default())
    }

    fn tracked_order(store: &StateStore, order_id: &str, side: Side) {
        store.insert_order(Order {
            order_id: order_id.to_string(),
            client_order_id: ClientOrderId::new(side),
            symbol: "BTCUSDT".to_string(),
            side,
            order_type: OrderType::Limit,
            price: Price::new(dec!(100)),
            qty: Qty::new(dec!(10)),
            cum_filled_qty: Qty::ZERO,
            status: OrderStatus::New,
            reduce_only: false,
            created_at: Utc::now(),
        });
    }

    fn order_update(order_id: &str, status: OrderStatus, cum: Decimal) -> OrderUpdate {
        OrderUpdate {
            order_id: order_id.to_string(),
            client_order_id: format!("cl_{order_id}"),
            symbol: "BTCUSDT".to_string(),
            side: Side::Buy,
            order_type: "Limit".to_string(),
            price: dec!(100),
            qty: dec!(10),
            cum_exec_qty: cum,
            order_status: status,
            reduce_only: false,
        }
    }

    fn execution(trade_id: &str, side: Side, qty: Decimal, price: Decimal) -> ExecutionUpdate {
        ExecutionUpdate {
            order_id: "o-1".to_string(),
            exec_id: trade_id.to_string(),
            symbol: "BTCUSDT".to_string(),
            side,
            exec_price: price,
            exec_qty: qty,
            exec_fee: dec!(0.1),
            fee_currency: "USDT".to_string(),
            is_maker: true,
        }
    }

    #[test]
    fn test_partial_fill_keeps_order_active() {
        let s = store();
        tracked_order(&s, "o-1", Side::Buy);

        let outcome = s.apply_order_update(&order_update("o-1", OrderStatus::PartiallyFilled, dec!(4)));
        assert_eq!(outcome, OrderEventOutcome::Updated);

        let orders = s.active_orders();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].cum_filled_qty, Qty::new(dec!(4)));
        assert_eq!(orders[0].status, OrderStatus::PartiallyFilled);
    }

    #[test]
    fn test_terminal_status_removes_order() {
        let s = store();
        tracked_order(&s, "o-1", Side::Buy);

        let outcome = s.apply_order_update(&order_update("o-1", OrderStatus::Filled, dec!(10)));
        assert_eq!(outcome, OrderEventOutcome::Closed);
        assert_eq!(s.active_order_count(), 0);

        for status in [OrderStatus::Cancelled, OrderStatus::Rejected, OrderStatus::Expired] {
            tracked_order(&s, "o-2", Side::Sell);
            s.apply_order_update(&order_update("o-2", status, dec!(0)));
            assert_eq!(s.active_order_count(), 0);
        }
    }

    #[test]
    fn test_unknown_active_order_adopted() {
        let s = store();
        let outcome = s.apply_order_update(&order_update("ghost", OrderStatus::PartiallyFilled, dec!(2)));
        assert_eq!(outcome, OrderEventOutcome::Adopted);

        let orders = s.active_orders();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].order_id, "ghost");
        assert_eq!(orders[0].cum_filled_qty, Qty::new(dec!(2)));
    }

    #[test]
    fn test_unknown_terminal_order_not_tracked() {
        let s = store();
        let outcome = s.apply_order_update(&order_update("ghost", OrderStatus::Filled, dec!(10)));
        assert_eq!(outcome, OrderEventOutcome::AdoptedClosed);
        assert_eq!(s.active_order_count(), 0);
    }

    #[test]
    fn test_execution_updates_metrics() {
        let s = store();
        let fill = s
            .apply_execution(&execution("t-1", Side::Buy, dec!(10), dec!(100)))
            .unwrap();
        assert_eq!(fill.realized_pnl_impact, dec!(0));
        assert_eq!(fill.liquidity_role, LiquidityRole::Maker);

        let view = s.account_view();
        assert_eq!(view.metrics.current_holdings, dec!(10));
        assert_eq!(view.metrics.average_entry_price, Price::new(dec!(100)));
        assert_eq!(view.metrics.total_fees, dec!(0.1));
    }

    #[test]
    fn test_duplicate_execution_is_noop() {
        let s = store();
        s.apply_execution(&execution("t-1", Side::Buy, dec!(10), dec!(100)))
            .unwrap();
        // Same trade ID again: dropped, PnL and fees unchanged.
        assert!(s
            .apply_execution(&execution("t-1", Side::Buy, dec!(10), dec!(100)))
            .is_none());

        let view = s.account_view();
        assert_eq!(view.metrics.current_holdings, dec!(10));
        assert_eq!(view.metrics.total_trades, 1);
        assert_eq!(view.metrics.total_fees, dec!(0.1));
    }

    #[test]
    fn test_sell_execution_realizes_pnl() {
        let s = store();
        s.apply_execution(&execution("t-1", Side::Buy, dec!(10), dec!(100)));
        let fill = s
            .apply_execution(&execution("t-2", Side::Sell, dec!(4), dec!(110)))
            .unwrap();

        assert_eq!(fill.realized_pnl_impact, dec!(40));
        let view = s.account_view();
        assert_eq!(view.metrics.current_holdings, dec!(6));
        assert_eq!(view.metrics.average_entry_price, Price::new(dec!(100)));
    }

    #[test]
    fn test_invalid_execution_skipped() {
        let s = store();
        assert!(s
            .apply_execution(&execution("t-1", Side::Buy, dec!(0), dec!(100)))
            .is_none());
        // The bad event did not consume the trade ID.
        assert!(s
            .apply_execution(&execution("t-1", Side::Buy, dec!(1), dec!(100)))
            .is_some());
    }

    #[test]
    fn test_position_and_wallet_updates() {
        let s = store();
        s.apply_position_update(&PositionUpdate {
            symbol: "BTCUSDT".to_string(),
            side: "Sell".to_string(),
            size: dec!(0.5),
            avg_price: dec!(50000),
            unrealised_pnl: dec!(-3),
        });
        s.apply_wallet_update(&WalletUpdate {
            coin: "USDT".to_string(),
            wallet_balance: dec!(9000),
            available_balance: dec!(8500),
        });

        let view = s.account_view();
        assert_eq!(view.position_qty, dec!(-0.5));
        assert_eq!(view.venue_unrealized_pnl, dec!(-3));
        assert_eq!(view.balance, dec!(9000));
        assert_eq!(view.available_balance, dec!(8500));
    }
}

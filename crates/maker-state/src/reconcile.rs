//! Startup reconciliation against the venue's open-order list.
//!
//! The exchange is authoritative: local-only orders are assumed settled
//! while we were away and dropped; exchange-only orders are adopted;
//! orders present on both sides take the exchange's status and
//! cumulative fill on any mismatch.

use crate::store::StateStore;
use chrono::Utc;
use maker_core::{ClientOrderId, Order, OrderType, Price, Qty};
use maker_gateway::OpenOrder;
use std::collections::hash_map::Entry;
use tracing::{info, warn};

/// What reconciliation changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Local order IDs dropped because the exchange no longer lists them.
    pub dropped: Vec<String>,
    /// Exchange order IDs adopted into local state.
    pub adopted: Vec<String>,
    /// Order IDs whose status or fill was overwritten from the exchange.
    pub updated: Vec<String>,
}

impl ReconcileReport {
    pub fn is_clean(&self) -> bool {
        self.dropped.is_empty() && self.adopted.is_empty() && self.updated.is_empty()
    }
}

impl StateStore {
    /// Reconcile local active orders with the exchange's view.
    pub fn reconcile_with(&self, exchange_orders: &[OpenOrder]) -> ReconcileReport {
        let mut report = ReconcileReport::default();
        let mut orders = self.orders.lock();

        let exchange_ids: std::collections::HashSet<&str> = exchange_orders
            .iter()
            .map(|o| o.order_id.as_str())
            .collect();

        // Local-only orders were settled or cancelled while disconnected.
        let local_only: Vec<String> = orders
            .active
            .keys()
            .filter(|id| !exchange_ids.contains(id.as_str()))
            .cloned()
            .collect();
        for order_id in local_only {
            warn!(%order_id, "Local order not on the exchange, dropping");
            orders.active.remove(&order_id);
            report.dropped.push(order_id);
        }

        for remote in exchange_orders {
            if remote.order_status.is_terminal() {
                continue;
            }
            match orders.active.entry(remote.order_id.clone()) {
                Entry::Occupied(mut entry) => {
                    let local = entry.get_mut();
                    let status_differs = local.status != remote.order_status;
                    let fill_differs = local.cum_filled_qty.inner() != remote.cum_exec_qty;
                    if status_differs || fill_differs {
                        info!(
                            order_id = %remote.order_id,
                            local_status = %local.status,
                            remote_status = %remote.order_status,
                            "Overwriting local order from exchange"
                        );
                        local.status = remote.order_status;
                        local.cum_filled_qty = Qty::new(remote.cum_exec_qty.min(remote.qty));
                        report.updated.push(remote.order_id.clone());
                    }
                }
                Entry::Vacant(entry) => {
                    warn!(order_id = %remote.order_id, "Adopting exchange order missing locally");
                    entry.insert(order_from_open(remote));
                    report.adopted.push(remote.order_id.clone());
                }
            }
        }

        info!(
            dropped = report.dropped.len(),
            adopted = report.adopted.len(),
            updated = report.updated.len(),
            active = orders.active.len(),
            "Reconciliation complete"
        );
        report
    }
}

fn order_from_open(remote: &OpenOrder) -> Order {
    Order {
        order_id: remote.order_id.clone(),
        client_order_id: ClientOrderId::from_string(remote.client_order_id.clone()),
        symbol: remote.symbol.clone(),
        side: remote.side,
        order_type: if remote.order_type == "Market" {
            OrderType::Market
        } else {
            OrderType::Limit
        },
        price: Price::new(remote.price),
        qty: Qty::new(remote.qty),
        cum_filled_qty: Qty::new(remote.cum_exec_qty),
        status: remote.order_status,
        reduce_only: remote.reduce_only,
        created_at: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::StateStoreConfig;
    use maker_core::{OrderStatus, Side};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn store_with_local(order_ids: &[&str]) -> StateStore {
        let s = StateStore::new(StateStoreConfig::default());
        for id in order_ids {
            s.insert_order(Order {
                order_id: id.to_string(),
                client_order_id: ClientOrderId::new(Side::Buy),
                symbol: "BTCUSDT".to_string(),
                side: Side::Buy,
                order_type: OrderType::Limit,
                price: Price::new(dec!(100)),
                qty: Qty::new(dec!(10)),
                cum_filled_qty: Qty::ZERO,
                status: OrderStatus::New,
                reduce_only: false,
                created_at: Utc::now(),
            });
        }
        s
    }

    fn open_order(order_id: &str, status: OrderStatus, cum: Decimal) -> OpenOrder {
        serde_json::from_value(serde_json::json!({
            "orderId": order_id,
            "orderLinkId": format!("cl_{order_id}"),
            "symbol": "BTCUSDT",
            "side": "Sell",
            "orderType": "Limit",
            "price": "101",
            "qty": "10",
            "cumExecQty": cum.to_string(),
            "orderStatus": status.to_string(),
            "reduceOnly": false
        }))
        .unwrap()
    }

    #[test]
    fn test_local_only_order_dropped() {
        // Local has X, exchange omits it: X must disappear.
        let s = store_with_local(&["x"]);
        let report = s.reconcile_with(&[]);

        assert_eq!(report.dropped, vec!["x".to_string()]);
        assert_eq!(s.active_order_count(), 0);
    }

    #[test]
    fn test_exchange_only_order_adopted() {
        let s = store_with_local(&[]);
        let report = s.reconcile_with(&[open_order("y", OrderStatus::New, dec!(0))]);

        assert_eq!(report.adopted, vec!["y".to_string()]);
        let orders = s.active_orders();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].side, Side::Sell);
        assert_eq!(orders[0].price, Price::new(dec!(101)));
    }

    #[test]
    fn test_exchange_overwrites_on_mismatch() {
        let s = store_with_local(&["z"]);
        let report =
            s.reconcile_with(&[open_order("z", OrderStatus::PartiallyFilled, dec!(3))]);

        assert_eq!(report.updated, vec!["z".to_string()]);
        let orders = s.active_orders();
        assert_eq!(orders[0].status, OrderStatus::PartiallyFilled);
        assert_eq!(orders[0].cum_filled_qty, Qty::new(dec!(3)));
    }

    #[test]
    fn test_matching_orders_untouched() {
        let s = store_with_local(&["a"]);
        let report = s.reconcile_with(&[open_order("a", OrderStatus::New, dec!(0))]);
        assert!(report.is_clean());
        assert_eq!(s.active_order_count(), 1);
    }

    #[test]
    fn test_terminal_exchange_entries_ignored() {
        let s = store_with_local(&[]);
        let report = s.reconcile_with(&[open_order("done", OrderStatus::Filled, dec!(10))]);
        assert!(report.adopted.is_empty());
        assert_eq!(s.active_order_count(), 0);
    }
}

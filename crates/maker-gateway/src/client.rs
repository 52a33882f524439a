//! Typed exchange client.
//!
//! Wraps the raw transport with the retry policy and translates venue
//! payloads into domain types. Cancel calls additionally respect a
//! minimum inter-call spacing to stay under the venue's cancellation
//! rate limit.

use crate::envelope::{
    Envelope, InstrumentInfo, ListResult, OpenOrder, OrderRequest, PlacedOrder, PositionInfo,
    WalletAccount, WalletBalance,
};
use crate::error::{codes, GatewayError, GatewayResult};
use crate::retry::RetryPolicy;
use crate::transport::{RestOp, RestTransport};
use maker_core::{MarketInfo, Price, Qty};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Typed REST client over a pluggable transport.
pub struct ExchangeClient<T: RestTransport> {
    transport: T,
    category: String,
    retry: RetryPolicy,
    /// Minimum spacing between single-order cancel calls.
    cancel_spacing: Duration,
    last_cancel: Mutex<Option<Instant>>,
}

impl<T: RestTransport> ExchangeClient<T> {
    pub fn new(
        transport: T,
        category: impl Into<String>,
        retry: RetryPolicy,
        cancel_spacing: Duration,
    ) -> Self {
        Self {
            transport,
            category: category.into(),
            retry,
            cancel_spacing,
            last_cancel: Mutex::new(None),
        }
    }

    async fn call(&self, op: RestOp, op_name: &str, params: Value) -> GatewayResult<Value> {
        let transport = &self.transport;
        self.retry
            .run(op_name, move || {
                let params = params.clone();
                async move { transport.send(op, params).await?.into_result() }
            })
            .await
    }

    /// Fetch instrument precision and fee metadata for a symbol.
    pub async fn instrument_info(&self, symbol: &str) -> GatewayResult<MarketInfo> {
        let params = json!({"category": self.category, "symbol": symbol});
        let result = self
            .call(RestOp::InstrumentsInfo, "instruments_info", params)
            .await?;

        let list: ListResult<InstrumentInfo> = serde_json::from_value(result)
            .map_err(|e| GatewayError::Network(format!("instrument info parse: {e}")))?;
        let info = list.list.into_iter().next().ok_or_else(|| {
            GatewayError::UnknownApi {
                code: -1,
                msg: format!("no instrument info for {symbol}"),
            }
        })?;

        Ok(MarketInfo {
            symbol: info.symbol,
            price_tick: Price::new(info.price_filter.tick_size),
            qty_step: Qty::new(info.lot_size_filter.qty_step),
            min_order_qty: Qty::new(info.lot_size_filter.min_order_qty),
            min_notional: info.lot_size_filter.min_notional_value,
            maker_fee_rate: info.maker_fee_rate.unwrap_or_else(default_maker_fee),
            taker_fee_rate: info.taker_fee_rate.unwrap_or_else(default_taker_fee),
        })
    }

    /// Fetch the wallet balance of one coin.
    pub async fn wallet_balance(&self, coin: &str) -> GatewayResult<WalletBalance> {
        let params = json!({"accountType": "UNIFIED", "coin": coin});
        let result = self
            .call(RestOp::WalletBalance, "wallet_balance", params)
            .await?;

        let list: ListResult<WalletAccount> = serde_json::from_value(result)
            .map_err(|e| GatewayError::Network(format!("wallet balance parse: {e}")))?;
        list.list
            .into_iter()
            .flat_map(|account| account.coin)
            .find(|balance| balance.coin == coin)
            .ok_or_else(|| GatewayError::UnknownApi {
                code: -1,
                msg: format!("no balance entry for {coin}"),
            })
    }

    /// Fetch the current position for a symbol, if any.
    pub async fn position(&self, symbol: &str) -> GatewayResult<Option<PositionInfo>> {
        let params = json!({"category": self.category, "symbol": symbol});
        let result = self.call(RestOp::PositionList, "position_list", params).await?;

        let list: ListResult<PositionInfo> = serde_json::from_value(result)
            .map_err(|e| GatewayError::Network(format!("position parse: {e}")))?;
        Ok(list
            .list
            .into_iter()
            .find(|p| p.symbol == symbol && !p.size.is_zero()))
    }

    /// Set leverage for a symbol. The venue's "leverage not modified"
    /// response is treated as success.
    pub async fn set_leverage(&self, symbol: &str, leverage: u32) -> GatewayResult<()> {
        let leverage = leverage.to_string();
        let params = json!({
            "category": self.category,
            "symbol": symbol,
            "buyLeverage": leverage,
            "sellLeverage": leverage,
        });

        match self.call(RestOp::SetLeverage, "set_leverage", params).await {
            Ok(_) => Ok(()),
            Err(GatewayError::UnknownApi { code, .. }) if code == codes::LEVERAGE_NOT_MODIFIED => {
                info!(symbol, "Leverage already set");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Fetch the venue's current open-order list for a symbol.
    pub async fn open_orders(&self, symbol: &str) -> GatewayResult<Vec<OpenOrder>> {
        let params = json!({"category": self.category, "symbol": symbol, "limit": 50});
        let result = self.call(RestOp::OpenOrders, "open_orders", params).await?;

        let list: ListResult<OpenOrder> = serde_json::from_value(result)
            .map_err(|e| GatewayError::Network(format!("open orders parse: {e}")))?;
        Ok(list.list)
    }

    /// Place an order. Returns the exchange-assigned ID.
    pub async fn place_order(&self, request: &OrderRequest) -> GatewayResult<PlacedOrder> {
        let params = serde_json::to_value(request)
            .map_err(|e| GatewayError::Parameter {
                code: -1,
                msg: format!("order request serialization: {e}"),
            })?;
        let result = self.call(RestOp::PlaceOrder, "place_order", params).await?;

        serde_json::from_value(result)
            .map_err(|e| GatewayError::Network(format!("place order parse: {e}")))
    }

    /// Cancel a single order.
    ///
    /// Returns `Ok(false)` when the venue reports the order as already
    /// gone — the caller should drop it from local state.
    pub async fn cancel_order(&self, symbol: &str, order_id: &str) -> GatewayResult<bool> {
        self.respect_cancel_spacing().await;

        let params = json!({
            "category": self.category,
            "symbol": symbol,
            "orderId": order_id,
        });
        let outcome = self.call(RestOp::CancelOrder, "cancel_order", params).await;
        *self.last_cancel.lock() = Some(Instant::now());

        match outcome {
            Ok(_) => Ok(true),
            Err(GatewayError::OrderNotFound { .. }) => {
                warn!(order_id, "Cancel target already gone from the venue");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// Cancel all open orders for a symbol.
    pub async fn cancel_all(&self, symbol: &str) -> GatewayResult<()> {
        let params = json!({"category": self.category, "symbol": symbol});
        self.call(RestOp::CancelAll, "cancel_all", params).await?;
        Ok(())
    }

    /// Sleep out the remainder of the cancel spacing window, if the last
    /// cancel was too recent.
    async fn respect_cancel_spacing(&self) {
        let wait = {
            let last = self.last_cancel.lock();
            last.and_then(|t| self.cancel_spacing.checked_sub(t.elapsed()))
        };
        if let Some(delta) = wait {
            if !delta.is_zero() {
                tokio::time::sleep(delta).await;
            }
        }
    }
}

fn default_maker_fee() -> Decimal {
    // Venue default when the instrument payload omits fee rates.
    Decimal::new(2, 4) // 0.0002
}

fn default_taker_fee() -> Decimal {
    Decimal::new(55, 5) // 0.00055
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockRestTransport;
    use maker_core::{Side, TimeInForce};
    use serde_json::json;

    fn client(transport: MockRestTransport) -> ExchangeClient<MockRestTransport> {
        ExchangeClient::new(
            transport,
            "linear",
            RetryPolicy::new(3, Duration::from_millis(1), Duration::from_millis(5)),
            Duration::from_millis(0),
        )
    }

    fn instrument_envelope() -> Envelope {
        Envelope::ok(json!({
            "list": [{
                "symbol": "BTCUSDT",
                "priceFilter": {"tickSize": "0.1"},
                "lotSizeFilter": {
                    "qtyStep": "0.001",
                    "minOrderQty": "0.001",
                    "minNotionalValue": "5"
                }
            }]
        }))
    }

    #[tokio::test]
    async fn test_instrument_info_maps_to_market_info() {
        let mut transport = MockRestTransport::new();
        transport
            .expect_send()
            .withf(|op, _| *op == RestOp::InstrumentsInfo)
            .times(1)
            .returning(|_, _| Ok(instrument_envelope()));

        let info = client(transport).instrument_info("BTCUSDT").await.unwrap();
        assert_eq!(info.symbol, "BTCUSDT");
        assert_eq!(info.price_tick.inner().to_string(), "0.1");
        assert_eq!(info.min_notional.to_string(), "5");
        // Fee defaults applied when the payload omits them.
        assert!(info.maker_fee_rate > Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_place_order_retries_rate_limit() {
        // Scenario: rate-limited twice, then accepted.
        let mut transport = MockRestTransport::new();
        let mut call = 0u32;
        transport.expect_send().times(3).returning(move |_, _| {
            call += 1;
            if call < 3 {
                Ok(Envelope::err(codes::RATE_LIMIT, "throttled"))
            } else {
                Ok(Envelope::ok(json!({"orderId": "o-9", "orderLinkId": "mm_b_1"})))
            }
        });

        let request = OrderRequest {
            category: "linear".to_string(),
            symbol: "BTCUSDT".to_string(),
            side: Side::Buy,
            order_type: "Limit".to_string(),
            qty: Qty::new("0.01".parse().unwrap()),
            price: Price::new("50000".parse().unwrap()),
            time_in_force: TimeInForce::PostOnly,
            client_order_id: "mm_b_1".to_string(),
            reduce_only: false,
        };

        let placed = client(transport).place_order(&request).await.unwrap();
        assert_eq!(placed.order_id, "o-9");
    }

    #[tokio::test]
    async fn test_place_order_insufficient_balance_not_retried() {
        let mut transport = MockRestTransport::new();
        transport
            .expect_send()
            .times(1)
            .returning(|_, _| Ok(Envelope::err(codes::INSUFFICIENT_BALANCE, "no funds")));

        let request = OrderRequest {
            category: "linear".to_string(),
            symbol: "BTCUSDT".to_string(),
            side: Side::Buy,
            order_type: "Limit".to_string(),
            qty: Qty::new("1".parse().unwrap()),
            price: Price::new("50000".parse().unwrap()),
            time_in_force: TimeInForce::PostOnly,
            client_order_id: "mm_b_2".to_string(),
            reduce_only: false,
        };

        let result = client(transport).place_order(&request).await;
        assert!(matches!(
            result,
            Err(GatewayError::InsufficientBalance { .. })
        ));
    }

    #[tokio::test]
    async fn test_cancel_unknown_order_is_false_not_error() {
        let mut transport = MockRestTransport::new();
        transport
            .expect_send()
            .times(1)
            .returning(|_, _| Ok(Envelope::err(codes::ORDER_NOT_FOUND, "order not exists")));

        let cancelled = client(transport).cancel_order("BTCUSDT", "o-1").await.unwrap();
        assert!(!cancelled);
    }

    #[tokio::test]
    async fn test_cancel_spacing_enforced() {
        let mut transport = MockRestTransport::new();
        transport
            .expect_send()
            .times(2)
            .returning(|_, _| Ok(Envelope::ok(json!({"orderId": "x"}))));

        let client = ExchangeClient::new(
            transport,
            "linear",
            RetryPolicy::new(1, Duration::from_millis(1), Duration::from_millis(5)),
            Duration::from_millis(50),
        );

        let start = Instant::now();
        client.cancel_order("BTCUSDT", "o-1").await.unwrap();
        client.cancel_order("BTCUSDT", "o-2").await.unwrap();
        // The second cancel waited out the spacing window.
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_set_leverage_not_modified_is_ok() {
        let mut transport = MockRestTransport::new();
        transport
            .expect_send()
            .times(1)
            .returning(|_, _| Ok(Envelope::err(codes::LEVERAGE_NOT_MODIFIED, "not modified")));

        client(transport).set_leverage("BTCUSDT", 5).await.unwrap();
    }

    #[tokio::test]
    async fn test_wallet_balance_finds_coin() {
        let mut transport = MockRestTransport::new();
        transport.expect_send().times(1).returning(|_, _| {
            Ok(Envelope::ok(json!({
                "list": [{"coin": [
                    {"coin": "BTC", "walletBalance": "0.5"},
                    {"coin": "USDT", "walletBalance": "10000", "availableBalance": "9500"}
                ]}]
            })))
        });

        let balance = client(transport).wallet_balance("USDT").await.unwrap();
        assert_eq!(balance.wallet_balance.to_string(), "10000");
        assert_eq!(balance.available_balance.to_string(), "9500");
    }
}

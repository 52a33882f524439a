//! Streaming event model.
//!
//! Raw WebSocket messages are forwarded into the engine's queues as
//! text; the engine parses them on its own thread with the functions
//! here. Public and private streams have distinct event types so the two
//! queues cannot be cross-wired.

use crate::error::{GatewayError, GatewayResult};
use maker_core::{OrderStatus, Side};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;

/// Public market-data events.
#[derive(Debug, Clone, PartialEq)]
pub enum MarketEvent {
    /// Top-of-book snapshot or delta; only the best levels are used.
    Orderbook {
        bids: Vec<(Decimal, Decimal)>,
        asks: Vec<(Decimal, Decimal)>,
    },
}

impl MarketEvent {
    /// Best bid price, if the bid side is non-empty.
    pub fn best_bid(&self) -> Option<Decimal> {
        match self {
            Self::Orderbook { bids, .. } => bids.first().map(|(p, _)| *p),
        }
    }

    /// Best ask price, if the ask side is non-empty.
    pub fn best_ask(&self) -> Option<Decimal> {
        match self {
            Self::Orderbook { asks, .. } => asks.first().map(|(p, _)| *p),
        }
    }
}

/// Private order event payload.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderUpdate {
    pub order_id: String,
    #[serde(rename = "orderLinkId", default)]
    pub client_order_id: String,
    pub symbol: String,
    pub side: Side,
    #[serde(default)]
    pub order_type: String,
    pub price: Decimal,
    pub qty: Decimal,
    #[serde(default)]
    pub cum_exec_qty: Decimal,
    pub order_status: OrderStatus,
    #[serde(default)]
    pub reduce_only: bool,
}

/// Private execution (fill) payload.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionUpdate {
    pub order_id: String,
    pub exec_id: String,
    pub symbol: String,
    pub side: Side,
    pub exec_price: Decimal,
    pub exec_qty: Decimal,
    #[serde(default)]
    pub exec_fee: Decimal,
    #[serde(default)]
    pub fee_currency: String,
    /// True when the fill added liquidity.
    #[serde(default)]
    pub is_maker: bool,
}

/// Private position payload.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionUpdate {
    pub symbol: String,
    pub side: String,
    pub size: Decimal,
    #[serde(default)]
    pub avg_price: Decimal,
    #[serde(default)]
    pub unrealised_pnl: Decimal,
}

impl PositionUpdate {
    /// Signed position quantity (positive long, negative short).
    pub fn signed_qty(&self) -> Decimal {
        if self.side == "Sell" {
            -self.size
        } else {
            self.size
        }
    }
}

/// Private wallet payload.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletUpdate {
    pub coin: String,
    pub wallet_balance: Decimal,
    #[serde(default)]
    pub available_balance: Decimal,
}

/// Private account events, one per stream topic.
#[derive(Debug, Clone, PartialEq)]
pub enum AccountEvent {
    Orders(Vec<OrderUpdate>),
    Executions(Vec<ExecutionUpdate>),
    Positions(Vec<PositionUpdate>),
    Wallet(Vec<WalletUpdate>),
}

#[derive(Debug, Deserialize)]
struct TopicMessage {
    topic: String,
    #[serde(default)]
    data: Value,
}

#[derive(Debug, Deserialize)]
struct OrderbookData {
    #[serde(rename = "b", default)]
    bids: Vec<(Decimal, Decimal)>,
    #[serde(rename = "a", default)]
    asks: Vec<(Decimal, Decimal)>,
}

/// Parse one public-stream message. Non-data messages (subscription
/// acks, pongs) return `Ok(None)`.
pub fn parse_market_message(text: &str) -> GatewayResult<Option<MarketEvent>> {
    let Ok(msg) = serde_json::from_str::<TopicMessage>(text) else {
        return Ok(None);
    };

    if msg.topic.starts_with("orderbook.") {
        let data: OrderbookData = serde_json::from_value(msg.data)
            .map_err(|e| GatewayError::WebSocket(format!("orderbook parse: {e}")))?;
        return Ok(Some(MarketEvent::Orderbook {
            bids: data.bids,
            asks: data.asks,
        }));
    }

    Ok(None)
}

/// Parse one private-stream message. Non-data messages return `Ok(None)`.
pub fn parse_account_message(text: &str) -> GatewayResult<Option<AccountEvent>> {
    let Ok(msg) = serde_json::from_str::<TopicMessage>(text) else {
        return Ok(None);
    };

    let event = match msg.topic.as_str() {
        "order" => AccountEvent::Orders(parse_list(msg.data, "order")?),
        "execution" => AccountEvent::Executions(parse_list(msg.data, "execution")?),
        "position" => AccountEvent::Positions(parse_list(msg.data, "position")?),
        "wallet" => AccountEvent::Wallet(parse_wallet(msg.data)?),
        _ => return Ok(None),
    };

    Ok(Some(event))
}

fn parse_list<E: serde::de::DeserializeOwned>(data: Value, topic: &str) -> GatewayResult<Vec<E>> {
    serde_json::from_value(data)
        .map_err(|e| GatewayError::WebSocket(format!("{topic} parse: {e}")))
}

fn parse_wallet(data: Value) -> GatewayResult<Vec<WalletUpdate>> {
    // Wallet events nest per-coin entries inside account objects.
    #[derive(Deserialize)]
    struct WalletAccountData {
        #[serde(default)]
        coin: Vec<WalletUpdate>,
    }

    let accounts: Vec<WalletAccountData> = serde_json::from_value(data)
        .map_err(|e| GatewayError::WebSocket(format!("wallet parse: {e}")))?;
    Ok(accounts.into_iter().flat_map(|a| a.coin).collect())
}

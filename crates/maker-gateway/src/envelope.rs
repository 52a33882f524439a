//! REST request and response models.
//!
//! Every call returns an [`Envelope`]; `ret_code == 0` unwraps the
//! result payload, any other code is classified into the error taxonomy.

use crate::error::{GatewayError, GatewayResult};
use maker_core::{Price, Qty, Side, TimeInForce};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Raw response envelope shared by all REST operations.
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope {
    #[serde(rename = "retCode")]
    pub ret_code: i64,
    #[serde(rename = "retMsg", default)]
    pub ret_msg: String,
    #[serde(default)]
    pub result: Value,
}

impl Envelope {
    /// Unwrap the payload or classify the error code.
    pub fn into_result(self) -> GatewayResult<Value> {
        if self.ret_code == 0 {
            Ok(self.result)
        } else {
            Err(GatewayError::classify(self.ret_code, &self.ret_msg))
        }
    }

    /// Build a success envelope. Test helper.
    pub fn ok(result: Value) -> Self {
        Self {
            ret_code: 0,
            ret_msg: "OK".to_string(),
            result,
        }
    }

    /// Build an error envelope. Test helper.
    pub fn err(ret_code: i64, ret_msg: impl Into<String>) -> Self {
        Self {
            ret_code,
            ret_msg: ret_msg.into(),
            result: Value::Null,
        }
    }
}

/// Order placement request.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderRequest {
    pub category: String,
    pub symbol: String,
    pub side: Side,
    pub order_type: String,
    pub qty: Qty,
    pub price: Price,
    pub time_in_force: TimeInForce,
    #[serde(rename = "orderLinkId")]
    pub client_order_id: String,
    pub reduce_only: bool,
}

/// Instrument metadata as returned by the venue.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstrumentInfo {
    pub symbol: String,
    pub price_filter: PriceFilter,
    pub lot_size_filter: LotSizeFilter,
    #[serde(default)]
    pub maker_fee_rate: Option<Decimal>,
    #[serde(default)]
    pub taker_fee_rate: Option<Decimal>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceFilter {
    pub tick_size: Decimal,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LotSizeFilter {
    pub qty_step: Decimal,
    pub min_order_qty: Decimal,
    #[serde(default)]
    pub min_notional_value: Decimal,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListResult<T> {
    pub list: Vec<T>,
}

/// Wallet balance for one coin.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletBalance {
    pub coin: String,
    pub wallet_balance: Decimal,
    #[serde(default)]
    pub available_balance: Decimal,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WalletAccount {
    pub coin: Vec<WalletBalance>,
}

/// Position details for one symbol.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionInfo {
    pub symbol: String,
    pub side: String,
    pub size: Decimal,
    #[serde(default)]
    pub avg_price: Decimal,
    #[serde(default)]
    pub unrealised_pnl: Decimal,
}

impl PositionInfo {
    /// Signed position quantity (positive long, negative short).
    pub fn signed_qty(&self) -> Decimal {
        if self.side == "Sell" {
            -self.size
        } else {
            self.size
        }
    }
}

/// An open order as reported by the venue.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenOrder {
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
    pub order_status: maker_core::OrderStatus,
    #[serde(default)]
    pub reduce_only: bool,
}

/// Result of a successful order placement.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlacedOrder {
    pub order_id: String,
    #[serde(rename = "orderLinkId", default)]
    pub client_order_id: String,
}

//! Order model and lifecycle enums.
//!
//! Orders are created on successful placement, mutated only by
//! exchange-originated events, and removed from the active set once they
//! reach a terminal status.

use crate::{Price, Qty};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Order side: buy or sell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// Returns the opposite side.
    pub fn opposite(&self) -> Self {
        match self {
            Self::Buy => Self::Sell,
            Self::Sell => Self::Buy,
        }
    }

    /// Returns 1 for buy, -1 for sell (for position calculations).
    pub fn sign(&self) -> i8 {
        match self {
            Self::Buy => 1,
            Self::Sell => -1,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buy => write!(f, "Buy"),
            Self::Sell => write!(f, "Sell"),
        }
    }
}

/// Order type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum OrderType {
    /// Limit order (the only type the quoting loop submits).
    #[default]
    Limit,
    Market,
}

impl fmt::Display for OrderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Limit => write!(f, "Limit"),
            Self::Market => write!(f, "Market"),
        }
    }
}

/// Time-in-force for orders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TimeInForce {
    /// Good-til-cancelled.
    #[serde(rename = "GTC")]
    GoodTilCancelled,
    /// Post-only: rejected rather than filled immediately, guaranteeing
    /// maker status. Our primary TIF for quoting.
    #[default]
    PostOnly,
    /// Immediate-or-cancel.
    #[serde(rename = "IOC")]
    ImmediateOrCancel,
}

impl fmt::Display for TimeInForce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::GoodTilCancelled => write!(f, "GTC"),
            Self::PostOnly => write!(f, "PostOnly"),
            Self::ImmediateOrCancel => write!(f, "IOC"),
        }
    }
}

/// Exchange-reported order status.
///
/// Transitions are forward-only: once an order is terminal it never
/// returns to an active status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum OrderStatus {
    #[default]
    New,
    PartiallyFilled,
    Filled,
    Cancelled,
    Rejected,
    Deactivated,
    Expired,
}

impl OrderStatus {
    /// Returns true if the order has reached a terminal status.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Filled | Self::Cancelled | Self::Rejected | Self::Deactivated | Self::Expired
        )
    }

    /// Returns true if the order is still working on the book.
    #[must_use]
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::New => "New",
            Self::PartiallyFilled => "PartiallyFilled",
            Self::Filled => "Filled",
            Self::Cancelled => "Cancelled",
            Self::Rejected => "Rejected",
            Self::Deactivated => "Deactivated",
            Self::Expired => "Expired",
        };
        write!(f, "{s}")
    }
}

/// Client order ID for idempotency.
///
/// Every placement carries a unique ID so that a retried submission can
/// never create a duplicate order on the venue.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClientOrderId(String);

impl ClientOrderId {
    /// Create a new unique client order ID.
    ///
    /// Format: `mm_{b|s}_{timestamp_ms}_{uuid_short}`
    pub fn new(side: Side) -> Self {
        let ts = Utc::now().timestamp_millis();
        let uuid_short = &Uuid::new_v4().to_string()[..8];
        let tag = match side {
            Side::Buy => 'b',
            Side::Sell => 's',
        };
        Self(format!("mm_{tag}_{ts}_{uuid_short}"))
    }

    /// Create from an existing string (for parsing exchange responses).
    pub fn from_string(s: String) -> Self {
        Self(s)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientOrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ClientOrderId {
    fn from(s: String) -> Self {
        Self::from_string(s)
    }
}

impl AsRef<str> for ClientOrderId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A tracked order in the locally-owned mirror of the venue's book.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    /// Exchange-assigned order ID.
    pub order_id: String,
    /// Locally-generated idempotency key.
    pub client_order_id: ClientOrderId,
    pub symbol: String,
    pub side: Side,
    pub order_type: OrderType,
    pub price: Price,
    pub qty: Qty,
    /// Cumulative filled quantity. Never exceeds `qty`.
    pub cum_filled_qty: Qty,
    pub status: OrderStatus,
    pub reduce_only: bool,
    pub created_at: DateTime<Utc>,
}

impl Order {
    /// Remaining unfilled quantity.
    #[must_use]
    pub fn remaining_qty(&self) -> Qty {
        self.qty - self.cum_filled_qty
    }

    /// Returns true if the order has reached a terminal status.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Apply an exchange-reported status and cumulative fill update.
    ///
    /// Enforces the forward-only lifecycle: updates against a terminal
    /// order are rejected, and the cumulative fill is clamped to the order
    /// quantity so the `cum_filled_qty <= qty` invariant always holds.
    /// Returns true if the update was applied.
    pub fn apply_update(&mut self, status: OrderStatus, cum_filled_qty: Qty) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = status;
        self.cum_filled_qty = if cum_filled_qty > self.qty {
            self.qty
        } else if cum_filled_qty > self.cum_filled_qty {
            cum_filled_qty
        } else {
            // Fills never un-happen; keep the larger cumulative value.
            self.cum_filled_qty
        };
        true
    }
}

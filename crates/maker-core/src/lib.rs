//! Core domain types for the market-making engine.
//!
//! This crate provides the fundamental types used throughout the system:
//! - `Price`, `Qty`: precision-safe numeric types
//! - `Order`, `OrderStatus`, `Side`: order model and lifecycle enums
//! - `TradeFill`: immutable execution records
//! - `MarketInfo`: per-symbol precision and fee metadata
//! - `PositionMetrics`: cost-basis and PnL accounting

pub mod decimal;
pub mod error;
pub mod fill;
pub mod market;
pub mod order;
pub mod position;

pub use decimal::{Price, Qty};
pub use error::{CoreError, Result};
pub use fill::{LiquidityRole, TradeFill};
pub use market::MarketInfo;
pub use order::{ClientOrderId, Order, OrderStatus, OrderType, Side, TimeInForce};
pub use position::PositionMetrics;

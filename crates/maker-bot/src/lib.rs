//! Market-making engine.
//!
//! Wires the gateway, state store, risk governor, and persistence into
//! a single cooperative event loop around a pluggable quote strategy.

pub mod app;
pub mod config;
pub mod error;
pub mod logging;
pub mod strategy;

pub use app::Application;
pub use config::{AppConfig, TradingMode};
pub use error::{AppError, AppResult};
pub use strategy::{FixedSpreadQuoter, MarketView, QuoteStrategy, TargetQuotes};

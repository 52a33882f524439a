//! Application error types.

use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    /// Startup-fatal: instrument metadata could not be fetched.
    #[error("Market info error: {0}")]
    MarketInfo(String),

    /// Startup-fatal: initial balance/position/state could not be
    /// established.
    #[error("Initial state error: {0}")]
    InitialState(String),

    #[error("Gateway error: {0}")]
    Gateway(#[from] maker_gateway::GatewayError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] maker_persistence::PersistenceError),

    /// An event stream closed after exhausting its reconnect budget.
    #[error("Stream closed: {0}")]
    StreamClosed(String),

    /// The daily-loss breaker tripped; the engine is halted for the
    /// remainder of the run.
    #[error("Daily loss limit breached: {loss_pct}")]
    DailyLossHalt { loss_pct: Decimal },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type AppResult<T> = Result<T, AppError>;

//! Gateway error taxonomy.
//!
//! Every REST response code is classified into one of these variants.
//! The classification decides retry behavior: transient classes are
//! recovered inside the retry policy and never surface to callers,
//! fatal classes propagate immediately.

use thiserror::Error;

/// Venue response codes that map onto fatal classifications.
///
/// Codes follow the venue's unified v5 numbering.
pub mod codes {
    /// Authentication / permission failure.
    pub const AUTH_FAILED: i64 = 10004;
    /// Request parameter errors.
    pub const PARAM_ERROR: i64 = 10001;
    pub const REQUEST_INVALID: i64 = 10002;
    /// Rate limiting.
    pub const RATE_LIMIT: i64 = 10006;
    pub const RATE_LIMIT_IP: i64 = 10016;
    pub const RATE_LIMIT_API: i64 = 10018;
    /// The referenced order no longer exists on the venue.
    pub const ORDER_NOT_FOUND: i64 = 110001;
    /// Balance too low for the requested order.
    pub const INSUFFICIENT_BALANCE: i64 = 110004;
    pub const INSUFFICIENT_AVAILABLE: i64 = 110007;
    /// Leverage already at the requested value; not an error.
    pub const LEVERAGE_NOT_MODIFIED: i64 = 110043;
}

/// Classified gateway errors.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Credentials or permissions are wrong. Fatal: stop the engine.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Venue-side throttling. Retryable with backoff.
    #[error("rate limited (code {code}): {msg}")]
    RateLimit { code: i64, msg: String },

    /// Not enough balance for this specific order. Fatal to the call
    /// only; the engine logs and skips the attempt.
    #[error("insufficient balance (code {code}): {msg}")]
    InsufficientBalance { code: i64, msg: String },

    /// Malformed request. Indicates a bug in request construction; never
    /// retried.
    #[error("parameter error (code {code}): {msg}")]
    Parameter { code: i64, msg: String },

    /// Cancel target is already gone from the venue's book.
    #[error("order not found (code {code}): {msg}")]
    OrderNotFound { code: i64, msg: String },

    /// Transport failure or timeout. Retryable.
    #[error("network error: {0}")]
    Network(String),

    /// Unmapped venue code. Retryable by default.
    #[error("api error (code {code}): {msg}")]
    UnknownApi { code: i64, msg: String },

    /// Streaming connection failure.
    #[error("websocket error: {0}")]
    WebSocket(String),
}

impl GatewayError {
    /// Classify a non-zero venue response code.
    pub fn classify(code: i64, msg: &str) -> Self {
        use codes::*;
        match code {
            AUTH_FAILED => Self::Auth(msg.to_string()),
            RATE_LIMIT | RATE_LIMIT_IP | RATE_LIMIT_API => Self::RateLimit {
                code,
                msg: msg.to_string(),
            },
            INSUFFICIENT_BALANCE | INSUFFICIENT_AVAILABLE => Self::InsufficientBalance {
                code,
                msg: msg.to_string(),
            },
            PARAM_ERROR | REQUEST_INVALID => Self::Parameter {
                code,
                msg: msg.to_string(),
            },
            ORDER_NOT_FOUND => Self::OrderNotFound {
                code,
                msg: msg.to_string(),
            },
            _ => Self::UnknownApi {
                code,
                msg: msg.to_string(),
            },
        }
    }

    /// Whether the retry policy may re-issue the call.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Network(_) | Self::RateLimit { .. } | Self::UnknownApi { .. }
        )
    }
}

/// Result type alias for gateway operations.
pub type GatewayResult<T> = Result<T, GatewayError>;

//! Exchange gateway.
//!
//! Owns everything that talks to the venue:
//! - typed REST operations over a mockable transport
//! - the error taxonomy and its retry classification
//! - an explicit retry policy composed around each call
//! - the streaming feed with heartbeat monitoring and bounded reconnect

pub mod client;
pub mod envelope;
pub mod error;
pub mod retry;
pub mod stream;
pub mod transport;
pub mod ws;

pub use client::ExchangeClient;
pub use envelope::{
    Envelope, InstrumentInfo, OpenOrder, OrderRequest, PlacedOrder, PositionInfo, WalletBalance,
};
pub use error::{GatewayError, GatewayResult};
pub use retry::RetryPolicy;
pub use stream::{
    AccountEvent, ExecutionUpdate, MarketEvent, OrderUpdate, PositionUpdate, WalletUpdate,
};
pub use transport::{HttpTransport, RestOp, RestTransport};
pub use ws::{WsFeed, WsFeedConfig};

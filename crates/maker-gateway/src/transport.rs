//! REST transport seam.
//!
//! The typed client talks to the venue through [`RestTransport`] so the
//! retry and classification logic can be exercised against scripted
//! transports in tests.

use crate::envelope::Envelope;
use crate::error::{GatewayError, GatewayResult};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

/// Default timeout for REST requests. A timeout is classified as a
/// retryable network error.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// REST operations exposed by the venue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RestOp {
    InstrumentsInfo,
    WalletBalance,
    PositionList,
    SetLeverage,
    OpenOrders,
    PlaceOrder,
    CancelOrder,
    CancelAll,
}

impl RestOp {
    /// Endpoint path on the venue's unified API.
    pub fn path(&self) -> &'static str {
        match self {
            Self::InstrumentsInfo => "/v5/market/instruments-info",
            Self::WalletBalance => "/v5/account/wallet-balance",
            Self::PositionList => "/v5/position/list",
            Self::SetLeverage => "/v5/position/set-leverage",
            Self::OpenOrders => "/v5/order/realtime",
            Self::PlaceOrder => "/v5/order/create",
            Self::CancelOrder => "/v5/order/cancel",
            Self::CancelAll => "/v5/order/cancel-all",
        }
    }

    /// Query-style operations use GET; mutations POST a JSON body.
    pub fn is_query(&self) -> bool {
        matches!(
            self,
            Self::InstrumentsInfo | Self::WalletBalance | Self::PositionList | Self::OpenOrders
        )
    }
}

/// Abstract REST transport returning raw envelopes.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RestTransport: Send + Sync {
    async fn send(&self, op: RestOp, params: Value) -> GatewayResult<Envelope>;
}

/// Production transport over HTTP.
pub struct HttpTransport {
    client: Client,
    base_url: String,
}

impl HttpTransport {
    /// Create a transport against the venue base URL.
    ///
    /// `api_key` is attached to every request; request signing beyond the
    /// key header is delegated to the venue SDK layer and out of scope
    /// here.
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> GatewayResult<Self> {
        let api_key = api_key.into();
        let mut headers = reqwest::header::HeaderMap::new();
        if !api_key.is_empty() {
            let value = reqwest::header::HeaderValue::from_str(&api_key)
                .map_err(|e| GatewayError::Network(format!("invalid api key header: {e}")))?;
            headers.insert("X-BAPI-API-KEY", value);
        }

        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .default_headers(headers)
            .build()
            .map_err(|e| GatewayError::Network(format!("failed to build http client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }
}

#[async_trait]
impl RestTransport for HttpTransport {
    async fn send(&self, op: RestOp, params: Value) -> GatewayResult<Envelope> {
        let url = format!("{}{}", self.base_url, op.path());
        debug!(?op, %url, "REST request");

        let request = if op.is_query() {
            let query: Vec<(String, String)> = params
                .as_object()
                .map(|map| {
                    map.iter()
                        .map(|(k, v)| {
                            let value = match v {
                                Value::String(s) => s.clone(),
                                other => other.to_string(),
                            };
                            (k.clone(), value)
                        })
                        .collect()
                })
                .unwrap_or_default();
            self.client.get(&url).query(&query)
        } else {
            self.client.post(&url).json(&params)
        };

        let response = request.send().await.map_err(map_reqwest_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::Network(format!("HTTP {status}: {body}")));
        }

        response
            .json::<Envelope>()
            .await
            .map_err(|e| GatewayError::Network(format!("malformed response body: {e}")))
    }
}

fn map_reqwest_error(e: reqwest::Error) -> GatewayError {
    if e.is_timeout() {
        GatewayError::Network(format!("request timed out: {e}"))
    } else {
        GatewayError::Network(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_op_paths() {
        assert_eq!(RestOp::PlaceOrder.path(), "/v5/order/create");
        assert_eq!(RestOp::InstrumentsInfo.path(), "/v5/market/instruments-info");
    }

    #[test]
    fn test_query_vs_mutation() {
        assert!(RestOp::OpenOrders.is_query());
        assert!(RestOp::WalletBalance.is_query());
        assert!(!RestOp::PlaceOrder.is_query());
        assert!(!RestOp::CancelAll.is_query());
    }
}

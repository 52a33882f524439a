//! WebSocket feed with heartbeat monitoring and bounded reconnect.
//!
//! The feed task owns the socket. It never touches shared state:
//! received messages are forwarded as raw text into an `mpsc` channel
//! that the engine drains on its own thread. Consecutive connection
//! failures consume the reconnect budget; exhausting it ends the task
//! with an error and closes the channel, which the engine treats as
//! fatal.

use crate::error::{GatewayError, GatewayResult};
use futures_util::{SinkExt, StreamExt};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

/// Feed configuration.
#[derive(Debug, Clone)]
pub struct WsFeedConfig {
    pub url: String,
    /// Topics to subscribe to after connecting.
    pub topics: Vec<String>,
    /// If no message arrives within this window the connection is
    /// considered dead and torn down for reconnect.
    pub heartbeat_timeout: Duration,
    /// Interval between idle pings.
    pub ping_interval: Duration,
    pub reconnect_base_delay: Duration,
    pub reconnect_max_delay: Duration,
    /// Consecutive failed connection attempts before giving up
    /// (0 = unbounded).
    pub max_reconnect_attempts: u32,
}

impl Default for WsFeedConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            topics: Vec::new(),
            heartbeat_timeout: Duration::from_secs(30),
            ping_interval: Duration::from_secs(20),
            reconnect_base_delay: Duration::from_secs(1),
            reconnect_max_delay: Duration::from_secs(60),
            max_reconnect_attempts: 10,
        }
    }
}

/// How a single connected session ended.
enum SessionEnd {
    /// The engine dropped the receiver; shut down quietly.
    ReceiverDropped,
    /// Server closed or the stream ended; reconnect.
    Closed,
}

/// A WebSocket feed forwarding raw messages into a channel.
pub struct WsFeed {
    config: WsFeedConfig,
    tx: mpsc::Sender<String>,
}

impl WsFeed {
    pub fn new(config: WsFeedConfig, tx: mpsc::Sender<String>) -> Self {
        Self { config, tx }
    }

    /// Run the feed until the receiver is dropped or the reconnect
    /// budget is exhausted.
    pub async fn run(self) -> GatewayResult<()> {
        let mut failed_attempts = 0u32;

        loop {
            match self.session().await {
                Ok(SessionEnd::ReceiverDropped) => {
                    info!(url = %self.config.url, "Feed receiver dropped, stopping");
                    return Ok(());
                }
                Ok(SessionEnd::Closed) => {
                    warn!(url = %self.config.url, "WebSocket closed by server");
                    // The connection was established; the budget counts
                    // consecutive failures only.
                    failed_attempts = 0;
                }
                Err(e) => {
                    error!(url = %self.config.url, error = %e, "WebSocket session error");
                }
            }

            failed_attempts += 1;
            if self.config.max_reconnect_attempts > 0
                && failed_attempts >= self.config.max_reconnect_attempts
            {
                error!(
                    attempts = failed_attempts,
                    "Reconnect budget exhausted, feed is down"
                );
                return Err(GatewayError::WebSocket(
                    "reconnect budget exhausted".to_string(),
                ));
            }

            let delay = self.backoff_delay(failed_attempts);
            warn!(
                attempt = failed_attempts,
                delay_ms = delay.as_millis() as u64,
                "Reconnecting"
            );
            tokio::time::sleep(delay).await;
        }
    }

    async fn session(&self) -> GatewayResult<SessionEnd> {
        info!(url = %self.config.url, "Connecting to WebSocket");
        let (ws_stream, _) = connect_async(&self.config.url)
            .await
            .map_err(|e| GatewayError::WebSocket(e.to_string()))?;
        let (mut write, mut read) = ws_stream.split();
        info!(url = %self.config.url, "WebSocket connected");

        if !self.config.topics.is_empty() {
            let subscribe = serde_json::json!({
                "op": "subscribe",
                "args": self.config.topics,
            });
            write
                .send(Message::Text(subscribe.to_string()))
                .await
                .map_err(|e| GatewayError::WebSocket(format!("subscribe failed: {e}")))?;
            debug!(topics = ?self.config.topics, "Subscriptions sent");
        }

        let mut last_message = Instant::now();
        let mut ping = tokio::time::interval(self.config.ping_interval);
        ping.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            last_message = Instant::now();
                            if self.tx.send(text).await.is_err() {
                                return Ok(SessionEnd::ReceiverDropped);
                            }
                        }
                        Some(Ok(Message::Ping(data))) => {
                            last_message = Instant::now();
                            write
                                .send(Message::Pong(data))
                                .await
                                .map_err(|e| GatewayError::WebSocket(e.to_string()))?;
                        }
                        Some(Ok(Message::Pong(_))) => {
                            last_message = Instant::now();
                        }
                        Some(Ok(Message::Close(frame))) => {
                            debug!(?frame, "Close frame received");
                            return Ok(SessionEnd::Closed);
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            return Err(GatewayError::WebSocket(e.to_string()));
                        }
                        None => return Ok(SessionEnd::Closed),
                    }
                }
                _ = ping.tick() => {
                    if last_message.elapsed() > self.config.heartbeat_timeout {
                        return Err(GatewayError::WebSocket("heartbeat timeout".to_string()));
                    }
                    write
                        .send(Message::Text(r#"{"op":"ping"}"#.to_string()))
                        .await
                        .map_err(|e| GatewayError::WebSocket(format!("ping failed: {e}")))?;
                    debug!("Sent heartbeat ping");
                }
            }
        }
    }

    /// Exponential backoff: base * 2^(attempt-1), capped, plus jitter.
    fn backoff_delay(&self, attempt: u32) -> Duration {
        let base = self.config.reconnect_base_delay.as_millis() as u64;
        let max = self.config.reconnect_max_delay.as_millis() as u64;
        let exponent = attempt.saturating_sub(1).min(10);
        let delay = base.saturating_mul(1u64 << exponent).min(max);
        Duration::from_millis(delay + jitter_ms())
    }
}

/// Jitter (0-1000ms) without an RNG dependency.
fn jitter_ms() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    (nanos % 1000) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_grows_and_caps() {
        let config = WsFeedConfig {
            reconnect_base_delay: Duration::from_millis(1000),
            reconnect_max_delay: Duration::from_millis(8000),
            ..Default::default()
        };
        let (tx, _rx) = mpsc::channel(1);
        let feed = WsFeed::new(config, tx);

        let d1 = feed.backoff_delay(1);
        let d2 = feed.backoff_delay(2);
        let d3 = feed.backoff_delay(3);
        let d8 = feed.backoff_delay(8);

        assert!(d1 >= Duration::from_millis(1000) && d1 < Duration::from_millis(2000));
        assert!(d2 >= Duration::from_millis(2000) && d2 < Duration::from_millis(3000));
        assert!(d3 >= Duration::from_millis(4000) && d3 < Duration::from_millis(5000));
        // Capped at the max delay.
        assert!(d8 >= Duration::from_millis(8000) && d8 < Duration::from_millis(9000));
    }

    #[test]
    fn test_default_config_has_budget() {
        let config = WsFeedConfig::default();
        assert!(config.max_reconnect_attempts > 0);
        assert!(config.heartbeat_timeout > config.ping_interval);
    }
}

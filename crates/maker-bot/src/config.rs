//! Application configuration.
//!
//! Loaded once from TOML, immutable afterwards, and passed by
//! construction into every component.

use crate::error::{AppError, AppResult};
use maker_risk::{DailyLossConfig, VolatilityConfig};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Trading mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradingMode {
    /// Real orders against the venue.
    Live,
    /// Real market data, simulated placements and balance.
    #[default]
    DryRun,
    /// No network at all; mocked market metadata.
    Simulation,
}

/// Loop and interval tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemConfig {
    /// Main loop tick interval.
    #[serde(default = "default_loop_interval_ms")]
    pub loop_interval_ms: u64,
    /// How often quotes are recomputed and replaced.
    #[serde(default = "default_order_refresh_interval_ms")]
    pub order_refresh_interval_ms: u64,
    /// REST balance/position re-fetch interval.
    #[serde(default = "default_health_check_interval_ms")]
    pub health_check_interval_ms: u64,
    /// Bot-metrics audit flush interval.
    #[serde(default = "default_status_report_interval_ms")]
    pub status_report_interval_ms: u64,
    /// Market data older than this pauses quoting and cancels orders.
    #[serde(default = "default_market_data_stale_timeout_ms")]
    pub market_data_stale_timeout_ms: u64,
    /// Orders older than this are swept and re-quoted.
    #[serde(default = "default_stale_order_max_age_ms")]
    pub stale_order_max_age_ms: u64,
}

fn default_loop_interval_ms() -> u64 {
    1_000
}

fn default_order_refresh_interval_ms() -> u64 {
    5_000
}

fn default_health_check_interval_ms() -> u64 {
    60_000
}

fn default_status_report_interval_ms() -> u64 {
    300_000
}

fn default_market_data_stale_timeout_ms() -> u64 {
    30_000
}

fn default_stale_order_max_age_ms() -> u64 {
    600_000
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            loop_interval_ms: default_loop_interval_ms(),
            order_refresh_interval_ms: default_order_refresh_interval_ms(),
            health_check_interval_ms: default_health_check_interval_ms(),
            status_report_interval_ms: default_status_report_interval_ms(),
            market_data_stale_timeout_ms: default_market_data_stale_timeout_ms(),
            stale_order_max_age_ms: default_stale_order_max_age_ms(),
        }
    }
}

/// REST retry and rate-limit tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Minimum spacing between single-order cancel calls.
    #[serde(default = "default_cancel_spacing_ms")]
    pub cancel_spacing_ms: u64,
}

fn default_max_attempts() -> u32 {
    4
}

fn default_base_delay_ms() -> u64 {
    500
}

fn default_max_delay_ms() -> u64 {
    10_000
}

fn default_cancel_spacing_ms() -> u64 {
    100
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            cancel_spacing_ms: default_cancel_spacing_ms(),
        }
    }
}

/// Quoting parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyConfig {
    /// Half-spread around the smoothed mid (0.001 = 0.1% each side).
    #[serde(default = "default_spread_pct")]
    pub spread_pct: Decimal,
    /// Fraction of balance committed per quote.
    #[serde(default = "default_risk_per_trade_pct")]
    pub risk_per_trade_pct: Decimal,
    /// Hard cap on the per-quote balance fraction.
    #[serde(default = "default_max_order_size_pct")]
    pub max_order_size_pct: Decimal,
    /// Keep an existing order while its price is within this band of
    /// the new target.
    #[serde(default = "default_order_stale_threshold_pct")]
    pub order_stale_threshold_pct: Decimal,
    /// EMA smoothing factor for the mid-price.
    #[serde(default = "default_ema_alpha")]
    pub ema_alpha: Decimal,
}

fn default_spread_pct() -> Decimal {
    Decimal::new(1, 3) // 0.1%
}

fn default_risk_per_trade_pct() -> Decimal {
    Decimal::new(5, 3) // 0.5%
}

fn default_max_order_size_pct() -> Decimal {
    Decimal::new(1, 1) // 10%
}

fn default_order_stale_threshold_pct() -> Decimal {
    Decimal::new(5, 4) // 0.05%
}

fn default_ema_alpha() -> Decimal {
    Decimal::new(2, 1) // 0.2
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            spread_pct: default_spread_pct(),
            risk_per_trade_pct: default_risk_per_trade_pct(),
            max_order_size_pct: default_max_order_size_pct(),
            order_stale_threshold_pct: default_order_stale_threshold_pct(),
            ema_alpha: default_ema_alpha(),
        }
    }
}

/// WebSocket feed tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WsConfig {
    /// Consecutive failed connects before the feed gives up (0 = never).
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,
    #[serde(default = "default_reconnect_base_delay_ms")]
    pub reconnect_base_delay_ms: u64,
    #[serde(default = "default_reconnect_max_delay_ms")]
    pub reconnect_max_delay_ms: u64,
    #[serde(default = "default_heartbeat_timeout_ms")]
    pub heartbeat_timeout_ms: u64,
    #[serde(default = "default_ping_interval_ms")]
    pub ping_interval_ms: u64,
}

fn default_max_reconnect_attempts() -> u32 {
    10
}

fn default_reconnect_base_delay_ms() -> u64 {
    1_000
}

fn default_reconnect_max_delay_ms() -> u64 {
    60_000
}

fn default_heartbeat_timeout_ms() -> u64 {
    30_000
}

fn default_ping_interval_ms() -> u64 {
    20_000
}

impl Default for WsConfig {
    fn default() -> Self {
        Self {
            max_reconnect_attempts: default_max_reconnect_attempts(),
            reconnect_base_delay_ms: default_reconnect_base_delay_ms(),
            reconnect_max_delay_ms: default_reconnect_max_delay_ms(),
            heartbeat_timeout_ms: default_heartbeat_timeout_ms(),
            ping_interval_ms: default_ping_interval_ms(),
        }
    }
}

/// Snapshot and audit-log locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    #[serde(default = "default_state_file")]
    pub state_file: String,
    #[serde(default = "default_audit_dir")]
    pub audit_dir: String,
    #[serde(default = "default_audit_buffer_size")]
    pub audit_buffer_size: usize,
}

fn default_state_file() -> String {
    "data/state.json".to_string()
}

fn default_audit_dir() -> String {
    "data/audit".to_string()
}

fn default_audit_buffer_size() -> usize {
    64
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            state_file: default_state_file(),
            audit_dir: default_audit_dir(),
            audit_buffer_size: default_audit_buffer_size(),
        }
    }
}

/// Application configuration root.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub symbol: String,
    #[serde(default = "default_category")]
    pub category: String,
    #[serde(default = "default_quote_currency")]
    pub quote_currency: String,
    #[serde(default)]
    pub mode: TradingMode,
    #[serde(default)]
    pub testnet: bool,
    #[serde(default = "default_leverage")]
    pub leverage: u32,
    #[serde(default = "default_rest_url")]
    pub rest_url: String,
    #[serde(default = "default_ws_public_url")]
    pub ws_public_url: String,
    #[serde(default = "default_ws_private_url")]
    pub ws_private_url: String,
    /// Starting balance for dry-run and simulation modes.
    #[serde(default = "default_initial_virtual_capital")]
    pub initial_virtual_capital: Decimal,
    #[serde(default)]
    pub system: SystemConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub strategy: StrategyConfig,
    #[serde(default)]
    pub volatility_breaker: VolatilityConfig,
    #[serde(default)]
    pub daily_loss: DailyLossConfig,
    #[serde(default)]
    pub websocket: WsConfig,
    #[serde(default)]
    pub persistence: PersistenceConfig,
}

fn default_category() -> String {
    "linear".to_string()
}

fn default_quote_currency() -> String {
    "USDT".to_string()
}

fn default_leverage() -> u32 {
    1
}

fn default_rest_url() -> String {
    "https://api.bybit.com".to_string()
}

fn default_ws_public_url() -> String {
    "wss://stream.bybit.com/v5/public/linear".to_string()
}

fn default_ws_private_url() -> String {
    "wss://stream.bybit.com/v5/private".to_string()
}

fn default_initial_virtual_capital() -> Decimal {
    Decimal::from(10_000)
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            symbol: "BTCUSDT".to_string(),
            category: default_category(),
            quote_currency: default_quote_currency(),
            mode: TradingMode::default(),
            testnet: false,
            leverage: default_leverage(),
            rest_url: default_rest_url(),
            ws_public_url: default_ws_public_url(),
            ws_private_url: default_ws_private_url(),
            initial_virtual_capital: default_initial_virtual_capital(),
            system: SystemConfig::default(),
            retry: RetryConfig::default(),
            strategy: StrategyConfig::default(),
            volatility_breaker: VolatilityConfig::default(),
            daily_loss: DailyLossConfig::default(),
            websocket: WsConfig::default(),
            persistence: PersistenceConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file, falling back to defaults
    /// when the file does not exist.
    pub fn load(path: &str) -> AppResult<Self> {
        if Path::new(path).exists() {
            Self::from_file(path)
        } else {
            tracing::warn!(path, "Config file not found, using defaults");
            Ok(Self::default())
        }
    }

    /// Load from a specific file.
    pub fn from_file(path: &str) -> AppResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("Failed to read config: {e}")))?;
        toml::from_str(&content)
            .map_err(|e| AppError::Config(format!("Failed to parse config: {e}")))
    }

    pub fn is_live(&self) -> bool {
        self.mode == TradingMode::Live
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.mode, TradingMode::DryRun);
        assert_eq!(config.symbol, "BTCUSDT");
        assert!(!config.is_live());
        assert_eq!(config.strategy.spread_pct, dec!(0.001));
        assert_eq!(config.daily_loss.max_daily_loss_pct, dec!(0.10));
    }

    #[test]
    fn test_minimal_toml_gets_defaults() {
        let config: AppConfig = toml::from_str(r#"symbol = "ETHUSDT""#).unwrap();
        assert_eq!(config.symbol, "ETHUSDT");
        assert_eq!(config.system.loop_interval_ms, 1000);
        assert_eq!(config.retry.max_attempts, 4);
        assert_eq!(config.websocket.max_reconnect_attempts, 10);
    }

    #[test]
    fn test_toml_overrides() {
        let config: AppConfig = toml::from_str(
            r#"
            symbol = "ETHUSDT"
            mode = "live"
            leverage = 5

            [strategy]
            spread_pct = "0.002"

            [volatility_breaker]
            pause_threshold_pct = "0.03"

            [retry]
            max_attempts = 7
            "#,
        )
        .unwrap();

        assert_eq!(config.mode, TradingMode::Live);
        assert_eq!(config.leverage, 5);
        assert_eq!(config.strategy.spread_pct, dec!(0.002));
        assert_eq!(config.volatility_breaker.pause_threshold_pct, dec!(0.03));
        assert_eq!(config.retry.max_attempts, 7);
    }

    #[test]
    fn test_config_round_trips_through_toml() {
        let config = AppConfig::default();
        let text = toml::to_string(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed.symbol, config.symbol);
        assert_eq!(parsed.strategy.spread_pct, config.strategy.spread_pct);
    }
}

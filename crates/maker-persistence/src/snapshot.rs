//! Versioned trading-state snapshots.
//!
//! Saved on shutdown and restored on startup. Writes go to a temp file
//! and are renamed into place so a crash mid-write never corrupts the
//! restorable state. Decimals serialize as strings, so every
//! price/quantity/PnL value round-trips without precision loss. Unknown
//! versions are rejected, not coerced.

use crate::error::{PersistenceError, PersistenceResult};
use chrono::{DateTime, NaiveDate, Utc};
use maker_core::{Order, PositionMetrics, Price};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Current snapshot schema version.
pub const SNAPSHOT_VERSION: u32 = 1;

/// Everything needed to resume after a restart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub version: u32,
    pub symbol: String,
    pub mid_price: Price,
    pub smoothed_mid: Price,
    pub balance: Decimal,
    pub available_balance: Decimal,
    pub position_qty: Decimal,
    pub active_orders: Vec<Order>,
    pub metrics: PositionMetrics,
    pub price_history: Vec<(DateTime<Utc>, Price)>,
    pub paused_until: Option<DateTime<Utc>>,
    pub cooldown_until: Option<DateTime<Utc>>,
    pub daily_baseline_capital: Decimal,
    pub daily_baseline_date: Option<NaiveDate>,
    pub saved_at: DateTime<Utc>,
}

/// Snapshot file store.
pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write atomically: serialize to `<path>.tmp`, then rename.
    pub fn save(&self, snapshot: &Snapshot) -> PersistenceResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let tmp_path = self.path.with_extension("tmp");
        let payload = serde_json::to_vec_pretty(snapshot)?;
        fs::write(&tmp_path, payload)?;
        fs::rename(&tmp_path, &self.path)?;

        info!(
            path = %self.path.display(),
            orders = snapshot.active_orders.len(),
            "State snapshot saved"
        );
        Ok(())
    }

    /// Load the snapshot, if one exists. Unknown versions are an error.
    pub fn load(&self) -> PersistenceResult<Option<Snapshot>> {
        if !self.path.exists() {
            info!(path = %self.path.display(), "No snapshot found, starting fresh");
            return Ok(None);
        }

        let payload = fs::read(&self.path)?;
        let snapshot: Snapshot = serde_json::from_slice(&payload)?;

        if snapshot.version != SNAPSHOT_VERSION {
            warn!(
                found = snapshot.version,
                expected = SNAPSHOT_VERSION,
                "Snapshot version mismatch"
            );
            return Err(PersistenceError::UnsupportedVersion {
                found: snapshot.version,
                expected: SNAPSHOT_VERSION,
            });
        }

        info!(
            path = %self.path.display(),
            orders = snapshot.active_orders.len(),
            saved_at = %snapshot.saved_at,
            "State snapshot restored"
        );
        Ok(Some(snapshot))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use maker_core::{ClientOrderId, OrderStatus, OrderType, Qty, Side};
    use rust_decimal_macros::dec;
    use tempfile::TempDir;

    fn sample_snapshot() -> Snapshot {
        let mut metrics = PositionMetrics::default();
        metrics.apply_fill(Side::Buy, Qty::new(dec!(10)), Price::new(dec!(100.123456789)), dec!(0.05));

        Snapshot {
            version: SNAPSHOT_VERSION,
            symbol: "BTCUSDT".to_string(),
            mid_price: Price::new(dec!(50000.5)),
            smoothed_mid: Price::new(dec!(50000.123456789012345678)),
            balance: dec!(10000.000000000001),
            available_balance: dec!(9500),
            position_qty: dec!(10),
            active_orders: vec![Order {
                order_id: "o-1".to_string(),
                client_order_id: ClientOrderId::new(Side::Buy),
                symbol: "BTCUSDT".to_string(),
                side: Side::Buy,
                order_type: OrderType::Limit,
                price: Price::new(dec!(49999.9)),
                qty: Qty::new(dec!(0.013)),
                cum_filled_qty: Qty::new(dec!(0.001)),
                status: OrderStatus::PartiallyFilled,
                reduce_only: false,
                created_at: Utc::now(),
            }],
            metrics,
            price_history: vec![
                (Utc::now(), Price::new(dec!(50000.1))),
                (Utc::now(), Price::new(dec!(50000.2))),
            ],
            paused_until: Some(Utc::now()),
            cooldown_until: None,
            daily_baseline_capital: dec!(10234.56789),
            daily_baseline_date: Some(Utc::now().date_naive()),
            saved_at: Utc::now(),
        }
    }

    #[test]
    fn test_round_trip_preserves_exact_values() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::new(dir.path().join("state.json"));

        let snapshot = sample_snapshot();
        store.save(&snapshot).unwrap();
        let restored = store.load().unwrap().unwrap();

        // Full structural equality, including every decimal digit.
        assert_eq!(restored, snapshot);
    }

    #[test]
    fn test_missing_file_is_none() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::new(dir.path().join("absent.json"));
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_unknown_version_rejected() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::new(dir.path().join("state.json"));

        let mut snapshot = sample_snapshot();
        snapshot.version = 99;
        store.save(&snapshot).unwrap();

        assert!(matches!(
            store.load(),
            Err(PersistenceError::UnsupportedVersion { found: 99, .. })
        ));
    }

    #[test]
    fn test_save_overwrites_atomically() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::new(dir.path().join("state.json"));

        let mut snapshot = sample_snapshot();
        store.save(&snapshot).unwrap();
        snapshot.balance = dec!(1);
        store.save(&snapshot).unwrap();

        let restored = store.load().unwrap().unwrap();
        assert_eq!(restored.balance, dec!(1));
        // No temp file left behind.
        assert!(!dir.path().join("state.tmp").exists());
    }

    #[test]
    fn test_corrupt_payload_is_error_not_panic() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");
        fs::write(&path, b"{not json").unwrap();

        let store = SnapshotStore::new(path);
        assert!(matches!(store.load(), Err(PersistenceError::Serde(_))));
    }
}

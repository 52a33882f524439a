//! Append-only JSON Lines audit log.
//!
//! Each line is a complete JSON object, so partial corruption only
//! affects individual lines and interrupted writes never damage earlier
//! records. Files rotate daily. Records are written for analysis only
//! and never read back into control flow.

use crate::error::PersistenceResult;
use chrono::{DateTime, Utc};
use maker_core::{LiquidityRole, OrderStatus, OrderType, Price, Qty, Side};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// One audit record. Four kinds, mirroring what the engine observes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AuditRecord {
    OrderEvent {
        timestamp: DateTime<Utc>,
        order_id: String,
        client_order_id: String,
        symbol: String,
        side: Side,
        order_type: OrderType,
        price: Price,
        qty: Qty,
        status: OrderStatus,
        cum_filled_qty: Qty,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    TradeFill {
        timestamp: DateTime<Utc>,
        order_id: String,
        trade_id: String,
        symbol: String,
        side: Side,
        exec_price: Price,
        exec_qty: Qty,
        fee: Decimal,
        fee_currency: String,
        realized_pnl_impact: Decimal,
        liquidity_role: LiquidityRole,
    },
    BalanceUpdate {
        timestamp: DateTime<Utc>,
        currency: String,
        wallet_balance: Decimal,
        available_balance: Decimal,
    },
    BotMetrics {
        timestamp: DateTime<Utc>,
        total_trades: u64,
        net_realized_pnl: Decimal,
        realized_pnl: Decimal,
        unrealized_pnl: Decimal,
        gross_profit: Decimal,
        gross_loss: Decimal,
        total_fees: Decimal,
        wins: u64,
        losses: u64,
        win_rate: f64,
        current_holdings: Decimal,
        average_entry_price: Price,
        daily_pnl: Decimal,
        daily_loss_pct: f64,
    },
}

struct ActiveWriter {
    writer: BufWriter<File>,
    date: String,
    records_written: usize,
}

/// Buffered JSON Lines writer with daily rotation.
///
/// Opens files in append mode, so restarts extend the day's log rather
/// than truncating it.
pub struct AuditLog {
    base_dir: PathBuf,
    buffer: Vec<AuditRecord>,
    max_buffer_size: usize,
    active_writer: Option<ActiveWriter>,
}

impl AuditLog {
    pub fn new(base_dir: impl Into<PathBuf>, max_buffer_size: usize) -> Self {
        let base_dir = base_dir.into();
        if let Err(e) = std::fs::create_dir_all(&base_dir) {
            warn!(?e, dir = %base_dir.display(), "Failed to create audit directory");
        }

        Self {
            base_dir,
            buffer: Vec::with_capacity(max_buffer_size),
            max_buffer_size,
            active_writer: None,
        }
    }

    /// Buffer a record, flushing when the buffer fills.
    pub fn append(&mut self, record: AuditRecord) -> PersistenceResult<()> {
        self.buffer.push(record);
        if self.buffer.len() >= self.max_buffer_size {
            self.flush()?;
        }
        Ok(())
    }

    /// Flush buffered records to the current day's file.
    pub fn flush(&mut self) -> PersistenceResult<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }

        let today = Utc::now().format("%Y-%m-%d").to_string();

        let needs_rotation = self
            .active_writer
            .as_ref()
            .map(|w| w.date != today)
            .unwrap_or(false);
        if needs_rotation {
            self.close_active_writer()?;
        }
        if self.active_writer.is_none() {
            self.open_writer(&today)?;
        }

        let record_count = self.buffer.len();
        {
            let active = self
                .active_writer
                .as_mut()
                .expect("active_writer should exist");
            for record in &self.buffer {
                let line = serde_json::to_string(record)?;
                writeln!(active.writer, "{line}")?;
            }
            active.writer.flush()?;
            active.records_written += record_count;
        }

        debug!(date = %today, records = record_count, "Flushed audit records");
        self.buffer.clear();
        Ok(())
    }

    /// Flush and close the writer.
    pub fn close(&mut self) -> PersistenceResult<()> {
        self.flush()?;
        self.close_active_writer()
    }

    fn open_writer(&mut self, date: &str) -> PersistenceResult<()> {
        let path = self.base_dir.join(format!("audit_{date}.jsonl"));
        info!(path = %path.display(), "Opening audit log (append mode)");

        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        self.active_writer = Some(ActiveWriter {
            writer: BufWriter::new(file),
            date: date.to_string(),
            records_written: 0,
        });
        Ok(())
    }

    fn close_active_writer(&mut self) -> PersistenceResult<()> {
        if let Some(mut active) = self.active_writer.take() {
            if let Err(e) = active.writer.flush() {
                warn!(?e, "Failed to flush audit writer on close");
            }
            info!(
                date = %active.date,
                records = active.records_written,
                "Closed audit log"
            );
        }
        Ok(())
    }
}

impl Drop for AuditLog {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            warn!(?e, "Failed to flush audit buffer on drop");
        }
        if let Err(e) = self.close_active_writer() {
            warn!(?e, "Failed to close audit writer on drop");
        }
    }
}

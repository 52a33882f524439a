//! Persistence adapter.
//!
//! Two independent concerns:
//! - a versioned snapshot of trading state for crash recovery, written
//!   atomically (temp file + rename)
//! - an append-only JSON Lines audit log for analysis; never read back
//!   into control flow

pub mod audit;
pub mod error;
pub mod snapshot;

pub use audit::{AuditLog, AuditRecord};
pub use error::{PersistenceError, PersistenceResult};
pub use snapshot::{Snapshot, SnapshotStore, SNAPSHOT_VERSION};

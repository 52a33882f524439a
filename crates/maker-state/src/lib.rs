//! Market/account state store.
//!
//! The single source of truth for mid-price, price history, balances,
//! position, and open orders. Three scoped lock regions guard cohesive
//! field groups; no lock is held across an await point. Exchange events
//! are the only mutation path apart from the periodic REST health check,
//! which overwrites the account region.

pub mod lifecycle;
pub mod reconcile;
pub mod store;

pub use lifecycle::OrderEventOutcome;
pub use reconcile::ReconcileReport;
pub use store::{AccountView, StateExport, StateStore, StateStoreConfig};

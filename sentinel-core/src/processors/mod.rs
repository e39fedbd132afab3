//! Long-lived and on-demand processors.
//!
//! - [`ChainListener`]: supervises the live feed, owning the push/poll
//!   transport state machine.
//! - [`ReconciliationScanner`]: on-demand historical replay for one
//!   wallet, used as the manual recovery path.

pub mod listener;
pub mod reconciliation;

pub use listener::{ChainListener, TransportMode};
pub use reconciliation::{ReconcileError, ReconcileOutcome, ReconciliationScanner};

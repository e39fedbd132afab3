//! Application state shared across all request handlers.

use sentinel_core::ledger::Ledger;
use sentinel_core::processors::{ChainListener, ReconciliationScanner};
use std::sync::Arc;

/// Shared handles for request handlers.
///
/// Cloneable and cheap to pass around (everything is behind Arc).
#[derive(Clone)]
pub struct AppState {
    /// Read access to the membership/badge ledger.
    pub ledger: Arc<dyn Ledger>,
    /// Manual reconciliation trigger.
    pub scanner: Arc<ReconciliationScanner>,
    /// Live-feed supervisor, kept here so handlers could expose health
    /// details later and so its lifetime is tied to the server's.
    pub listener: Arc<ChainListener>,
}

impl AppState {
    pub fn new(
        ledger: Arc<dyn Ledger>,
        scanner: Arc<ReconciliationScanner>,
        listener: Arc<ChainListener>,
    ) -> Self {
        Self {
            ledger,
            scanner,
            listener,
        }
    }
}

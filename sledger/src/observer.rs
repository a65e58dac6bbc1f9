//! Observer contract for ledger outcomes.
//!
//! ```rust
//! use sledger::{LedgerObserver, NoopLedgerObserver};
//!
//! fn accepts_observer(_observer: &dyn LedgerObserver) {}
//!
//! accepts_observer(&NoopLedgerObserver);
//! ```

use crate::{LedgerError, LedgerKey};

pub trait LedgerObserver: Send + Sync {
    fn on_stored(&self, _key: &LedgerKey, _sequence: u64) {}

    /// Create-only write found the key already present. Not an error.
    fn on_duplicate(&self, _key: &LedgerKey) {}

    /// Message is durable but the aggregate update failed and may need reconciling.
    fn on_aggregate_failure(&self, _key: &LedgerKey, _error: &LedgerError) {}

    fn on_write_failure(&self, _key: &LedgerKey, _error: &LedgerError) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopLedgerObserver;

impl LedgerObserver for NoopLedgerObserver {}

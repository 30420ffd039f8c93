//! Types shared by the sale contract tracker and the payment reconciler.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

use crate::ledger::LedgerError;

/// Longest accepted expiry window (100 years).
pub const MAX_EXPIRY_SECS: u64 = 100 * 365 * 24 * 3600;

/// Age limits for unresolved records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpiryWindows {
    /// Unresolved records older than this are disabled.
    pub soft: Duration,
    /// Abandoned records older than this are deleted.
    pub hard: Duration,
}

impl ExpiryWindows {
    /// Windows longer than [`MAX_EXPIRY_SECS`] are clamped to it.
    pub fn from_secs(soft_secs: u64, hard_secs: u64) -> Self {
        let clamp = |secs: u64| Duration::seconds(secs.min(MAX_EXPIRY_SECS) as i64);
        Self {
            soft: clamp(soft_secs),
            hard: clamp(hard_secs),
        }
    }

    pub fn soft_cutoff(&self, now: DateTime<Utc>) -> String {
        crate::db::timestamp(now - self.soft)
    }

    pub fn hard_cutoff(&self, now: DateTime<Utc>) -> String {
        crate::db::timestamp(now - self.hard)
    }
}

impl Default for ExpiryWindows {
    fn default() -> Self {
        Self {
            soft: Duration::hours(3),
            hard: Duration::hours(6),
        }
    }
}

/// Failure while reconciling one record. The record is retried next tick.
#[derive(Error, Debug)]
pub enum ReconcileError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl From<String> for ReconcileError {
    fn from(e: String) -> Self {
        ReconcileError::Storage(e)
    }
}

/// Summary of one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Records moved to a terminal state.
    pub resolved: usize,
    /// Records that advanced without resolving (e.g. pending to tracked).
    pub advanced: usize,
    /// Records left for the next tick (not mined, timed out, or errored).
    pub deferred: usize,
    /// Records disabled by the soft expiry window.
    pub disabled: usize,
    /// Records deleted by the hard expiry window.
    pub deleted: usize,
}

impl TickReport {
    pub fn changed(&self) -> bool {
        self.resolved + self.advanced + self.disabled + self.deleted > 0
    }
}

impl fmt::Display for TickReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "resolved={} advanced={} deferred={} disabled={} deleted={}",
            self.resolved, self.advanced, self.deferred, self.disabled, self.deleted
        )
    }
}

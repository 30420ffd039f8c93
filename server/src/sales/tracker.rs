//! Periodic reconciliation of sale registrations against the ledger.
//!
//! Per tick:
//! 1. for each pending/tracked record, look for a receipt:
//!    - not mined: pending -> tracked once the node knows the transaction,
//!      and disabled (listing soft-deleted) once older than the soft window
//!    - reverted, not a deployment, or bytecode mismatch: invalid, listing deleted
//!    - seller differs from the declared seller: success, listing deleted
//!    - otherwise: success, listing posted
//! 2. delete non-success records older than the hard window
//!
//! A ledger timeout on one record defers that record to the next tick without
//! disabling it.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::db::models::{ListingStatus, SaleRecord, SaleStatus};
use crate::db::DbPool;
use crate::ledger::bytecode::CanonicalBytecode;
use crate::ledger::{abi, SharedLedger};
use crate::reconcile::{ExpiryWindows, ReconcileError, TickReport};
use crate::sales::store;

/// What a single reconciliation did to a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaleOutcome {
    /// No receipt yet.
    Waiting,
    /// Transaction seen by the node but not yet mined.
    Tracked,
    /// Contract confirmed. `orphaned` when the on-chain seller is not the
    /// declared seller and the listing was removed.
    Confirmed { contract_address: String, orphaned: bool },
    Invalid(&'static str),
    /// The record changed under us (already resolved elsewhere).
    Unchanged,
}

pub struct SaleContractTracker {
    db: DbPool,
    ledger: SharedLedger,
    bytecode: Arc<CanonicalBytecode>,
    windows: ExpiryWindows,
}

impl SaleContractTracker {
    pub fn new(
        db: DbPool,
        ledger: SharedLedger,
        bytecode: Arc<CanonicalBytecode>,
        windows: ExpiryWindows,
    ) -> Self {
        Self {
            db,
            ledger,
            bytecode,
            windows,
        }
    }

    /// Run one pass now.
    pub fn tick(&self) -> Result<TickReport, String> {
        self.tick_at(Utc::now())
    }

    /// Run one pass as if the current time were `now`.
    pub fn tick_at(&self, now: DateTime<Utc>) -> Result<TickReport, String> {
        let soft_cutoff = self.windows.soft_cutoff(now);
        let mut report = TickReport::default();

        for record in store::unresolved_sales(&self.db)? {
            match self.reconcile(&record) {
                Ok(outcome @ (SaleOutcome::Waiting | SaleOutcome::Tracked)) => {
                    if store::disable_stale_sale(&self.db, record.contract_id, &soft_cutoff)? {
                        report.disabled += 1;
                        tracing::info!("Sale {} not mined in time; disabled", record.tx_hash);
                    } else if outcome == SaleOutcome::Tracked {
                        report.advanced += 1;
                    } else {
                        report.deferred += 1;
                    }
                }
                Ok(SaleOutcome::Unchanged) => report.deferred += 1,
                Ok(SaleOutcome::Confirmed {
                    contract_address,
                    orphaned,
                }) => {
                    report.resolved += 1;
                    if orphaned {
                        tracing::warn!(
                            "Sale {} confirmed at {} but seller differs from listing author; listing removed",
                            record.tx_hash,
                            contract_address
                        );
                    } else {
                        tracing::info!("Sale {} confirmed at {}", record.tx_hash, contract_address);
                    }
                }
                Ok(SaleOutcome::Invalid(reason)) => {
                    report.resolved += 1;
                    tracing::warn!("Sale {} rejected: {}", record.tx_hash, reason);
                }
                Err(e) => {
                    report.deferred += 1;
                    tracing::warn!("Sale {} deferred: {}", record.tx_hash, e);
                }
            }
        }

        report.deleted = store::delete_abandoned_sales(&self.db, &self.windows.hard_cutoff(now))?;

        Ok(report)
    }

    /// Reconcile a single unresolved record against the ledger.
    pub fn reconcile(&self, record: &SaleRecord) -> Result<SaleOutcome, ReconcileError> {
        let receipt = match self.ledger.transaction_receipt(&record.tx_hash)? {
            Some(receipt) => receipt,
            None => {
                if record.status == SaleStatus::Pending
                    && self.ledger.transaction_input(&record.tx_hash)?.is_some()
                    && store::mark_tracked(&self.db, record.contract_id)?
                {
                    return Ok(SaleOutcome::Tracked);
                }
                return Ok(SaleOutcome::Waiting);
            }
        };

        if !receipt.succeeded() {
            return self.reject(record, "deployment reverted");
        }
        let Some(contract_address) = receipt.contract_address else {
            return self.reject(record, "transaction is not a contract deployment");
        };

        let Some(input) = self.ledger.transaction_input(&record.tx_hash)? else {
            return Err(crate::ledger::LedgerError::Malformed(
                "receipt exists but transaction is unknown".to_string(),
            )
            .into());
        };
        if !self.bytecode.matches(&input) {
            return self.reject(record, "deployed bytecode does not match the sale contract");
        }

        let seller = match self.ledger.seller(&contract_address) {
            Ok(seller) => seller,
            Err(e) if e.is_transient() => return Err(e.into()),
            Err(_) => return self.reject(record, "contract has no readable seller"),
        };

        let orphaned = match record.seller_address.as_deref() {
            Some(declared) => !declared.eq_ignore_ascii_case(&seller),
            None => false,
        };
        let listing = if orphaned {
            ListingStatus::Deleted
        } else {
            ListingStatus::Posted
        };

        let seller = abi::normalize_address(&seller).unwrap_or(seller);
        if store::confirm_sale(&self.db, record.contract_id, &contract_address, &seller, listing)? {
            Ok(SaleOutcome::Confirmed {
                contract_address,
                orphaned,
            })
        } else {
            Ok(SaleOutcome::Unchanged)
        }
    }

    fn reject(&self, record: &SaleRecord, reason: &'static str) -> Result<SaleOutcome, ReconcileError> {
        if store::reject_sale(&self.db, record.contract_id)? {
            Ok(SaleOutcome::Invalid(reason))
        } else {
            Ok(SaleOutcome::Unchanged)
        }
    }
}

//! Periodic reconciliation of buyer payments against the ledger.
//!
//! A pending payment resolves on its receipt:
//! - reverted: `failed`
//! - no purchase event, or an event from a contract this server never
//!   confirmed: `invalid`
//! - otherwise `success` with buyer, contract and price from the last
//!   purchase event in the receipt
//!
//! Payments without a receipt are disabled after the soft window and
//! deleted after the hard window.

use chrono::{DateTime, Utc};

use crate::db::models::{PaymentRecord, PaymentStatus};
use crate::db::DbPool;
use crate::ledger::{abi, Log, Receipt, SharedLedger};
use crate::payments::store;
use crate::reconcile::{ExpiryWindows, ReconcileError, TickReport};
use crate::sales;

/// Purchase details recovered from a receipt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Purchase {
    pub contract_address: String,
    pub buyer_address: String,
    /// Raw uint256 word, `0x`-prefixed hex
    pub price: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentOutcome {
    Waiting,
    Confirmed(Purchase),
    Failed,
    Invalid(&'static str),
    Unchanged,
}

/// Decode the last purchase event of a receipt.
///
/// `Ok(None)` when the receipt carries no purchase event at all.
pub fn last_purchase(receipt: &Receipt) -> Result<Option<Purchase>, &'static str> {
    let topic = abi::purchase_event_topic();
    let Some(log) = receipt
        .logs
        .iter()
        .filter(|log| log.topics.first() == Some(&topic))
        .last()
    else {
        return Ok(None);
    };
    decode_purchase(log).map(Some)
}

fn decode_purchase(log: &Log) -> Result<Purchase, &'static str> {
    let buyer = log.topics.get(1).ok_or("purchase event has no buyer topic")?;
    if log.data.len() != 32 {
        return Err("purchase event data is not a single word");
    }
    let contract_address =
        abi::normalize_address(&log.address).ok_or("purchase event has no valid emitter")?;

    Ok(Purchase {
        contract_address,
        buyer_address: abi::topic_address(buyer),
        price: format!("0x{}", hex::encode(&log.data)),
    })
}

pub struct PurchaseReconciler {
    db: DbPool,
    ledger: SharedLedger,
    windows: ExpiryWindows,
}

impl PurchaseReconciler {
    pub fn new(db: DbPool, ledger: SharedLedger, windows: ExpiryWindows) -> Self {
        Self { db, ledger, windows }
    }

    pub fn tick(&self) -> Result<TickReport, String> {
        self.tick_at(Utc::now())
    }

    pub fn tick_at(&self, now: DateTime<Utc>) -> Result<TickReport, String> {
        let mut report = TickReport::default();

        for record in store::pending_payments(&self.db)? {
            match self.reconcile(&record) {
                Ok(PaymentOutcome::Waiting) | Ok(PaymentOutcome::Unchanged) => report.deferred += 1,
                Ok(PaymentOutcome::Confirmed(purchase)) => {
                    report.resolved += 1;
                    tracing::info!(
                        "Payment {} confirmed: {} bought {}",
                        record.tx_hash,
                        purchase.buyer_address,
                        purchase.contract_address
                    );
                }
                Ok(PaymentOutcome::Failed) => {
                    report.resolved += 1;
                    tracing::info!("Payment {} reverted", record.tx_hash);
                }
                Ok(PaymentOutcome::Invalid(reason)) => {
                    report.resolved += 1;
                    tracing::warn!("Payment {} rejected: {}", record.tx_hash, reason);
                }
                Err(e) => {
                    report.deferred += 1;
                    tracing::warn!("Payment {} deferred: {}", record.tx_hash, e);
                }
            }
        }

        report.disabled = store::disable_stale_payments(&self.db, &self.windows.soft_cutoff(now))?;
        report.deleted = store::delete_disabled_payments(&self.db, &self.windows.hard_cutoff(now))?;

        Ok(report)
    }

    pub fn reconcile(&self, record: &PaymentRecord) -> Result<PaymentOutcome, ReconcileError> {
        let Some(receipt) = self.ledger.transaction_receipt(&record.tx_hash)? else {
            return Ok(PaymentOutcome::Waiting);
        };

        if !receipt.succeeded() {
            return self.resolve(record, PaymentStatus::Failed, PaymentOutcome::Failed);
        }

        let purchase = match last_purchase(&receipt) {
            Ok(Some(purchase)) => purchase,
            Ok(None) => return self.reject(record, "no purchase event in receipt"),
            Err(reason) => return self.reject(record, reason),
        };

        if sales::store::find_success_contract(&self.db, &purchase.contract_address)?.is_none() {
            return self.reject(record, "payment to an unknown sale contract");
        }

        let confirmed = store::confirm_payment(
            &self.db,
            record.payment_id,
            &purchase.buyer_address,
            &purchase.contract_address,
            &purchase.price,
        )?;
        if confirmed {
            Ok(PaymentOutcome::Confirmed(purchase))
        } else {
            Ok(PaymentOutcome::Unchanged)
        }
    }

    fn reject(&self, record: &PaymentRecord, reason: &'static str) -> Result<PaymentOutcome, ReconcileError> {
        self.resolve(record, PaymentStatus::Invalid, PaymentOutcome::Invalid(reason))
    }

    fn resolve(
        &self,
        record: &PaymentRecord,
        status: PaymentStatus,
        outcome: PaymentOutcome,
    ) -> Result<PaymentOutcome, ReconcileError> {
        if store::resolve_payment(&self.db, record.payment_id, status)? {
            Ok(outcome)
        } else {
            Ok(PaymentOutcome::Unchanged)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{init_memory_db, timestamp};
    use crate::db::models::ListingStatus;
    use crate::ledger::mock::MockLedger;
    use crate::sales::store::Registration;
    use chrono::{Duration, TimeZone};
    use std::sync::Arc;

    const CONTRACT: &str = "0x5555555555555555555555555555555555555555";
    const STRANGER: &str = "0x6666666666666666666666666666666666666666";
    const BUYER: [u8; 20] = [0x22; 20];
    const REQUESTER: &str = "0x2222222222222222222222222222222222222222";

    fn tx(byte: &str) -> String {
        format!("0x{}", byte.repeat(32))
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    fn purchase_log(contract: &str, price: u8) -> Log {
        let mut data = vec![0u8; 32];
        data[31] = price;
        Log {
            address: contract.to_string(),
            topics: vec![abi::purchase_event_topic(), abi::address_word(&BUYER)],
            data,
        }
    }

    fn receipt(logs: Vec<Log>) -> Receipt {
        Receipt {
            logs,
            ..Receipt::default()
        }
    }

    struct Fixture {
        db: DbPool,
        ledger: Arc<MockLedger>,
        reconciler: PurchaseReconciler,
    }

    fn fixture() -> Fixture {
        let db = init_memory_db();
        let ledger = Arc::new(MockLedger::new());
        let reconciler = PurchaseReconciler::new(db.clone(), ledger.clone(), ExpiryWindows::default());

        // One confirmed sale contract to pay into.
        let sale = match sales::store::register_sale(
            &db,
            "seller",
            "0x1111111111111111111111111111111111111111",
            "Nocturne",
            &tx("aa"),
            None,
            &timestamp(t0()),
        )
        .unwrap()
        {
            Registration::Created(record) => record,
            other => panic!("unexpected registration outcome: {:?}", other),
        };
        sales::store::confirm_sale(
            &db,
            sale.contract_id,
            CONTRACT,
            "0x1111111111111111111111111111111111111111",
            ListingStatus::Posted,
        )
        .unwrap();

        Fixture { db, ledger, reconciler }
    }

    fn submit(db: &DbPool, tx_hash: &str, at: DateTime<Utc>) -> PaymentRecord {
        store::insert_payment(db, tx_hash, REQUESTER, &timestamp(at))
            .unwrap()
            .unwrap()
    }

    fn stored(db: &DbPool, record: &PaymentRecord) -> Option<PaymentRecord> {
        store::get_payment(db, record.payment_id).unwrap()
    }

    #[test]
    fn test_valid_purchase_is_confirmed() {
        let f = fixture();
        let record = submit(&f.db, &tx("bb"), t0());
        f.ledger.set_receipt(&tx("bb"), receipt(vec![purchase_log(CONTRACT, 7)]));

        let report = f.reconciler.tick_at(t0()).unwrap();
        assert_eq!(report.resolved, 1);

        let payment = stored(&f.db, &record).unwrap();
        assert_eq!(payment.status, PaymentStatus::Success);
        assert_eq!(payment.buyer_address.as_deref(), Some(abi::to_checksum_address(&BUYER).as_str()));
        assert!(payment.contract_address.unwrap().eq_ignore_ascii_case(CONTRACT));
        assert_eq!(payment.price.unwrap(), format!("0x{}07", "00".repeat(31)));
    }

    #[test]
    fn test_last_purchase_event_wins() {
        let mut first = purchase_log(STRANGER, 1);
        first.topics[1] = abi::address_word(&[0x99; 20]);
        let found = last_purchase(&receipt(vec![first, purchase_log(CONTRACT, 9)])).unwrap().unwrap();
        assert!(found.contract_address.eq_ignore_ascii_case(CONTRACT));
        assert_eq!(found.buyer_address, abi::to_checksum_address(&BUYER));
    }

    #[test]
    fn test_receipt_without_purchase_event_is_invalid() {
        let f = fixture();
        let record = submit(&f.db, &tx("bb"), t0());
        let unrelated = Log {
            address: CONTRACT.to_string(),
            topics: vec![abi::keccak256(b"Transfer(address,address,uint256)")],
            data: vec![0u8; 32],
        };
        f.ledger.set_receipt(&tx("bb"), receipt(vec![unrelated]));

        f.reconciler.tick_at(t0()).unwrap();
        let payment = stored(&f.db, &record).unwrap();
        assert_eq!(payment.status, PaymentStatus::Invalid);
        assert!(payment.buyer_address.is_none());
        assert!(payment.price.is_none());
    }

    #[test]
    fn test_payment_to_unknown_contract_is_invalid() {
        let f = fixture();
        let record = submit(&f.db, &tx("bc"), t0());
        f.ledger.set_receipt(&tx("bc"), receipt(vec![purchase_log(STRANGER, 7)]));

        f.reconciler.tick_at(t0()).unwrap();
        assert_eq!(stored(&f.db, &record).unwrap().status, PaymentStatus::Invalid);
    }

    #[test]
    fn test_reverted_payment_fails() {
        let f = fixture();
        let record = submit(&f.db, &tx("bd"), t0());
        f.ledger.set_receipt(
            &tx("bd"),
            Receipt {
                status: 0,
                ..receipt(vec![purchase_log(CONTRACT, 7)])
            },
        );

        f.reconciler.tick_at(t0()).unwrap();
        assert_eq!(stored(&f.db, &record).unwrap().status, PaymentStatus::Failed);
    }

    #[test]
    fn test_malformed_event_is_invalid() {
        let f = fixture();
        let record = submit(&f.db, &tx("be"), t0());
        let mut log = purchase_log(CONTRACT, 7);
        log.topics.truncate(1);
        f.ledger.set_receipt(&tx("be"), receipt(vec![log]));

        f.reconciler.tick_at(t0()).unwrap();
        assert_eq!(stored(&f.db, &record).unwrap().status, PaymentStatus::Invalid);
    }

    #[test]
    fn test_timeout_leaves_payment_pending() {
        let f = fixture();
        let record = submit(&f.db, &tx("bf"), t0());
        f.ledger.time_out(&tx("bf"));

        let report = f.reconciler.tick_at(t0()).unwrap();
        assert_eq!(report.deferred, 1);
        assert_eq!(stored(&f.db, &record).unwrap().status, PaymentStatus::Pending);
    }

    #[test]
    fn test_unmined_payment_is_disabled_then_deleted() {
        let f = fixture();
        let record = submit(&f.db, &tx("c0"), t0());

        f.reconciler.tick_at(t0() + Duration::hours(3) + Duration::minutes(1)).unwrap();
        assert_eq!(stored(&f.db, &record).unwrap().status, PaymentStatus::Disabled);

        f.reconciler.tick_at(t0() + Duration::hours(6) + Duration::minutes(1)).unwrap();
        assert!(stored(&f.db, &record).is_none());
    }

    #[test]
    fn test_second_tick_is_noop() {
        let f = fixture();
        let record = submit(&f.db, &tx("c1"), t0());
        f.ledger.set_receipt(&tx("c1"), receipt(vec![purchase_log(CONTRACT, 7)]));

        f.reconciler.tick_at(t0()).unwrap();
        let first = stored(&f.db, &record).unwrap();
        let queries = f.ledger.receipt_queries();

        let report = f.reconciler.tick_at(t0()).unwrap();
        assert!(!report.changed());
        assert_eq!(f.ledger.receipt_queries(), queries);

        let second = stored(&f.db, &record).unwrap();
        assert_eq!(second.status, first.status);
        assert_eq!(second.price, first.price);
    }
}

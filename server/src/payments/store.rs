//! SQL for buyer payment records.

use rusqlite::{params, OptionalExtension, Row};

use crate::db::models::{PaymentRecord, PaymentStatus};
use crate::db::DbPool;

const PAYMENT_COLUMNS: &str =
    "payment_id, tx_hash, requester, buyer_address, contract_address, price, status, created_at";

fn payment_from_row(row: &Row<'_>) -> rusqlite::Result<PaymentRecord> {
    Ok(PaymentRecord {
        payment_id: row.get(0)?,
        tx_hash: row.get(1)?,
        requester: row.get(2)?,
        buyer_address: row.get(3)?,
        contract_address: row.get(4)?,
        price: row.get(5)?,
        status: row.get(6)?,
        created_at: row.get(7)?,
    })
}

/// Insert a pending payment. Returns `None` when the hash was already submitted.
pub fn insert_payment(
    db: &DbPool,
    tx_hash: &str,
    requester: &str,
    created_at: &str,
) -> Result<Option<PaymentRecord>, String> {
    let conn = db.lock().map_err(|e| format!("DB lock error: {}", e))?;
    let inserted = conn
        .execute(
            "INSERT OR IGNORE INTO payments (tx_hash, requester, status, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![tx_hash, requester, PaymentStatus::Pending, created_at],
        )
        .map_err(|e| format!("Failed to insert payment: {}", e))?;

    if inserted == 0 {
        return Ok(None);
    }

    Ok(Some(PaymentRecord {
        payment_id: conn.last_insert_rowid(),
        tx_hash: tx_hash.to_string(),
        requester: requester.to_string(),
        buyer_address: None,
        contract_address: None,
        price: None,
        status: PaymentStatus::Pending,
        created_at: created_at.to_string(),
    }))
}

pub fn pending_payments(db: &DbPool) -> Result<Vec<PaymentRecord>, String> {
    let conn = db.lock().map_err(|e| format!("DB lock error: {}", e))?;
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {} FROM payments WHERE status = ?1 ORDER BY payment_id",
            PAYMENT_COLUMNS
        ))
        .map_err(|e| format!("Failed to prepare payment query: {}", e))?;

    let rows = stmt
        .query_map(params![PaymentStatus::Pending], payment_from_row)
        .map_err(|e| format!("Failed to query payments: {}", e))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| format!("Failed to read payment row: {}", e))?;
    Ok(rows)
}

/// Payment `tx_hash` as submitted by `requester`.
pub fn find_payment(
    db: &DbPool,
    tx_hash: &str,
    requester: &str,
) -> Result<Option<PaymentRecord>, String> {
    let conn = db.lock().map_err(|e| format!("DB lock error: {}", e))?;
    conn.query_row(
        &format!(
            "SELECT {} FROM payments WHERE tx_hash = ?1 AND requester = ?2",
            PAYMENT_COLUMNS
        ),
        params![tx_hash, requester],
        payment_from_row,
    )
    .optional()
    .map_err(|e| format!("Failed to query payment: {}", e))
}

pub fn get_payment(db: &DbPool, payment_id: i64) -> Result<Option<PaymentRecord>, String> {
    let conn = db.lock().map_err(|e| format!("DB lock error: {}", e))?;
    conn.query_row(
        &format!("SELECT {} FROM payments WHERE payment_id = ?1", PAYMENT_COLUMNS),
        params![payment_id],
        payment_from_row,
    )
    .optional()
    .map_err(|e| format!("Failed to query payment: {}", e))
}

/// pending -> success with the purchase details taken from the event.
pub fn confirm_payment(
    db: &DbPool,
    payment_id: i64,
    buyer_address: &str,
    contract_address: &str,
    price: &str,
) -> Result<bool, String> {
    let conn = db.lock().map_err(|e| format!("DB lock error: {}", e))?;
    let changed = conn
        .execute(
            "UPDATE payments SET status = ?1, buyer_address = ?2, contract_address = ?3, price = ?4
             WHERE payment_id = ?5 AND status = ?6",
            params![
                PaymentStatus::Success,
                buyer_address,
                contract_address,
                price,
                payment_id,
                PaymentStatus::Pending
            ],
        )
        .map_err(|e| format!("Failed to confirm payment: {}", e))?;
    Ok(changed == 1)
}

/// pending -> `status` without recording any purchase details.
pub fn resolve_payment(db: &DbPool, payment_id: i64, status: PaymentStatus) -> Result<bool, String> {
    let conn = db.lock().map_err(|e| format!("DB lock error: {}", e))?;
    let changed = conn
        .execute(
            "UPDATE payments SET status = ?1 WHERE payment_id = ?2 AND status = ?3",
            params![status, payment_id, PaymentStatus::Pending],
        )
        .map_err(|e| format!("Failed to update payment: {}", e))?;
    Ok(changed == 1)
}

/// Disable pending payments created before `cutoff`.
pub fn disable_stale_payments(db: &DbPool, cutoff: &str) -> Result<usize, String> {
    let conn = db.lock().map_err(|e| format!("DB lock error: {}", e))?;
    conn.execute(
        "UPDATE payments SET status = ?1 WHERE status = ?2 AND created_at < ?3",
        params![PaymentStatus::Disabled, PaymentStatus::Pending, cutoff],
    )
    .map_err(|e| format!("Failed to disable stale payments: {}", e))
}

/// Delete disabled payments created before `cutoff`.
pub fn delete_disabled_payments(db: &DbPool, cutoff: &str) -> Result<usize, String> {
    let conn = db.lock().map_err(|e| format!("DB lock error: {}", e))?;
    conn.execute(
        "DELETE FROM payments WHERE status = ?1 AND created_at < ?2",
        params![PaymentStatus::Disabled, cutoff],
    )
    .map_err(|e| format!("Failed to delete disabled payments: {}", e))
}

//! SQL for listings and sale contract records.
//!
//! Every status transition is a single statement guarded by the expected
//! current status, so re-running a transition on a resolved record changes
//! nothing.

use rusqlite::{params, OptionalExtension, Row};

use crate::db::models::{FileRecord, ListingStatus, SaleRecord, SaleStatus};
use crate::db::DbPool;

const SALE_COLUMNS: &str =
    "contract_id, tx_hash, post_id, file_id, seller_address, contract_address, status, created_at";

fn sale_from_row(row: &Row<'_>) -> rusqlite::Result<SaleRecord> {
    Ok(SaleRecord {
        contract_id: row.get(0)?,
        tx_hash: row.get(1)?,
        post_id: row.get(2)?,
        file_id: row.get(3)?,
        seller_address: row.get(4)?,
        contract_address: row.get(5)?,
        status: row.get(6)?,
        created_at: row.get(7)?,
    })
}

/// Outcome of a sale registration request.
#[derive(Debug)]
pub enum Registration {
    Created(SaleRecord),
    /// A record for this transaction hash already exists.
    Duplicate,
    /// The referenced file does not exist or belongs to someone else.
    UnknownFile,
}

/// Create a pending listing and its pending sale record.
pub fn register_sale(
    db: &DbPool,
    user_id: &str,
    seller_address: &str,
    name: &str,
    tx_hash: &str,
    file_id: Option<&str>,
    created_at: &str,
) -> Result<Registration, String> {
    let mut conn = db.lock().map_err(|e| format!("DB lock error: {}", e))?;

    let exists: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM sale_contracts WHERE tx_hash = ?1",
            params![tx_hash],
            |row| row.get(0),
        )
        .map_err(|e| format!("Failed to check sale contract: {}", e))?;
    if exists > 0 {
        return Ok(Registration::Duplicate);
    }

    if let Some(file_id) = file_id {
        let owned: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM files WHERE file_id = ?1 AND owner_id = ?2",
                params![file_id, user_id],
                |row| row.get(0),
            )
            .map_err(|e| format!("Failed to check file ownership: {}", e))?;
        if owned == 0 {
            return Ok(Registration::UnknownFile);
        }
    }

    let tx = conn
        .transaction()
        .map_err(|e| format!("Failed to begin transaction: {}", e))?;

    tx.execute(
        "INSERT INTO listings (user_id, author_address, name, status, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![user_id, seller_address, name, ListingStatus::Pending, created_at],
    )
    .map_err(|e| format!("Failed to insert listing: {}", e))?;
    let post_id = tx.last_insert_rowid();

    tx.execute(
        "INSERT INTO sale_contracts (tx_hash, post_id, file_id, seller_address, status, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![tx_hash, post_id, file_id, seller_address, SaleStatus::Pending, created_at],
    )
    .map_err(|e| format!("Failed to insert sale contract: {}", e))?;
    let contract_id = tx.last_insert_rowid();

    tx.commit()
        .map_err(|e| format!("Failed to commit sale registration: {}", e))?;

    Ok(Registration::Created(SaleRecord {
        contract_id,
        tx_hash: tx_hash.to_string(),
        post_id,
        file_id: file_id.map(str::to_string),
        seller_address: Some(seller_address.to_string()),
        contract_address: None,
        status: SaleStatus::Pending,
        created_at: created_at.to_string(),
    }))
}

/// All records still waiting for the ledger (pending or tracked).
pub fn unresolved_sales(db: &DbPool) -> Result<Vec<SaleRecord>, String> {
    let conn = db.lock().map_err(|e| format!("DB lock error: {}", e))?;
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {} FROM sale_contracts WHERE status IN ('pending', 'tracked') ORDER BY contract_id",
            SALE_COLUMNS
        ))
        .map_err(|e| format!("Failed to prepare sale query: {}", e))?;

    let rows = stmt
        .query_map([], sale_from_row)
        .map_err(|e| format!("Failed to query sale contracts: {}", e))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| format!("Failed to read sale contract row: {}", e))?;
    Ok(rows)
}

pub fn get_sale(db: &DbPool, contract_id: i64) -> Result<Option<SaleRecord>, String> {
    let conn = db.lock().map_err(|e| format!("DB lock error: {}", e))?;
    conn.query_row(
        &format!("SELECT {} FROM sale_contracts WHERE contract_id = ?1", SALE_COLUMNS),
        params![contract_id],
        sale_from_row,
    )
    .optional()
    .map_err(|e| format!("Failed to query sale contract: {}", e))
}

/// Delete every non-success record created before `cutoff`.
pub fn delete_abandoned_sales(db: &DbPool, cutoff: &str) -> Result<usize, String> {
    let conn = db.lock().map_err(|e| format!("DB lock error: {}", e))?;
    conn.execute(
        "DELETE FROM sale_contracts WHERE status != ?1 AND created_at < ?2",
        params![SaleStatus::Success, cutoff],
    )
    .map_err(|e| format!("Failed to delete abandoned sale contracts: {}", e))
}

/// Disable one unresolved record created before `cutoff` and soft-delete its listing.
pub fn disable_stale_sale(db: &DbPool, contract_id: i64, cutoff: &str) -> Result<bool, String> {
    let mut conn = db.lock().map_err(|e| format!("DB lock error: {}", e))?;
    let tx = conn
        .transaction()
        .map_err(|e| format!("Failed to begin transaction: {}", e))?;

    let changed = tx
        .execute(
            "UPDATE sale_contracts SET status = ?1
             WHERE contract_id = ?2 AND status IN ('pending', 'tracked') AND created_at < ?3",
            params![SaleStatus::Disabled, contract_id, cutoff],
        )
        .map_err(|e| format!("Failed to disable stale sale contract: {}", e))?;

    if changed == 1 {
        tx.execute(
            "UPDATE listings SET status = ?1
             WHERE post_id = (SELECT post_id FROM sale_contracts WHERE contract_id = ?2)",
            params![ListingStatus::Deleted, contract_id],
        )
        .map_err(|e| format!("Failed to delete stale listing: {}", e))?;
    }

    tx.commit()
        .map_err(|e| format!("Failed to commit stale sale update: {}", e))?;
    Ok(changed == 1)
}

/// pending -> tracked once the node knows the transaction.
pub fn mark_tracked(db: &DbPool, contract_id: i64) -> Result<bool, String> {
    let conn = db.lock().map_err(|e| format!("DB lock error: {}", e))?;
    let changed = conn
        .execute(
            "UPDATE sale_contracts SET status = ?1 WHERE contract_id = ?2 AND status = ?3",
            params![SaleStatus::Tracked, contract_id, SaleStatus::Pending],
        )
        .map_err(|e| format!("Failed to mark sale contract tracked: {}", e))?;
    Ok(changed == 1)
}

/// Resolve to `success`, recording the deployed contract, and set the listing status.
pub fn confirm_sale(
    db: &DbPool,
    contract_id: i64,
    contract_address: &str,
    seller_address: &str,
    listing: ListingStatus,
) -> Result<bool, String> {
    resolve(db, contract_id, SaleStatus::Success, Some((contract_address, seller_address)), listing)
}

/// Resolve to `invalid` and soft-delete the listing.
pub fn reject_sale(db: &DbPool, contract_id: i64) -> Result<bool, String> {
    resolve(db, contract_id, SaleStatus::Invalid, None, ListingStatus::Deleted)
}

fn resolve(
    db: &DbPool,
    contract_id: i64,
    status: SaleStatus,
    deployed: Option<(&str, &str)>,
    listing: ListingStatus,
) -> Result<bool, String> {
    let mut conn = db.lock().map_err(|e| format!("DB lock error: {}", e))?;
    let tx = conn
        .transaction()
        .map_err(|e| format!("Failed to begin transaction: {}", e))?;

    let changed = match deployed {
        Some((contract_address, seller_address)) => tx.execute(
            "UPDATE sale_contracts SET status = ?1, contract_address = ?2, seller_address = ?3
             WHERE contract_id = ?4 AND status IN ('pending', 'tracked')",
            params![status, contract_address, seller_address, contract_id],
        ),
        None => tx.execute(
            "UPDATE sale_contracts SET status = ?1
             WHERE contract_id = ?2 AND status IN ('pending', 'tracked')",
            params![status, contract_id],
        ),
    }
    .map_err(|e| format!("Failed to resolve sale contract: {}", e))?;

    if changed == 1 {
        tx.execute(
            "UPDATE listings SET status = ?1
             WHERE post_id = (SELECT post_id FROM sale_contracts WHERE contract_id = ?2)",
            params![listing, contract_id],
        )
        .map_err(|e| format!("Failed to update listing: {}", e))?;
    }

    tx.commit()
        .map_err(|e| format!("Failed to commit sale resolution: {}", e))?;
    Ok(changed == 1)
}

/// Confirmed sale contract at `contract_address`, if this server registered one.
pub fn find_success_contract(
    db: &DbPool,
    contract_address: &str,
) -> Result<Option<SaleRecord>, String> {
    let conn = db.lock().map_err(|e| format!("DB lock error: {}", e))?;
    conn.query_row(
        &format!(
            "SELECT {} FROM sale_contracts
             WHERE contract_address = ?1 COLLATE NOCASE AND status = ?2
             LIMIT 1",
            SALE_COLUMNS
        ),
        params![contract_address, SaleStatus::Success],
        sale_from_row,
    )
    .optional()
    .map_err(|e| format!("Failed to query sale contract: {}", e))
}

/// Private file metadata behind a confirmed sale contract.
pub fn sale_file(db: &DbPool, contract_address: &str) -> Result<Option<FileRecord>, String> {
    let conn = db.lock().map_err(|e| format!("DB lock error: {}", e))?;
    conn.query_row(
        "SELECT f.file_id, f.owner_id, f.file_hash, f.aes_key, f.encrypted, f.size, f.created_at
         FROM sale_contracts sc
         INNER JOIN files f ON (f.file_id = sc.file_id)
         WHERE sc.contract_address = ?1 COLLATE NOCASE AND sc.status = ?2
         LIMIT 1",
        params![contract_address, SaleStatus::Success],
        |row| {
            Ok(FileRecord {
                file_id: row.get(0)?,
                owner_id: row.get(1)?,
                file_hash: row.get(2)?,
                aes_key: row.get(3)?,
                encrypted: row.get(4)?,
                size: row.get(5)?,
                created_at: row.get(6)?,
            })
        },
    )
    .optional()
    .map_err(|e| format!("Failed to query sale file: {}", e))
}

/// Public view of a confirmed, listed sale.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SaleInfo {
    pub contract_address: String,
    pub seller_address: Option<String>,
    pub name: String,
    pub file_hash: Option<String>,
    pub created_at: String,
}

pub fn sale_info(db: &DbPool, contract_address: &str) -> Result<Option<SaleInfo>, String> {
    let conn = db.lock().map_err(|e| format!("DB lock error: {}", e))?;
    conn.query_row(
        "SELECT sc.contract_address, sc.seller_address, l.name, f.file_hash, sc.created_at
         FROM sale_contracts sc
         INNER JOIN listings l ON (l.post_id = sc.post_id)
         LEFT JOIN files f ON (f.file_id = sc.file_id)
         WHERE sc.contract_address = ?1 COLLATE NOCASE AND sc.status = ?2 AND l.status = ?3
         LIMIT 1",
        params![contract_address, SaleStatus::Success, ListingStatus::Posted],
        |row| {
            Ok(SaleInfo {
                contract_address: row.get(0)?,
                seller_address: row.get(1)?,
                name: row.get(2)?,
                file_hash: row.get(3)?,
                created_at: row.get(4)?,
            })
        },
    )
    .optional()
    .map_err(|e| format!("Failed to query sale info: {}", e))
}

/// Current status of the listing behind a sale record.
pub fn listing_status(db: &DbPool, post_id: i64) -> Result<Option<ListingStatus>, String> {
    let conn = db.lock().map_err(|e| format!("DB lock error: {}", e))?;
    conn.query_row(
        "SELECT status FROM listings WHERE post_id = ?1",
        params![post_id],
        |row| row.get(0),
    )
    .optional()
    .map_err(|e| format!("Failed to query listing: {}", e))
}

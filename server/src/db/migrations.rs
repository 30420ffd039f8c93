use rusqlite_migration::{Migrations, M};

/// Define all schema migrations.
/// Uses SQLite user_version pragma for tracking, so no migration table is needed.
pub fn migrations() -> Migrations<'static> {
    Migrations::new(vec![M::up(
        "-- Migration 1: Files, listings, sale contracts, payments

CREATE TABLE files (
    file_id TEXT PRIMARY KEY,
    owner_id TEXT NOT NULL,
    file_hash TEXT NOT NULL,
    aes_key BLOB,
    encrypted INTEGER NOT NULL DEFAULT 0,
    size INTEGER NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX idx_files_owner ON files(owner_id);

CREATE TABLE listings (
    post_id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id TEXT NOT NULL,
    author_address TEXT,
    name TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'pending',
    created_at TEXT NOT NULL
);

CREATE TABLE sale_contracts (
    contract_id INTEGER PRIMARY KEY AUTOINCREMENT,
    tx_hash TEXT NOT NULL UNIQUE,
    post_id INTEGER NOT NULL,
    file_id TEXT,
    seller_address TEXT,
    contract_address TEXT,
    status TEXT NOT NULL DEFAULT 'pending',
    created_at TEXT NOT NULL,
    FOREIGN KEY (post_id) REFERENCES listings(post_id),
    FOREIGN KEY (file_id) REFERENCES files(file_id)
);

CREATE INDEX idx_sale_contracts_status ON sale_contracts(status, created_at);
CREATE INDEX idx_sale_contracts_address ON sale_contracts(contract_address);

CREATE TABLE payments (
    payment_id INTEGER PRIMARY KEY AUTOINCREMENT,
    tx_hash TEXT NOT NULL UNIQUE,
    requester TEXT NOT NULL,
    buyer_address TEXT,
    contract_address TEXT,
    price TEXT,
    status TEXT NOT NULL DEFAULT 'pending',
    created_at TEXT NOT NULL
);

CREATE INDEX idx_payments_status ON payments(status, created_at);
",
    )])
}

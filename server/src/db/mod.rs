pub mod migrations;
pub mod models;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Type alias for the shared database connection.
/// rusqlite is synchronous; we wrap in Arc<Mutex> for thread safety
/// with tokio::task::spawn_blocking for DB operations.
pub type DbPool = Arc<Mutex<Connection>>;

/// Initialize the SQLite database: create data directory if needed,
/// open (or create) the database file, enable WAL mode, and run migrations.
pub fn init_db(data_dir: &str) -> Result<DbPool, Box<dyn std::error::Error>> {
    // Ensure data directory exists
    std::fs::create_dir_all(data_dir)?;

    let db_path = Path::new(data_dir).join("market.db");
    let mut conn = Connection::open(&db_path)?;

    // Enable WAL mode for better concurrent read performance
    conn.pragma_update(None, "journal_mode", "WAL")?;
    prepare(&mut conn)?;

    tracing::info!("Database initialized at {}", db_path.display());

    Ok(Arc::new(Mutex::new(conn)))
}

/// In-memory database with the full schema, for unit tests.
#[cfg(test)]
pub(crate) fn init_memory_db() -> DbPool {
    let mut conn = Connection::open_in_memory().expect("open in-memory database");
    prepare(&mut conn).expect("migrate in-memory database");
    Arc::new(Mutex::new(conn))
}

fn prepare(conn: &mut Connection) -> Result<(), Box<dyn std::error::Error>> {
    // Enable foreign key enforcement
    conn.pragma_update(None, "foreign_keys", "ON")?;
    migrations::migrations().to_latest(conn)?;
    Ok(())
}

/// Timestamp format stored in `created_at` columns.
///
/// Fixed-width UTC with second precision, so SQL string comparison orders
/// rows chronologically.
pub fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

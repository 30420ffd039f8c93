use rusqlite::params;

use crate::db::models::FileRecord;
use crate::db::DbPool;

/// Insert the private metadata row for an uploaded file.
pub fn insert_file(db: &DbPool, file: &FileRecord) -> Result<(), String> {
    let conn = db.lock().map_err(|e| format!("DB lock error: {}", e))?;
    conn.execute(
        "INSERT INTO files (file_id, owner_id, file_hash, aes_key, encrypted, size, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            file.file_id,
            file.owner_id,
            file.file_hash,
            file.aes_key,
            file.encrypted,
            file.size,
            file.created_at,
        ],
    )
    .map_err(|e| format!("Failed to insert file metadata: {}", e))?;
    Ok(())
}

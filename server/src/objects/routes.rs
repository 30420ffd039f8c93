//! PUT /api/files: Upload a file (raw binary body, optional X-Aes-Key header)

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    Json,
};
use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

use crate::auth::middleware::Claims;
use crate::db::models::FileRecord;
use crate::db::timestamp;
use crate::envelope::{hybrid::AES_KEY_LEN, keccak_hex};
use crate::error::ApiError;
use crate::objects::store;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct FileUploadResponse {
    pub file_id: String,
    pub hash: String,
    pub size: u64,
}

/// PUT /api/files
///
/// The raw body is stored as-is. When the seller encrypted the file on their
/// side, `X-Aes-Key` carries that symmetric key (64 hex chars) so it can later
/// be released to buyers.
pub async fn put_file_route(
    State(state): State<AppState>,
    claims: Claims,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<FileUploadResponse>), ApiError> {
    let aes_key = match headers.get("x-aes-key") {
        Some(value) => {
            let key = value
                .to_str()
                .ok()
                .and_then(|v| hex::decode(v.trim_start_matches("0x")).ok())
                .filter(|k| k.len() == AES_KEY_LEN)
                .ok_or_else(|| {
                    ApiError::InvalidRequestBody(
                        "X-Aes-Key must be a 64-character hex string".to_string(),
                    )
                })?;
            Some(key)
        }
        None => None,
    };

    let size = body.len() as u64;
    if size > state.max_upload_size_mb * 1024 * 1024 {
        return Err(ApiError::FileSizeLimitExceeded {
            max_mb: state.max_upload_size_mb,
        });
    }

    let record = FileRecord {
        file_id: Uuid::now_v7().to_string(),
        owner_id: claims.sub,
        file_hash: keccak_hex(&body),
        encrypted: aes_key.is_some(),
        aes_key,
        size: size as i64,
        created_at: timestamp(Utc::now()),
    };

    let db = state.db.clone();
    let objects = state.objects.clone();
    let record = tokio::task::spawn_blocking(move || -> Result<FileRecord, String> {
        objects.put(&record.file_id, &body)?;
        if let Err(e) = store::insert_file(&db, &record) {
            if let Err(cleanup) = objects.delete(&record.file_id) {
                tracing::warn!("Failed to remove orphaned object {}: {}", record.file_id, cleanup);
            }
            return Err(e);
        }
        Ok(record)
    })
    .await
    .map_err(ApiError::join)??;

    tracing::info!(
        "File {} uploaded by {} ({} bytes, encrypted: {})",
        record.file_id,
        record.owner_id,
        size,
        record.encrypted
    );

    Ok((
        StatusCode::CREATED,
        Json(FileUploadResponse {
            file_id: record.file_id,
            hash: record.file_hash,
            size,
        }),
    ))
}

//! POST /api/paper/{contract_address}/download: Encrypted file for a buyer
//! POST /api/music/{contract_address}/key: Seller key wrapped for a buyer

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{header, HeaderMap, HeaderValue},
    Json,
};
use serde::Deserialize;

use crate::auth::middleware::Claims;
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct PublicKeyRequest {
    /// Caller's RSA public key, PEM encoded
    pub public_key: String,
}

/// POST /api/paper/{contract_address}/download
///
/// Body is `wrapped_key || IV || ciphertext` with no delimiter; the caller
/// splits it at its own RSA modulus size. Nothing is written on failure.
pub async fn download_route(
    State(state): State<AppState>,
    claims: Claims,
    Path(contract_address): Path<String>,
    payload: Result<Json<PublicKeyRequest>, JsonRejection>,
) -> Result<(HeaderMap, Vec<u8>), ApiError> {
    let Json(req) = payload?;
    let gate = state.gate.clone();
    let body = tokio::task::spawn_blocking(move || {
        gate.download(&contract_address, &claims.address, &req.public_key)
    })
    .await
    .map_err(ApiError::join)??;

    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"));
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(body.len()));
    Ok((headers, body))
}

/// POST /api/music/{contract_address}/key
///
/// Returns `{ "key": "<hex>" }`, or `{ "key": null }` for unencrypted uploads.
pub async fn release_key_route(
    State(state): State<AppState>,
    claims: Claims,
    Path(contract_address): Path<String>,
    payload: Result<Json<PublicKeyRequest>, JsonRejection>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let Json(req) = payload?;
    let gate = state.gate.clone();
    let key = tokio::task::spawn_blocking(move || {
        gate.release_key(&contract_address, &claims.address, &req.public_key)
    })
    .await
    .map_err(ApiError::join)??;

    Ok(Json(serde_json::json!({ "key": key.map(hex::encode) })))
}

//! POST /api/music/purchase: Submit a payment transaction for reconciliation
//! GET /api/payments/{tx_hash}: Status of a submitted payment

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::auth::middleware::Claims;
use crate::db::models::PaymentRecord;
use crate::db::timestamp;
use crate::error::ApiError;
use crate::ledger::abi;
use crate::payments::store;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SubmitPaymentRequest {
    pub tx_hash: String,
}

#[derive(Debug, Serialize)]
pub struct PaymentResponse {
    pub tx_hash: String,
    pub status: String,
    pub buyer_address: Option<String>,
    pub contract_address: Option<String>,
    pub price: Option<String>,
    pub created_at: String,
}

impl From<PaymentRecord> for PaymentResponse {
    fn from(record: PaymentRecord) -> Self {
        Self {
            tx_hash: record.tx_hash,
            status: record.status.to_string(),
            buyer_address: record.buyer_address,
            contract_address: record.contract_address,
            price: record.price,
            created_at: record.created_at,
        }
    }
}

/// Requester key stored with a payment.
fn requester(claims: &Claims) -> String {
    claims.address.to_lowercase()
}

/// POST /api/music/purchase
pub async fn submit_payment_route(
    State(state): State<AppState>,
    claims: Claims,
    payload: Result<Json<SubmitPaymentRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<PaymentResponse>), ApiError> {
    let Json(req) = payload?;
    if !abi::is_valid_tx_hash(&req.tx_hash) {
        return Err(ApiError::InvalidTxHash);
    }
    let tx_hash = req.tx_hash.to_lowercase();
    let requester = requester(&claims);

    let db = state.db.clone();
    let inserted = tokio::task::spawn_blocking(move || {
        store::insert_payment(&db, &tx_hash, &requester, &timestamp(Utc::now()))
    })
    .await
    .map_err(ApiError::join)??;

    let record = inserted.ok_or(ApiError::TxHashDuplicated)?;
    tracing::info!("Payment {} submitted by {}", record.tx_hash, record.requester);
    Ok((StatusCode::CREATED, Json(record.into())))
}

/// GET /api/payments/{tx_hash}
pub async fn get_payment_route(
    State(state): State<AppState>,
    claims: Claims,
    Path(tx_hash): Path<String>,
) -> Result<Json<PaymentResponse>, ApiError> {
    if !abi::is_valid_tx_hash(&tx_hash) {
        return Err(ApiError::InvalidTxHash);
    }
    let tx_hash = tx_hash.to_lowercase();
    let requester = requester(&claims);

    let db = state.db.clone();
    let record = tokio::task::spawn_blocking(move || store::find_payment(&db, &tx_hash, &requester))
        .await
        .map_err(ApiError::join)??;

    record
        .map(|r| Json(r.into()))
        .ok_or_else(|| ApiError::NotExist("Payment does not exist".to_string()))
}

//! REST endpoints for sale registration and public sale info.
//!
//! POST /api/paper: Register a sale under its deployment transaction
//! GET /api/paper/{contract_address}: Public info for a confirmed sale

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::auth::middleware::Claims;
use crate::db::timestamp;
use crate::error::ApiError;
use crate::ledger::abi;
use crate::sales::store::{self, Registration, SaleInfo};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct RegisterSaleRequest {
    pub tx_hash: String,
    pub name: String,
    #[serde(default)]
    pub file_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RegisterSaleResponse {
    pub post_id: i64,
    pub tx_hash: String,
    pub status: String,
}

/// POST /api/paper
///
/// Creates a pending listing and a pending sale record declaring the caller as
/// seller. The sale tracker confirms or rejects it once the deployment is mined.
pub async fn register_sale_route(
    State(state): State<AppState>,
    claims: Claims,
    payload: Result<Json<RegisterSaleRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<RegisterSaleResponse>), ApiError> {
    let Json(req) = payload?;
    if !abi::is_valid_tx_hash(&req.tx_hash) {
        return Err(ApiError::InvalidTxHash);
    }
    let name = req.name.trim().to_string();
    if name.is_empty() {
        return Err(ApiError::InvalidRequestBody("name must not be empty".to_string()));
    }
    let seller = abi::normalize_address(&claims.address).ok_or_else(|| {
        ApiError::InvalidRequestBody("Session has no valid ledger address".to_string())
    })?;

    let tx_hash = req.tx_hash.to_lowercase();
    let db = state.db.clone();
    let user_id = claims.sub;
    let file_id = req.file_id;
    let tx_for_store = tx_hash.clone();

    let registration = tokio::task::spawn_blocking(move || {
        store::register_sale(
            &db,
            &user_id,
            &seller,
            &name,
            &tx_for_store,
            file_id.as_deref(),
            &timestamp(Utc::now()),
        )
    })
    .await
    .map_err(ApiError::join)??;

    match registration {
        Registration::Created(record) => {
            tracing::info!("Sale registered for tx {} (post {})", record.tx_hash, record.post_id);
            Ok((
                StatusCode::CREATED,
                Json(RegisterSaleResponse {
                    post_id: record.post_id,
                    tx_hash: record.tx_hash,
                    status: record.status.to_string(),
                }),
            ))
        }
        Registration::Duplicate => Err(ApiError::TxHashDuplicated),
        Registration::UnknownFile => Err(ApiError::NotExist("File does not exist".to_string())),
    }
}

#[derive(Debug, Serialize)]
pub struct SaleResponse {
    #[serde(flatten)]
    pub info: SaleInfo,
    /// Live `soldOut()`; absent when the ledger could not be reached
    pub sold_out: Option<bool>,
    /// Live `forSale()`; absent when the ledger could not be reached
    pub for_sale: Option<bool>,
}

/// GET /api/paper/{contract_address}
pub async fn get_sale_route(
    State(state): State<AppState>,
    Path(contract_address): Path<String>,
) -> Result<Json<SaleResponse>, ApiError> {
    if !abi::is_valid_address(&contract_address) {
        return Err(ApiError::InvalidRequestBody(format!(
            "Invalid contract address: {}",
            contract_address
        )));
    }

    let db = state.db.clone();
    let ledger = state.ledger.clone();

    let response = tokio::task::spawn_blocking(move || -> Result<Option<SaleResponse>, String> {
        let Some(info) = store::sale_info(&db, &contract_address)? else {
            return Ok(None);
        };
        let sold_out = ledger
            .sold_out(&contract_address)
            .map_err(|e| tracing::warn!("soldOut() on {} failed: {}", contract_address, e))
            .ok();
        let for_sale = ledger
            .for_sale(&contract_address)
            .map_err(|e| tracing::warn!("forSale() on {} failed: {}", contract_address, e))
            .ok();
        Ok(Some(SaleResponse {
            info,
            sold_out,
            for_sale,
        }))
    })
    .await
    .map_err(ApiError::join)??;

    response
        .map(Json)
        .ok_or_else(|| ApiError::NotExist("Sale does not exist".to_string()))
}

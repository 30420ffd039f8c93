use axum::extract::DefaultBodyLimit;
use axum::{middleware, Router};

use crate::auth::middleware::JwtSecret;
use crate::objects::routes as file_routes;
use crate::payments::routes as payment_routes;
use crate::purchase::routes as purchase_routes;
use crate::sales::routes as sale_routes;
use crate::state::AppState;

/// Inject the JWT secret into request extensions so the Claims extractor can find it.
async fn inject_jwt_secret(
    axum::extract::State(state): axum::extract::State<AppState>,
    mut req: axum::http::Request<axum::body::Body>,
    next: middleware::Next,
) -> axum::response::Response {
    req.extensions_mut()
        .insert(JwtSecret(state.jwt_secret.clone()));
    next.run(req).await
}

/// Build the full axum Router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    // Uploads are checked against the configured limit in the handler; the
    // extra byte lets an oversized body reach it and get the JSON error.
    let upload_limit = (state.max_upload_size_mb * 1024 * 1024 + 1) as usize;
    let upload_routes = Router::new()
        .route("/api/files", axum::routing::put(file_routes::put_file_route))
        .layer(DefaultBodyLimit::max(upload_limit));

    // Public routes (no auth required)
    let public_routes = Router::new()
        .route("/health", axum::routing::get(health_check))
        .route(
            "/api/paper/{contract_address}",
            axum::routing::get(sale_routes::get_sale_route),
        );

    // Authenticated routes (JWT required, validated by the Claims extractor)
    let authenticated_routes = Router::new()
        .route("/api/paper", axum::routing::post(sale_routes::register_sale_route))
        .route(
            "/api/paper/{contract_address}/download",
            axum::routing::post(purchase_routes::download_route),
        )
        .route(
            "/api/music/{contract_address}/key",
            axum::routing::post(purchase_routes::release_key_route),
        )
        .route(
            "/api/music/purchase",
            axum::routing::post(payment_routes::submit_payment_route),
        )
        .route(
            "/api/payments/{tx_hash}",
            axum::routing::get(payment_routes::get_payment_route),
        );

    Router::new()
        .merge(public_routes)
        .merge(upload_routes)
        .merge(authenticated_routes)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            inject_jwt_secret,
        ))
        .with_state(state)
}

/// Basic health check endpoint
async fn health_check() -> &'static str {
    "ok"
}

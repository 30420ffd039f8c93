use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;

use marketplace_server::config::{generate_config_template, Config, LedgerConfig};
use marketplace_server::ledger::bytecode::CanonicalBytecode;
use marketplace_server::ledger::rpc::RpcLedger;
use marketplace_server::ledger::SharedLedger;
use marketplace_server::objects::{FsObjectStore, SharedObjectStore};
use marketplace_server::payments::PurchaseReconciler;
use marketplace_server::sales::SaleContractTracker;
use marketplace_server::{auth, db, routes, scheduler, state};

/// Load the pinned sale contract bytecode, if an artifact is configured.
fn load_canonical_bytecode(ledger: &LedgerConfig) -> Result<Option<CanonicalBytecode>, String> {
    let Some(artifact) = ledger.contract_artifact.as_deref() else {
        return Ok(None);
    };
    let library = ledger
        .library_address
        .as_deref()
        .ok_or("ledger.library_address is required when ledger.contract_artifact is set")?;

    CanonicalBytecode::from_artifact(artifact, &ledger.library_placeholder, library).map(Some)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load config with layered precedence: defaults < TOML < env < CLI
    let config = Config::load()?;

    // Handle --generate-config: print template and exit
    if config.generate_config {
        print!("{}", generate_config_template());
        return Ok(());
    }

    // Initialize tracing/logging
    let env_filter = || {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("marketplace_server=info"))
    };
    if config.json_logs {
        tracing_subscriber::fmt().json().with_env_filter(env_filter()).init();
    } else {
        tracing_subscriber::fmt().pretty().with_env_filter(env_filter()).init();
    }

    tracing::info!("Marketplace server v{} starting", env!("CARGO_PKG_VERSION"));

    // Initialize SQLite database
    let db = db::init_db(&config.data_dir)?;

    // Load or generate JWT signing key (256-bit random, stored in data_dir)
    let jwt_secret = auth::jwt::load_or_generate_jwt_secret(&config.data_dir)?;

    let objects: SharedObjectStore = Arc::new(FsObjectStore::new(&config.data_dir)?);

    // The blocking HTTP client must be built off the async runtime
    let rpc_url = config.ledger.rpc_url.clone();
    let timeout = Duration::from_millis(config.ledger.request_timeout_ms);
    let ledger: SharedLedger = Arc::new(
        tokio::task::spawn_blocking(move || RpcLedger::new(&rpc_url, timeout)).await??,
    );
    tracing::info!(
        "Ledger node {} (timeout {} ms)",
        config.ledger.rpc_url,
        config.ledger.request_timeout_ms
    );

    // --- Reconciliation workers ---
    let tick_interval = Duration::from_secs(config.reconcile.tick_interval_secs);

    match load_canonical_bytecode(&config.ledger)? {
        Some(bytecode) => {
            tracing::info!("Sale contract pinned ({} bytes of code)", bytecode.len());
            let tracker = SaleContractTracker::new(
                db.clone(),
                ledger.clone(),
                Arc::new(bytecode),
                config.reconcile.sale_windows(),
            );
            scheduler::spawn_periodic("Sale contract tracker", tick_interval, move || tracker.tick());
        }
        None => {
            tracing::warn!(
                "No ledger.contract_artifact configured; sale registrations will not be confirmed"
            );
        }
    }

    let reconciler = PurchaseReconciler::new(
        db.clone(),
        ledger.clone(),
        config.reconcile.payment_windows(),
    );
    scheduler::spawn_periodic("Purchase reconciler", tick_interval, move || reconciler.tick());

    // Build application state and router
    let app_state = state::AppState::new(
        db,
        jwt_secret,
        ledger,
        objects,
        config.objects.max_upload_size_mb,
    );
    let app = routes::build_router(app_state);

    // Bind and serve
    let addr = format!("{}:{}", config.bind_address, config.port);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

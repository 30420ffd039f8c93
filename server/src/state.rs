use std::sync::Arc;

use crate::db::DbPool;
use crate::ledger::SharedLedger;
use crate::objects::SharedObjectStore;
use crate::purchase::PurchaseGate;

/// Shared application state passed to all handlers via axum State extractor.
#[derive(Clone)]
pub struct AppState {
    /// SQLite connection wrapped in Arc<Mutex>
    pub db: DbPool,
    /// JWT signing secret (256-bit random key)
    pub jwt_secret: Vec<u8>,
    /// Read-only ledger access, shared with the background reconcilers
    pub ledger: SharedLedger,
    /// Uploaded file bytes
    pub objects: SharedObjectStore,
    /// Purchase-gated key release and downloads
    pub gate: Arc<PurchaseGate>,
    /// Maximum upload size in megabytes
    pub max_upload_size_mb: u64,
}

impl AppState {
    pub fn new(
        db: DbPool,
        jwt_secret: Vec<u8>,
        ledger: SharedLedger,
        objects: SharedObjectStore,
        max_upload_size_mb: u64,
    ) -> Self {
        let gate = Arc::new(PurchaseGate::new(db.clone(), ledger.clone(), objects.clone()));
        Self {
            db,
            jwt_secret,
            ledger,
            objects,
            gate,
            max_upload_size_mb,
        }
    }
}

//! Buyer payments: submitted transaction hashes reconciled against the
//! purchase events the ledger recorded for them.

pub mod reconciler;
pub mod routes;
pub mod store;

pub use reconciler::PurchaseReconciler;

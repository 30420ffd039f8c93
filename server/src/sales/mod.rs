//! Sale registrations: sellers declare a deployment transaction for a file,
//! and the tracker turns it into a confirmed sale contract or rejects it.

pub mod routes;
pub mod store;
pub mod tracker;

pub use tracker::SaleContractTracker;

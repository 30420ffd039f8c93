pub mod gate;
pub mod routes;

pub use gate::{GateError, PurchaseGate};

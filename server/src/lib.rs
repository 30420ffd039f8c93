//! Marketplace content server library.
//! This crate exposes internal modules for integration testing.
//! The binary entry point is in main.rs.

pub mod auth;
pub mod config;
pub mod db;
pub mod envelope;
pub mod error;
pub mod ledger;
pub mod objects;
pub mod payments;
pub mod purchase;
pub mod reconcile;
pub mod routes;
pub mod sales;
pub mod scheduler;
pub mod state;

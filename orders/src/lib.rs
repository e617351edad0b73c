// marketplace_orders/src/lib.rs

//! Order and payment coordination for the marketplace.
//!
//! Checkout turns a request into a pending order and a settlement request on
//! the bus; the settlement consumer applies the ledger's results back onto the
//! order. Refunds travel the same path in reverse.

pub mod config;
pub mod consumer;
pub mod errors;
pub mod models;
pub mod pipelines;
pub mod services;
pub mod state;
pub mod store;
pub mod web;

pub use config::AppConfig;
pub use errors::{AppError, Result};
pub use state::AppState;

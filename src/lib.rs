//! Ledger Engine - monetary accounts with an immutable transaction history.

pub mod config;
pub mod engine;
pub mod error;
pub mod models;
pub mod observability;
pub mod services;

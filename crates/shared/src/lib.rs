//! Shared types, errors, and configuration for Kardex.
//!
//! This crate provides common types used across all other crates:
//! - Typed IDs and master-data codes
//! - Decimal precision policy for quantities, rates, and amounts
//! - Application-wide error types
//! - Configuration management (stock settings, precision, default accounts)

pub mod config;
pub mod error;
pub mod types;

pub use config::{AppConfig, RepostMode, StockSettings, ValuationMethod, ZeroRatePolicy};
pub use error::{AppError, AppResult};

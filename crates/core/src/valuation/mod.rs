//! Stock valuation.
//!
//! This module implements per-bin valuation:
//! - FIFO lot queues
//! - Moving-average and FIFO folding of movements
//! - The zero incoming rate policy

pub mod engine;
pub mod fifo;
pub mod method;

#[cfg(test)]
mod engine_props;

pub use engine::{BinSnapshot, BinState, Valuation, ValuationEngine};
pub use fifo::{FifoLot, FifoQueue};
pub use method::{Movement, MovementRate, ZeroRateStrategy, resolve_method};

//! Reposting of stock ledger entries.
//!
//! - A work queue of bins keyed by their earliest pending posting
//! - The scheduler that recomputes entries and follows rate dependencies
//! - Parallel replay verification of the bins it touched

mod queue;
mod scheduler;
mod verify;

#[cfg(test)]
mod scheduler_props;

pub use queue::{RepostItem, RepostQueue};
pub use scheduler::{MethodLookup, RepostReport, RepostScheduler};
pub use verify::ChainVerifier;

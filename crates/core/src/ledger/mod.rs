//! General ledger.
//!
//! This module provides:
//! - GL entry types and postings
//! - The append-only journal with diff-based regeneration and reversal
//! - Translation of vouchers into GL postings
//! - Account resolution and the trial balance

mod balance;
mod entry;
mod journal;
mod resolver;
mod translator;

pub use balance::{AccountBalance, TrialBalance};
pub use entry::{GlEntry, GlEntryKind, GlPosting};
pub use journal::{GlJournal, NetPostings};
pub use resolver::AccountResolver;
pub use translator::GlTranslator;

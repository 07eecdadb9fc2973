//! Movement descriptions and valuation policies.

use kardex_shared::{ValuationMethod, ZeroRatePolicy};
use rust_decimal::Decimal;

/// How the rate of a single movement is determined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MovementRate {
    /// Incoming at a known rate.
    Incoming(Decimal),
    /// Incoming carrying a fixed total value, e.g. the target side of a transfer.
    IncomingValue(Decimal),
    /// Outgoing at the bin's current valuation.
    OutgoingAtValuation,
    /// Outgoing at a known rate, e.g. a purchase return.
    OutgoingAt(Decimal),
}

impl MovementRate {
    /// Returns true for receipts into the bin.
    #[must_use]
    pub fn is_incoming(&self) -> bool {
        matches!(self, Self::Incoming(_) | Self::IncomingValue(_))
    }
}

/// A signed quantity movement to value against a bin.
#[derive(Debug, Clone, Copy)]
pub struct Movement {
    /// Signed quantity delta.
    pub qty: Decimal,
    /// Rate derivation.
    pub rate: MovementRate,
    /// Whether the line explicitly allows a zero incoming rate.
    pub allow_zero_valuation_rate: bool,
}

/// Decides whether an incoming movement may carry a zero rate.
pub trait ZeroRateStrategy {
    /// Returns true if a zero incoming rate is acceptable.
    fn permits_zero_rate(&self, line_allows: bool) -> bool;
}

impl ZeroRateStrategy for ZeroRatePolicy {
    fn permits_zero_rate(&self, line_allows: bool) -> bool {
        match self {
            Self::Blend => true,
            Self::RequireAllowance => line_allows,
        }
    }
}

/// Resolves the method of an item, falling back to the configured default.
#[must_use]
pub fn resolve_method(item_method: Option<ValuationMethod>, default: ValuationMethod) -> ValuationMethod {
    item_method.unwrap_or(default)
}

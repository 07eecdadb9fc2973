//! Business documents that move stock or bill it.
//!
//! - Voucher and line types
//! - Shape validation
//! - Return and billing resolution
//! - Charge allocation for landed costs
//! - The derived status machine

pub mod billing;
pub mod landed_cost;
pub mod returns;
pub mod status;
pub mod types;
pub mod validation;

pub use billing::BillingService;
pub use landed_cost::{ChargeAllocator, LandedCharge};
pub use returns::{ReturnRequest, ReturnResolver};
pub use status::StatusService;
pub use types::{
    AllocationBasis, DocStatus, LineCharge, OrderLineRef, Voucher, VoucherCharge, VoucherLine,
    VoucherStatus, VoucherType,
};
pub use validation::VoucherValidator;

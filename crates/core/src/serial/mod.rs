//! Serial number tracking.

pub mod allocator;
pub mod registry;

pub use allocator::{SerialAllocator, SeriesAllocator};
pub use registry::{SerialDirection, SerialMovement, SerialRegistry};

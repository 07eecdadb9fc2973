//! Item master data used by the engine.

use kardex_shared::ValuationMethod;
use kardex_shared::types::ItemCode;
use serde::{Deserialize, Serialize};

/// Stock item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    /// Item code.
    pub code: ItemCode,
    /// Valuation method; the configured default applies when unset.
    pub valuation_method: Option<ValuationMethod>,
    /// Whether every unit carries a serial number.
    pub has_serial_no: bool,
    /// Series used to allocate missing serial numbers.
    pub serial_series: Option<String>,
}

impl Item {
    /// Creates a plain item using the default valuation method.
    #[must_use]
    pub fn new(code: impl Into<ItemCode>) -> Self {
        Self {
            code: code.into(),
            valuation_method: None,
            has_serial_no: false,
            serial_series: None,
        }
    }

    /// Sets the valuation method.
    #[must_use]
    pub fn with_valuation_method(mut self, method: ValuationMethod) -> Self {
        self.valuation_method = Some(method);
        self
    }

    /// Marks the item serialized, allocating from `series` when needed.
    #[must_use]
    pub fn serialized(mut self, series: impl Into<String>) -> Self {
        self.has_serial_no = true;
        self.serial_series = Some(series.into());
        self
    }
}

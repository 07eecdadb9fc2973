//! Account lookup seam.

use kardex_shared::config::AccountDefaults;
use kardex_shared::types::{AccountCode, CostCenterCode, WarehouseCode};

/// Resolves the accounts the GL translator posts to.
pub trait AccountResolver: Send + Sync {
    /// Inventory account of a warehouse.
    fn inventory_account(&self, warehouse: &WarehouseCode) -> AccountCode;

    /// Clearing account between receipt and invoice.
    fn stock_received_but_not_billed(&self) -> AccountCode;

    /// Account absorbing valuation residuals.
    fn stock_adjustment(&self) -> AccountCode;

    /// Expense account for lines without their own.
    fn default_expense(&self) -> AccountCode;

    /// Supplier payable account.
    fn creditors(&self) -> AccountCode;

    /// Cost center for lines without their own.
    fn default_cost_center(&self) -> CostCenterCode;
}

impl AccountResolver for AccountDefaults {
    fn inventory_account(&self, warehouse: &WarehouseCode) -> AccountCode {
        self.warehouse_accounts
            .get(warehouse)
            .cloned()
            .unwrap_or_else(|| self.stock_in_hand.clone())
    }

    fn stock_received_but_not_billed(&self) -> AccountCode {
        self.stock_received_but_not_billed.clone()
    }

    fn stock_adjustment(&self) -> AccountCode {
        self.stock_adjustment.clone()
    }

    fn default_expense(&self) -> AccountCode {
        self.cost_of_goods_sold.clone()
    }

    fn creditors(&self) -> AccountCode {
        self.creditors.clone()
    }

    fn default_cost_center(&self) -> CostCenterCode {
        self.cost_center.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_warehouse_account_falls_back_to_stock_in_hand() {
        let mut defaults = AccountDefaults::default();
        defaults
            .warehouse_accounts
            .insert(WarehouseCode::from("Shop"), AccountCode::from("Stock - Shop"));

        assert_eq!(
            defaults.inventory_account(&WarehouseCode::from("Shop")),
            AccountCode::from("Stock - Shop")
        );
        assert_eq!(
            defaults.inventory_account(&WarehouseCode::from("Stores")),
            defaults.stock_in_hand
        );
    }
}

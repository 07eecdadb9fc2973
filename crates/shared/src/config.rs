//! Application configuration management.
//!
//! Settings that the valuation and repost engine depends on are threaded
//! through every call explicitly; nothing reads ambient global state.

use std::collections::HashMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::types::id::{AccountCode, CostCenterCode, WarehouseCode};
use crate::types::precision::{MAX_PRECISION, Precision};

/// Application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Stock valuation and posting settings.
    pub stock: StockSettings,
    /// Rounding policy.
    pub precision: Precision,
    /// Default accounts used by the GL posting translator.
    pub accounts: AccountDefaults,
}

/// Valuation method of an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValuationMethod {
    /// First in, first out lot consumption.
    Fifo,
    /// Weighted moving average.
    MovingAverage,
}

/// How a zero incoming rate is treated.
///
/// Receipts at rate zero are accepted and blended into the valuation by
/// default. `RequireAllowance` tightens this so that only lines flagged
/// `allow_zero_valuation_rate` may carry a zero rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZeroRatePolicy {
    /// Accept zero rates and blend them like any other rate.
    Blend,
    /// Reject zero rates unless the line explicitly allows them.
    RequireAllowance,
}

/// When downstream entries are reposted after a backdated insertion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepostMode {
    /// Repost synchronously inside the triggering operation.
    Immediate,
    /// Compute the triggering voucher only; leave a pending marker for the rest.
    Deferred,
}

/// Stock settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StockSettings {
    /// Whether a bin may go below zero quantity.
    pub allow_negative_stock: bool,
    /// Percentage by which received or returned qty may exceed the reference qty.
    pub over_receipt_allowance: Decimal,
    /// Percentage by which billed qty may exceed the billable qty.
    pub over_billing_allowance: Decimal,
    /// Valuation method for items that do not set their own.
    pub default_valuation_method: ValuationMethod,
    /// Zero incoming rate policy.
    pub zero_rate_policy: ZeroRatePolicy,
    /// Whether rejected quantities are valued at the line rate.
    pub value_rejected_materials: bool,
    /// Whether stock movements post to the general ledger.
    pub perpetual_inventory: bool,
    /// Repost timing.
    pub repost_mode: RepostMode,
    /// Whether reposted chains are replayed from scratch and compared.
    pub verify_chains: bool,
    /// Upper bound on repost passes over a single bin in one operation.
    pub max_repost_passes: usize,
}

impl Default for StockSettings {
    fn default() -> Self {
        Self {
            allow_negative_stock: false,
            over_receipt_allowance: Decimal::ZERO,
            over_billing_allowance: Decimal::ZERO,
            default_valuation_method: ValuationMethod::Fifo,
            zero_rate_policy: ZeroRatePolicy::Blend,
            value_rejected_materials: false,
            perpetual_inventory: true,
            repost_mode: RepostMode::Immediate,
            verify_chains: true,
            max_repost_passes: default_max_repost_passes(),
        }
    }
}

fn default_max_repost_passes() -> usize {
    64
}

/// Default accounts of the company.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AccountDefaults {
    /// Inventory account for warehouses without their own.
    pub stock_in_hand: AccountCode,
    /// Clearing account credited on receipt, debited on billing.
    pub stock_received_but_not_billed: AccountCode,
    /// Account absorbing valuation residuals.
    pub stock_adjustment: AccountCode,
    /// Expense account for deliveries and issues.
    pub cost_of_goods_sold: AccountCode,
    /// Supplier payable account.
    pub creditors: AccountCode,
    /// Cost center used when a line does not carry one.
    pub cost_center: CostCenterCode,
    /// Inventory account per warehouse.
    pub warehouse_accounts: HashMap<WarehouseCode, AccountCode>,
}

impl Default for AccountDefaults {
    fn default() -> Self {
        Self {
            stock_in_hand: AccountCode::from("Stock In Hand"),
            stock_received_but_not_billed: AccountCode::from("Stock Received But Not Billed"),
            stock_adjustment: AccountCode::from("Stock Adjustment"),
            cost_of_goods_sold: AccountCode::from("Cost of Goods Sold"),
            creditors: AccountCode::from("Creditors"),
            cost_center: CostCenterCode::from("Main"),
            warehouse_accounts: HashMap::new(),
        }
    }
}

impl AppConfig {
    /// Loads configuration from environment and config files.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration cannot be loaded.
    pub fn load() -> AppResult<Self> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".to_string());

        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{run_mode}")).required(false))
            .add_source(config::Environment::with_prefix("KARDEX").separator("__"))
            .build()?;

        let app_config: Self = config.try_deserialize()?;
        app_config.validate()?;
        Ok(app_config)
    }

    /// Checks value ranges that deserialization cannot express.
    ///
    /// # Errors
    ///
    /// Returns `AppError::InvalidSetting` for the first offending value.
    pub fn validate(&self) -> AppResult<()> {
        if self.stock.over_receipt_allowance.is_sign_negative() {
            return Err(AppError::InvalidSetting {
                setting: "stock.over_receipt_allowance",
                reason: "must not be negative".to_string(),
            });
        }
        if self.stock.over_billing_allowance.is_sign_negative() {
            return Err(AppError::InvalidSetting {
                setting: "stock.over_billing_allowance",
                reason: "must not be negative".to_string(),
            });
        }
        if self.stock.max_repost_passes == 0 {
            return Err(AppError::InvalidSetting {
                setting: "stock.max_repost_passes",
                reason: "must be at least 1".to_string(),
            });
        }
        for (setting, places) in [
            ("precision.currency", self.precision.currency),
            ("precision.rate", self.precision.rate),
            ("precision.qty", self.precision.qty),
        ] {
            if places > MAX_PRECISION {
                return Err(AppError::InvalidSetting {
                    setting,
                    reason: format!("must be at most {MAX_PRECISION}"),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use rust_decimal_macros::dec;

    #[test]
    fn test_defaults_are_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.stock.default_valuation_method, ValuationMethod::Fifo);
        assert_eq!(config.stock.zero_rate_policy, ZeroRatePolicy::Blend);
        assert_eq!(config.stock.repost_mode, RepostMode::Immediate);
        assert!(!config.stock.allow_negative_stock);
        assert!(config.stock.perpetual_inventory);
    }

    #[rstest]
    #[case::negative_receipt_allowance("stock.over_receipt_allowance")]
    #[case::negative_billing_allowance("stock.over_billing_allowance")]
    fn test_negative_allowance_rejected(#[case] setting: &str) {
        let mut config = AppConfig::default();
        if setting == "stock.over_receipt_allowance" {
            config.stock.over_receipt_allowance = dec!(-1);
        } else {
            config.stock.over_billing_allowance = dec!(-1);
        }
        match config.validate() {
            Err(AppError::InvalidSetting { setting: got, .. }) => assert_eq!(got, setting),
            other => panic!("expected InvalidSetting, got {other:?}"),
        }
    }

    #[test]
    fn test_precision_out_of_range_rejected() {
        let mut config = AppConfig::default();
        config.precision.rate = 29;
        assert!(matches!(
            config.validate(),
            Err(AppError::InvalidSetting {
                setting: "precision.rate",
                ..
            })
        ));
    }

    #[test]
    fn test_zero_repost_passes_rejected() {
        let mut config = AppConfig::default();
        config.stock.max_repost_passes = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_deserialize_partial_stock_settings() {
        let settings: StockSettings = serde_json::from_str(
            r#"{"allow_negative_stock": true, "default_valuation_method": "moving_average"}"#,
        )
        .unwrap();
        assert!(settings.allow_negative_stock);
        assert_eq!(
            settings.default_valuation_method,
            ValuationMethod::MovingAverage
        );
        assert_eq!(settings.max_repost_passes, 64);
    }
}

//! Voucher domain types.

use std::fmt;

use chrono::NaiveDateTime;
use kardex_shared::types::{
    AccountCode, CostCenterCode, ItemCode, Precision, SerialNo, VoucherId, VoucherLineId,
    WarehouseCode,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Kind of business document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoucherType {
    /// Goods received from a supplier.
    PurchaseReceipt,
    /// Supplier bill against a receipt.
    PurchaseInvoice,
    /// Goods delivered to a customer, or moved to an internal warehouse.
    DeliveryNote,
    /// Inter-warehouse move.
    StockTransfer,
    /// Stock added without a supplier.
    MaterialReceipt,
    /// Stock consumed or written off.
    MaterialIssue,
}

impl VoucherType {
    /// Returns the string representation of the type.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PurchaseReceipt => "purchase_receipt",
            Self::PurchaseInvoice => "purchase_invoice",
            Self::DeliveryNote => "delivery_note",
            Self::StockTransfer => "stock_transfer",
            Self::MaterialReceipt => "material_receipt",
            Self::MaterialIssue => "material_issue",
        }
    }

    /// Returns true if the voucher writes stock ledger entries.
    #[must_use]
    pub fn moves_stock(&self) -> bool {
        !matches!(self, Self::PurchaseInvoice)
    }

    /// Returns true if the type supports return vouchers.
    #[must_use]
    pub fn allows_returns(&self) -> bool {
        matches!(
            self,
            Self::PurchaseReceipt | Self::DeliveryNote | Self::PurchaseInvoice
        )
    }
}

impl fmt::Display for VoucherType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Document lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocStatus {
    /// Editable, not yet posted.
    Draft,
    /// Posted to the ledgers.
    Submitted,
    /// Reversed.
    Cancelled,
}

/// Business status derived from returns, billing and closing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoucherStatus {
    /// Not submitted.
    Draft,
    /// Submitted, nothing billed or returned.
    ToBill,
    /// Some of the amount is billed.
    PartlyBilled,
    /// Some of the quantity is returned.
    PartlyReturned,
    /// Fully billed, or nothing to bill.
    Completed,
    /// Fully returned.
    ReturnIssued,
    /// Closed by the user.
    Closed,
    /// Cancelled.
    Cancelled,
}

impl VoucherStatus {
    /// Returns the string representation of the status.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::ToBill => "to_bill",
            Self::PartlyBilled => "partly_billed",
            Self::PartlyReturned => "partly_returned",
            Self::Completed => "completed",
            Self::ReturnIssued => "return_issued",
            Self::Closed => "closed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for VoucherStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How a charge is spread over lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllocationBasis {
    /// Proportional to line amount.
    Amount,
    /// Proportional to accepted qty.
    Qty,
}

/// A valuation charge carried by one line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineCharge {
    /// Account credited with the charge.
    pub account: AccountCode,
    /// Charge amount (may be negative).
    pub amount: Decimal,
}

/// A voucher-level charge included in valuation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoucherCharge {
    /// Account credited with the charge.
    pub account: AccountCode,
    /// Total charge amount.
    pub amount: Decimal,
    /// Allocation basis over lines.
    pub basis: AllocationBasis,
}

/// Reference to a purchase order line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLineRef {
    /// The order line.
    pub line: VoucherLineId,
    /// Quantity ordered.
    pub ordered_qty: Decimal,
}

/// One line of a voucher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoucherLine {
    /// Line id.
    pub id: VoucherLineId,
    /// The item.
    pub item: ItemCode,
    /// Source warehouse, or the accepted warehouse of a receipt.
    pub warehouse: Option<WarehouseCode>,
    /// Target warehouse of a transfer or internal delivery.
    pub target_warehouse: Option<WarehouseCode>,
    /// Accepted quantity (negative on returns).
    pub qty: Decimal,
    /// Quantity received; accepted plus rejected.
    pub received_qty: Decimal,
    /// Rejected quantity (negative on returns).
    pub rejected_qty: Decimal,
    /// Warehouse holding rejected quantity.
    pub rejected_warehouse: Option<WarehouseCode>,
    /// Unit rate.
    pub rate: Decimal,
    /// Cost center for GL postings.
    pub cost_center: Option<CostCenterCode>,
    /// Expense account for deliveries and issues.
    pub expense_account: Option<AccountCode>,
    /// Valuation charges allocated to the line.
    pub charges: Vec<LineCharge>,
    /// Serial numbers of the accepted quantity.
    pub serial_nos: Vec<SerialNo>,
    /// Serial numbers of the rejected quantity.
    pub rejected_serial_nos: Vec<SerialNo>,
    /// Whether a zero valuation rate is acceptable.
    pub allow_zero_valuation_rate: bool,
    /// Line of the voucher this line returns or bills.
    pub against_line: Option<VoucherLineId>,
    /// Purchase order line this line receives against.
    pub order_line: Option<OrderLineRef>,
    /// Accepted quantity returned so far.
    pub returned_qty: Decimal,
    /// Rejected quantity returned so far.
    pub returned_rejected_qty: Decimal,
    /// Quantity billed so far.
    pub billed_qty: Decimal,
    /// Amount billed so far.
    pub billed_amt: Decimal,
}

impl VoucherLine {
    /// Creates a line for `qty` of `item` at `rate`.
    #[must_use]
    pub fn new(item: impl Into<ItemCode>, qty: Decimal, rate: Decimal) -> Self {
        Self {
            id: VoucherLineId::new(),
            item: item.into(),
            warehouse: None,
            target_warehouse: None,
            qty,
            received_qty: Decimal::ZERO,
            rejected_qty: Decimal::ZERO,
            rejected_warehouse: None,
            rate,
            cost_center: None,
            expense_account: None,
            charges: Vec::new(),
            serial_nos: Vec::new(),
            rejected_serial_nos: Vec::new(),
            allow_zero_valuation_rate: false,
            against_line: None,
            order_line: None,
            returned_qty: Decimal::ZERO,
            returned_rejected_qty: Decimal::ZERO,
            billed_qty: Decimal::ZERO,
            billed_amt: Decimal::ZERO,
        }
    }

    /// Sets the (source or accepted) warehouse.
    #[must_use]
    pub fn with_warehouse(mut self, warehouse: impl Into<WarehouseCode>) -> Self {
        self.warehouse = Some(warehouse.into());
        self
    }

    /// Sets the target warehouse.
    #[must_use]
    pub fn with_target_warehouse(mut self, warehouse: impl Into<WarehouseCode>) -> Self {
        self.target_warehouse = Some(warehouse.into());
        self
    }

    /// Sets rejected quantity and its warehouse.
    #[must_use]
    pub fn with_rejected(mut self, qty: Decimal, warehouse: impl Into<WarehouseCode>) -> Self {
        self.rejected_qty = qty;
        self.rejected_warehouse = Some(warehouse.into());
        self
    }

    /// Sets the received quantity.
    #[must_use]
    pub fn with_received_qty(mut self, qty: Decimal) -> Self {
        self.received_qty = qty;
        self
    }

    /// Sets the cost center.
    #[must_use]
    pub fn with_cost_center(mut self, cost_center: impl Into<CostCenterCode>) -> Self {
        self.cost_center = Some(cost_center.into());
        self
    }

    /// Sets the expense account.
    #[must_use]
    pub fn with_expense_account(mut self, account: impl Into<AccountCode>) -> Self {
        self.expense_account = Some(account.into());
        self
    }

    /// Sets the accepted serial numbers.
    #[must_use]
    pub fn with_serial_nos<S: Into<SerialNo>>(mut self, serials: impl IntoIterator<Item = S>) -> Self {
        self.serial_nos = serials.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the rejected serial numbers.
    #[must_use]
    pub fn with_rejected_serial_nos<S: Into<SerialNo>>(
        mut self,
        serials: impl IntoIterator<Item = S>,
    ) -> Self {
        self.rejected_serial_nos = serials.into_iter().map(Into::into).collect();
        self
    }

    /// Adds a valuation charge.
    #[must_use]
    pub fn with_charge(mut self, account: impl Into<AccountCode>, amount: Decimal) -> Self {
        self.charges.push(LineCharge {
            account: account.into(),
            amount,
        });
        self
    }

    /// Links the line to an order line.
    #[must_use]
    pub fn with_order_line(mut self, line: VoucherLineId, ordered_qty: Decimal) -> Self {
        self.order_line = Some(OrderLineRef { line, ordered_qty });
        self
    }

    /// Links the line to the line it returns or bills.
    #[must_use]
    pub fn against(mut self, line: VoucherLineId) -> Self {
        self.against_line = Some(line);
        self
    }

    /// Accepts a zero valuation rate for this line.
    #[must_use]
    pub fn allowing_zero_valuation_rate(mut self) -> Self {
        self.allow_zero_valuation_rate = true;
        self
    }

    /// Line amount: accepted qty times rate.
    #[must_use]
    pub fn amount(&self, precision: &Precision) -> Decimal {
        precision.value_of(self.qty, self.rate)
    }

    /// Sum of valuation charges.
    #[must_use]
    pub fn charges_total(&self) -> Decimal {
        self.charges.iter().map(|charge| charge.amount).sum()
    }

    /// Rate of the accepted quantity including valuation charges.
    #[must_use]
    pub fn valuation_rate(&self, precision: &Precision) -> Decimal {
        let charges = self.charges_total();
        if charges.is_zero() || self.qty.is_zero() {
            return self.rate;
        }
        precision.rate(self.rate + charges / self.qty)
    }
}

/// A stock or billing document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Voucher {
    /// Voucher id.
    pub id: VoucherId,
    /// Document kind.
    pub voucher_type: VoucherType,
    /// Posting date and time.
    pub posted_at: NaiveDateTime,
    /// Lifecycle state.
    pub doc_status: DocStatus,
    /// Business status.
    pub status: VoucherStatus,
    /// Whether this voucher returns (or debits) another.
    pub is_return: bool,
    /// The voucher this one returns or bills.
    pub against: Option<VoucherId>,
    /// Lines.
    pub lines: Vec<VoucherLine>,
    /// Voucher-level valuation charges.
    pub charges: Vec<VoucherCharge>,
    /// Percentage of the net amount billed.
    pub per_billed: Decimal,
    /// Percentage of received quantity returned.
    pub per_returned: Decimal,
}

impl Voucher {
    /// Creates a draft voucher.
    #[must_use]
    pub fn new(voucher_type: VoucherType, posted_at: NaiveDateTime) -> Self {
        Self {
            id: VoucherId::new(),
            voucher_type,
            posted_at,
            doc_status: DocStatus::Draft,
            status: VoucherStatus::Draft,
            is_return: false,
            against: None,
            lines: Vec::new(),
            charges: Vec::new(),
            per_billed: Decimal::ZERO,
            per_returned: Decimal::ZERO,
        }
    }

    /// Creates a draft purchase receipt.
    #[must_use]
    pub fn purchase_receipt(posted_at: NaiveDateTime) -> Self {
        Self::new(VoucherType::PurchaseReceipt, posted_at)
    }

    /// Creates a draft delivery note.
    #[must_use]
    pub fn delivery_note(posted_at: NaiveDateTime) -> Self {
        Self::new(VoucherType::DeliveryNote, posted_at)
    }

    /// Creates a draft stock transfer.
    #[must_use]
    pub fn stock_transfer(posted_at: NaiveDateTime) -> Self {
        Self::new(VoucherType::StockTransfer, posted_at)
    }

    /// Creates a draft material receipt.
    #[must_use]
    pub fn material_receipt(posted_at: NaiveDateTime) -> Self {
        Self::new(VoucherType::MaterialReceipt, posted_at)
    }

    /// Creates a draft material issue.
    #[must_use]
    pub fn material_issue(posted_at: NaiveDateTime) -> Self {
        Self::new(VoucherType::MaterialIssue, posted_at)
    }

    /// Adds a line.
    #[must_use]
    pub fn with_line(mut self, line: VoucherLine) -> Self {
        self.lines.push(line);
        self
    }

    /// Adds a voucher-level valuation charge.
    #[must_use]
    pub fn with_charge(
        mut self,
        account: impl Into<AccountCode>,
        amount: Decimal,
        basis: AllocationBasis,
    ) -> Self {
        self.charges.push(VoucherCharge {
            account: account.into(),
            amount,
            basis,
        });
        self
    }

    /// Marks the voucher as a return against `original`.
    #[must_use]
    pub fn as_return_against(mut self, original: VoucherId) -> Self {
        self.is_return = true;
        self.against = Some(original);
        self
    }

    /// Returns true once submitted and not cancelled.
    #[must_use]
    pub fn is_submitted(&self) -> bool {
        self.doc_status == DocStatus::Submitted
    }

    /// Finds a line by id.
    #[must_use]
    pub fn line(&self, id: VoucherLineId) -> Option<&VoucherLine> {
        self.lines.iter().find(|line| line.id == id)
    }

    /// Finds a line by id, mutably.
    pub fn line_mut(&mut self, id: VoucherLineId) -> Option<&mut VoucherLine> {
        self.lines.iter_mut().find(|line| line.id == id)
    }

    /// Total accepted amount.
    #[must_use]
    pub fn total_amount(&self, precision: &Precision) -> Decimal {
        self.lines.iter().map(|line| line.amount(precision)).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn at() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 2, 1)
            .unwrap()
            .and_hms_opt(8, 30, 0)
            .unwrap()
    }

    #[test]
    fn test_valuation_rate_includes_charges() {
        let line = VoucherLine::new("A", dec!(100), dec!(275)).with_charge("Freight", dec!(-2500));
        assert_eq!(line.valuation_rate(&Precision::default()), dec!(250));
        assert_eq!(line.amount(&Precision::default()), dec!(27500));
    }

    #[test]
    fn test_valuation_rate_without_charges() {
        let line = VoucherLine::new("A", dec!(3), dec!(10.5));
        assert_eq!(line.valuation_rate(&Precision::default()), dec!(10.5));
    }

    #[test]
    fn test_builder() {
        let line = VoucherLine::new("A", dec!(1), dec!(1))
            .with_warehouse("Stores")
            .with_rejected(dec!(1), "Rejected")
            .with_serial_nos(["SN-1"]);
        let voucher = Voucher::purchase_receipt(at()).with_line(line.clone());

        assert_eq!(voucher.doc_status, DocStatus::Draft);
        assert_eq!(voucher.status, VoucherStatus::Draft);
        assert_eq!(voucher.line(line.id).unwrap().serial_nos, vec![SerialNo::from("SN-1")]);
        assert!(!voucher.is_return);
    }

    #[test]
    fn test_type_capabilities() {
        assert!(VoucherType::PurchaseReceipt.moves_stock());
        assert!(!VoucherType::PurchaseInvoice.moves_stock());
        assert!(VoucherType::DeliveryNote.allows_returns());
        assert!(!VoucherType::StockTransfer.allows_returns());
        assert_eq!(VoucherStatus::ReturnIssued.to_string(), "return_issued");
    }
}

//! Account balances and the trial balance.

use std::collections::BTreeMap;

use kardex_shared::types::AccountCode;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::entry::GlEntry;

/// Debit and credit totals of one account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountBalance {
    /// The account.
    pub account: AccountCode,
    /// Total debit amount.
    pub debit_total: Decimal,
    /// Total credit amount.
    pub credit_total: Decimal,
    /// Debit minus credit.
    pub balance: Decimal,
}

impl AccountBalance {
    /// Creates an empty balance.
    #[must_use]
    pub fn new(account: AccountCode) -> Self {
        Self {
            account,
            debit_total: Decimal::ZERO,
            credit_total: Decimal::ZERO,
            balance: Decimal::ZERO,
        }
    }

    /// Adds a debit amount.
    pub fn add_debit(&mut self, amount: Decimal) {
        self.debit_total += amount;
        self.balance = self.debit_total - self.credit_total;
    }

    /// Adds a credit amount.
    pub fn add_credit(&mut self, amount: Decimal) {
        self.credit_total += amount;
        self.balance = self.debit_total - self.credit_total;
    }
}

/// Balances of every account over the non-cancelled GL entries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrialBalance {
    accounts: BTreeMap<AccountCode, AccountBalance>,
}

impl TrialBalance {
    /// Builds the trial balance of `entries`.
    pub fn from_entries<'a>(entries: impl IntoIterator<Item = &'a GlEntry>) -> Self {
        let mut accounts: BTreeMap<AccountCode, AccountBalance> = BTreeMap::new();
        for entry in entries.into_iter().filter(|e| !e.is_cancelled) {
            let balance = accounts
                .entry(entry.account.clone())
                .or_insert_with(|| AccountBalance::new(entry.account.clone()));
            balance.add_debit(entry.debit);
            balance.add_credit(entry.credit);
        }
        Self { accounts }
    }

    /// Balance of one account, if it has any entry.
    #[must_use]
    pub fn account(&self, account: &AccountCode) -> Option<&AccountBalance> {
        self.accounts.get(account)
    }

    /// Net balance of one account (zero if unused).
    #[must_use]
    pub fn balance_of(&self, account: &AccountCode) -> Decimal {
        self.account(account).map_or(Decimal::ZERO, |b| b.balance)
    }

    /// Every account balance, ordered by account.
    pub fn accounts(&self) -> impl Iterator<Item = &AccountBalance> {
        self.accounts.values()
    }

    /// Sum of debits.
    #[must_use]
    pub fn total_debit(&self) -> Decimal {
        self.accounts.values().map(|b| b.debit_total).sum()
    }

    /// Sum of credits.
    #[must_use]
    pub fn total_credit(&self) -> Decimal {
        self.accounts.values().map(|b| b.credit_total).sum()
    }

    /// Returns true if debits equal credits.
    #[must_use]
    pub fn is_balanced(&self) -> bool {
        self.total_debit() == self.total_credit()
    }
}

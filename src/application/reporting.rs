use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{Account, AccountId, AccountKind, Money};

/// One row of the account listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountListing {
    pub account_id: AccountId,
    pub kind: AccountKind,
    pub balance: Money,
    pub created_at: DateTime<Utc>,
}

impl From<&Account> for AccountListing {
    fn from(account: &Account) -> Self {
        Self {
            account_id: account.id.clone(),
            kind: account.kind(),
            balance: account.balance,
            created_at: account.created_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerSummary {
    pub total_accounts: usize,
    pub total_balance: Money,
}

/// Credits and debits logged since `since`. `total_withdrawals` is negative (or zero).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyTotals {
    pub since: DateTime<Utc>,
    pub total_deposits: Money,
    pub total_withdrawals: Money,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MostActiveAccount {
    pub account_id: AccountId,
    pub transaction_count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HighestBalanceAccount {
    pub account_id: AccountId,
    pub balance: Money,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ActivityReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub most_active: Option<MostActiveAccount>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub highest_balance: Option<HighestBalanceAccount>,
}

/// Outcome of the monthly sweep for one account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeeApplication {
    pub account_id: AccountId,
    pub kind: AccountKind,
    /// Positive for interest, negative for a fee, zero when nothing changed
    pub amount: Money,
    pub balance: Money,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeeFailure {
    pub account_id: AccountId,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FeeSweepReport {
    pub applied: Vec<FeeApplication>,
    pub failed: Vec<FeeFailure>,
}

impl FeeSweepReport {
    /// Saturates instead of overflowing.
    pub fn total_interest(&self) -> Money {
        self.applied
            .iter()
            .map(|a| a.amount)
            .filter(Money::is_positive)
            .fold(Money::ZERO, Money::saturating_add)
    }

    pub fn total_fees(&self) -> Money {
        self.applied
            .iter()
            .map(|a| a.amount)
            .filter(Money::is_negative)
            .fold(Money::ZERO, Money::saturating_add)
    }
}

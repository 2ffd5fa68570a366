use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::Money;

/// Ledger-wide policy constants handed to the account variants.
///
/// The defaults are the reference bank rules; a deployment can override any of
/// them from a JSON policy file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerPolicy {
    /// Savings balances may not drop below this after a withdrawal.
    pub minimum_balance: Money,
    /// Checking balances may not drop below this after a withdrawal.
    pub overdraft_limit: Money,
    /// Flat fee debited from every Checking account by the monthly sweep.
    pub monthly_fee: Money,
    /// Interest rate given to Savings accounts opened without an explicit rate.
    pub default_interest_rate: Decimal,
}

impl Default for LedgerPolicy {
    fn default() -> Self {
        Self {
            minimum_balance: Money::from_cents(10_000),
            overdraft_limit: Money::from_cents(-10_000),
            monthly_fee: Money::from_cents(1_200),
            default_interest_rate: Decimal::new(25, 3),
        }
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{AccountId, Money};

pub type TransferId = i64;

/// Summary record of a completed transfer, stored alongside the two log entries
/// it produced. Immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferRecord {
    /// Assigned by the repository
    pub id: TransferId,
    /// Source account (balance decreased)
    pub from_account: AccountId,
    /// Destination account (balance increased)
    pub to_account: AccountId,
    /// Always positive
    pub amount: Money,
    pub timestamp: DateTime<Utc>,
}

impl TransferRecord {
    pub fn new(
        from_account: impl Into<AccountId>,
        to_account: impl Into<AccountId>,
        amount: Money,
        timestamp: DateTime<Utc>,
    ) -> Self {
        assert!(amount.is_positive(), "Transfer amount must be positive");
        Self {
            id: 0,
            from_account: from_account.into(),
            to_account: to_account.into(),
            amount,
            timestamp,
        }
    }

    pub fn involves(&self, account_id: &str) -> bool {
        self.from_account == account_id || self.to_account == account_id
    }
}

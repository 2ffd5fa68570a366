use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{AccountId, Money};

pub type EntryId = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EntryKind {
    Deposit,
    Withdrawal,
    Transfer,
}

impl EntryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryKind::Deposit => "DEPOSIT",
            EntryKind::Withdrawal => "WITHDRAWAL",
            EntryKind::Transfer => "TRANSFER",
        }
    }

    /// Kind implied by the sign of an amount: credits are deposits, debits withdrawals.
    pub fn from_sign(amount: Money) -> Self {
        if amount.is_positive() {
            EntryKind::Deposit
        } else {
            EntryKind::Withdrawal
        }
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for EntryKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DEPOSIT" => Ok(EntryKind::Deposit),
            "WITHDRAWAL" => Ok(EntryKind::Withdrawal),
            "TRANSFER" => Ok(EntryKind::Transfer),
            other => Err(format!("Invalid entry type: {}", other)),
        }
    }
}

/// One immutable line of an account's transaction log.
/// Entries are only ever appended; the sign of `amount` says which way money moved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Surrogate id, 0 until the repository assigns one
    pub id: EntryId,
    pub account_id: AccountId,
    /// Positive = credit, negative = debit
    pub amount: Money,
    pub timestamp: DateTime<Utc>,
    pub kind: EntryKind,
    /// Counterparty of a transfer leg
    pub related_account_id: Option<AccountId>,
    pub description: String,
}

impl LogEntry {
    /// A deposit or withdrawal entry; the kind follows the amount's sign.
    pub fn movement(
        account_id: impl Into<AccountId>,
        amount: Money,
        timestamp: DateTime<Utc>,
        description: impl Into<String>,
    ) -> Self {
        assert!(!amount.is_zero(), "Log entry amount must be non-zero");
        Self {
            id: 0,
            account_id: account_id.into(),
            amount,
            timestamp,
            kind: EntryKind::from_sign(amount),
            related_account_id: None,
            description: description.into(),
        }
    }

    /// The two legs of a transfer: a debit on `from` and a credit on `to`.
    pub fn transfer_legs(
        from: &str,
        to: &str,
        amount: Money,
        timestamp: DateTime<Utc>,
    ) -> (Self, Self) {
        assert!(amount.is_positive(), "Transfer amount must be positive");
        let debit = Self {
            id: 0,
            account_id: from.to_string(),
            amount: -amount,
            timestamp,
            kind: EntryKind::Transfer,
            related_account_id: Some(to.to_string()),
            description: format!("Transfer to {}", to),
        };
        let credit = Self {
            id: 0,
            account_id: to.to_string(),
            amount,
            timestamp,
            kind: EntryKind::Transfer,
            related_account_id: Some(from.to_string()),
            description: format!("Transfer from {}", from),
        };
        (debit, credit)
    }

    pub fn is_credit(&self) -> bool {
        self.amount.is_positive()
    }
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.kind, &self.related_account_id) {
            (EntryKind::Transfer, Some(related)) => write!(
                f,
                "{}: {} - ${} transferred {} account {}",
                self.timestamp.format("%Y-%m-%d %H:%M:%S"),
                self.account_id,
                self.amount.abs(),
                if self.is_credit() { "from" } else { "to" },
                related
            ),
            _ => write!(
                f,
                "{}: {} - ${} {}",
                self.timestamp.format("%Y-%m-%d %H:%M:%S"),
                self.account_id,
                self.amount.abs(),
                if self.is_credit() { "deposit" } else { "withdrawal" }
            ),
        }
    }
}

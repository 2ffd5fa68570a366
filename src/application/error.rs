use thiserror::Error;

use crate::domain::{AccountError, Money, UnknownAccountKind};

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Account {0} not found")]
    AccountNotFound(String),

    #[error("Account already exists: {0}")]
    AccountAlreadyExists(String),

    #[error("Insufficient funds in account {account_id}: requested {requested}, available {available}")]
    InsufficientFunds {
        account_id: String,
        requested: Money,
        available: Money,
    },

    #[error("Account {account_id} exceeded its overdraft limit: requested {requested}, available {available}")]
    OverdraftLimitExceeded {
        account_id: String,
        requested: Money,
        available: Money,
    },

    #[error("Invalid account kind: {0}")]
    InvalidAccountKind(String),

    #[error("Cannot transfer from account {0} to itself")]
    SameAccount(String),

    #[error("Ledger error: {0}")]
    Ledger(String),

    #[error("Failed to write activity log: {0}")]
    ActivityLog(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] anyhow::Error),
}

impl From<AccountError> for LedgerError {
    fn from(err: AccountError) -> Self {
        match err {
            AccountError::InvalidAmount { amount } => {
                LedgerError::InvalidAmount(format!("Amount must be positive, got {}", amount))
            }
            AccountError::InsufficientFunds {
                account_id,
                requested,
                available,
            } => LedgerError::InsufficientFunds {
                account_id,
                requested,
                available,
            },
            AccountError::OverdraftLimitExceeded {
                account_id,
                requested,
                available,
            } => LedgerError::OverdraftLimitExceeded {
                account_id,
                requested,
                available,
            },
            AccountError::AmountOutOfRange { account_id, amount } => {
                LedgerError::InvalidAmount(format!(
                    "Amount {} is out of range for the balance of account {}",
                    amount, account_id
                ))
            }
        }
    }
}

impl From<UnknownAccountKind> for LedgerError {
    fn from(err: UnknownAccountKind) -> Self {
        LedgerError::InvalidAccountKind(err.0)
    }
}

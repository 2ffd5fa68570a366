use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::{Account, AccountId, LogEntry, Money};

/// Sum of all logged amounts for one account. Saturates at the decimal range, so
/// an overflowing log shows up as a mismatch rather than a panic.
/// Because opening balances are logged as an initial deposit, this equals the
/// account's stored balance whenever the log is complete.
pub fn compute_balance(account_id: &str, entries: &[LogEntry]) -> Money {
    entries
        .iter()
        .filter(|entry| entry.account_id == account_id)
        .map(|entry| entry.amount)
        .fold(Money::ZERO, Money::saturating_add)
}

/// Logged totals for every account that has entries.
pub fn compute_all_balances(entries: &[LogEntry]) -> HashMap<AccountId, Money> {
    let mut balances: HashMap<AccountId, Money> = HashMap::new();

    for entry in entries {
        let balance = balances.entry(entry.account_id.clone()).or_default();
        *balance = balance.saturating_add(entry.amount);
    }

    balances
}

/// An account whose stored balance disagrees with its log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceMismatch {
    pub account_id: AccountId,
    pub stored: Money,
    pub logged: Money,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegrityReport {
    pub account_count: usize,
    pub entry_count: usize,
    pub transfer_count: usize,
    pub mismatches: Vec<BalanceMismatch>,
    /// Entries referencing an account that no longer exists
    pub orphaned_entries: usize,
}

impl IntegrityReport {
    pub fn is_healthy(&self) -> bool {
        self.mismatches.is_empty() && self.orphaned_entries == 0
    }
}

/// Compare stored balances against the transaction log.
pub fn build_integrity_report(
    accounts: &[Account],
    entries: &[LogEntry],
    transfer_count: usize,
) -> IntegrityReport {
    let logged = compute_all_balances(entries);

    let mut mismatches: Vec<BalanceMismatch> = accounts
        .iter()
        .filter_map(|account| {
            let logged = logged.get(&account.id).copied().unwrap_or_default();
            (logged != account.balance).then(|| BalanceMismatch {
                account_id: account.id.clone(),
                stored: account.balance,
                logged,
            })
        })
        .collect();
    mismatches.sort_by(|a, b| a.account_id.cmp(&b.account_id));

    let orphaned_entries = entries
        .iter()
        .filter(|entry| !accounts.iter().any(|account| account.id == entry.account_id))
        .count();

    IntegrityReport {
        account_count: accounts.len(),
        entry_count: entries.len(),
        transfer_count,
        mismatches,
        orphaned_entries,
    }
}

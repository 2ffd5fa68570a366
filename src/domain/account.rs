use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{LedgerPolicy, Money};

pub type AccountId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AccountKind {
    /// Interest-bearing, must keep the minimum balance
    Savings,
    /// Fee-bearing, may overdraw down to the overdraft limit
    Checking,
}

impl AccountKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountKind::Savings => "SAVINGS",
            AccountKind::Checking => "CHECKING",
        }
    }
}

impl fmt::Display for AccountKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for AccountKind {
    type Err = UnknownAccountKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "SAVINGS" => Ok(AccountKind::Savings),
            "CHECKING" => Ok(AccountKind::Checking),
            _ => Err(UnknownAccountKind(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownAccountKind(pub String);

impl fmt::Display for UnknownAccountKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown account kind '{}' (expected savings or checking)", self.0)
    }
}

impl std::error::Error for UnknownAccountKind {}

/// Kind-specific state carried by an account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "UPPERCASE")]
pub enum AccountVariant {
    Savings { interest_rate: Decimal },
    /// `monthly_transactions` counts deposits and withdrawals since the last sweep
    Checking { monthly_transactions: u32 },
}

impl AccountVariant {
    pub fn kind(&self) -> AccountKind {
        match self {
            AccountVariant::Savings { .. } => AccountKind::Savings,
            AccountVariant::Checking { .. } => AccountKind::Checking,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub balance: Money,
    pub created_at: DateTime<Utc>,
    pub last_transaction_at: DateTime<Utc>,
    pub variant: AccountVariant,
}

impl Account {
    /// Open an account of the given kind. Savings accounts get the policy's default rate.
    pub fn open(
        kind: AccountKind,
        id: impl Into<AccountId>,
        balance: Money,
        policy: &LedgerPolicy,
    ) -> Self {
        match kind {
            AccountKind::Savings => Self::savings(id, balance, policy.default_interest_rate),
            AccountKind::Checking => Self::checking(id, balance),
        }
    }

    pub fn savings(id: impl Into<AccountId>, balance: Money, interest_rate: Decimal) -> Self {
        Self::with_variant(id.into(), balance, AccountVariant::Savings { interest_rate })
    }

    pub fn checking(id: impl Into<AccountId>, balance: Money) -> Self {
        Self::with_variant(
            id.into(),
            balance,
            AccountVariant::Checking {
                monthly_transactions: 0,
            },
        )
    }

    fn with_variant(id: AccountId, balance: Money, variant: AccountVariant) -> Self {
        let now = Utc::now();
        Self {
            id,
            balance,
            created_at: now,
            last_transaction_at: now,
            variant,
        }
    }

    pub fn kind(&self) -> AccountKind {
        self.variant.kind()
    }

    pub fn interest_rate(&self) -> Option<Decimal> {
        match self.variant {
            AccountVariant::Savings { interest_rate } => Some(interest_rate),
            AccountVariant::Checking { .. } => None,
        }
    }

    pub fn monthly_transactions(&self) -> Option<u32> {
        match self.variant {
            AccountVariant::Savings { .. } => None,
            AccountVariant::Checking {
                monthly_transactions,
            } => Some(monthly_transactions),
        }
    }

    /// Lowest balance a withdrawal may leave behind.
    pub fn floor(&self, policy: &LedgerPolicy) -> Money {
        match self.variant {
            AccountVariant::Savings { .. } => policy.minimum_balance,
            AccountVariant::Checking { .. } => policy.overdraft_limit,
        }
    }

    pub fn can_withdraw(&self, amount: Money, policy: &LedgerPolicy) -> bool {
        self.balance
            .checked_sub(amount)
            .is_some_and(|remaining| remaining >= self.floor(policy))
    }

    pub fn deposit(&mut self, amount: Money, at: DateTime<Utc>) -> Result<(), AccountError> {
        if !amount.is_positive() {
            return Err(AccountError::InvalidAmount { amount });
        }
        self.credit(amount, at)?;
        self.count_transaction();
        Ok(())
    }

    pub fn withdraw(
        &mut self,
        amount: Money,
        policy: &LedgerPolicy,
        at: DateTime<Utc>,
    ) -> Result<(), AccountError> {
        if !amount.is_positive() {
            return Err(AccountError::InvalidAmount { amount });
        }
        if !self.can_withdraw(amount, policy) {
            return Err(self.floor_breach(amount));
        }
        self.debit(amount, at)?;
        self.count_transaction();
        Ok(())
    }

    /// Apply the month-end rule and return the signed amount that hit the balance.
    ///
    /// Savings earns `balance * interest_rate` (rounded to cents). Checking pays the
    /// flat fee without the overdraft check and starts a new transaction cycle.
    /// Fails only when the result would not fit, leaving the account unchanged.
    pub fn process_monthly_fees(
        &mut self,
        policy: &LedgerPolicy,
        at: DateTime<Utc>,
    ) -> Result<Money, AccountError> {
        match self.variant {
            AccountVariant::Savings { interest_rate } => {
                let interest = self
                    .balance
                    .apply_rate(interest_rate)
                    .ok_or_else(|| self.out_of_range(self.balance))?;
                if !interest.is_positive() {
                    return Ok(Money::ZERO);
                }
                self.credit(interest, at)?;
                Ok(interest)
            }
            AccountVariant::Checking { .. } => {
                let fee = policy.monthly_fee;
                if !fee.is_zero() {
                    self.debit(fee, at)?;
                }
                if let AccountVariant::Checking {
                    ref mut monthly_transactions,
                } = self.variant
                {
                    *monthly_transactions = 0;
                }
                Ok(if fee.is_zero() { Money::ZERO } else { -fee })
            }
        }
    }

    fn credit(&mut self, amount: Money, at: DateTime<Utc>) -> Result<(), AccountError> {
        self.balance = self
            .balance
            .checked_add(amount)
            .ok_or_else(|| self.out_of_range(amount))?;
        self.last_transaction_at = at;
        Ok(())
    }

    fn debit(&mut self, amount: Money, at: DateTime<Utc>) -> Result<(), AccountError> {
        self.balance = self
            .balance
            .checked_sub(amount)
            .ok_or_else(|| self.out_of_range(amount))?;
        self.last_transaction_at = at;
        Ok(())
    }

    fn out_of_range(&self, amount: Money) -> AccountError {
        AccountError::AmountOutOfRange {
            account_id: self.id.clone(),
            amount,
        }
    }

    fn count_transaction(&mut self) {
        if let AccountVariant::Checking {
            ref mut monthly_transactions,
        } = self.variant
        {
            *monthly_transactions = monthly_transactions.saturating_add(1);
        }
    }

    fn floor_breach(&self, requested: Money) -> AccountError {
        let account_id = self.id.clone();
        let available = self.balance;
        match self.variant {
            AccountVariant::Savings { .. } => AccountError::InsufficientFunds {
                account_id,
                requested,
                available,
            },
            AccountVariant::Checking { .. } => AccountError::OverdraftLimitExceeded {
                account_id,
                requested,
                available,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountError {
    InvalidAmount {
        amount: Money,
    },
    InsufficientFunds {
        account_id: AccountId,
        requested: Money,
        available: Money,
    },
    OverdraftLimitExceeded {
        account_id: AccountId,
        requested: Money,
        available: Money,
    },
    /// The resulting balance would not fit in the decimal range
    AmountOutOfRange {
        account_id: AccountId,
        amount: Money,
    },
}

impl fmt::Display for AccountError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccountError::InvalidAmount { amount } => {
                write!(f, "Amount must be positive, got {}", amount)
            }
            AccountError::InsufficientFunds {
                account_id,
                requested,
                available,
            } => write!(
                f,
                "Insufficient funds in account {}: requested {}, available {}",
                account_id, requested, available
            ),
            AccountError::OverdraftLimitExceeded {
                account_id,
                requested,
                available,
            } => write!(
                f,
                "Account {} would exceed its overdraft limit: requested {}, available {}",
                account_id, requested, available
            ),
            AccountError::AmountOutOfRange { account_id, amount } => write!(
                f,
                "Amount {} is out of range for the balance of account {}",
                amount, account_id
            ),
        }
    }
}

impl std::error::Error for AccountError {}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    use super::*;

    fn money(s: &str) -> Money {
        Money::parse(s).unwrap()
    }

    #[test]
    fn test_account_kind_parsing() {
        assert_eq!("savings".parse::<AccountKind>(), Ok(AccountKind::Savings));
        assert_eq!("CHECKING".parse::<AccountKind>(), Ok(AccountKind::Checking));
        assert_eq!(
            "premium".parse::<AccountKind>(),
            Err(UnknownAccountKind("premium".to_string()))
        );
    }

    #[test]
    fn test_open_savings_uses_default_rate() {
        let account = Account::open(AccountKind::Savings, "S1", money("200"), &LedgerPolicy::default());
        assert_eq!(account.kind(), AccountKind::Savings);
        assert_eq!(account.interest_rate(), Some(dec!(0.025)));
        assert_eq!(account.monthly_transactions(), None);
    }

    #[test]
    fn test_savings_withdraw_respects_minimum_balance() {
        let policy = LedgerPolicy::default();
        let mut account = Account::savings("S1", money("250.00"), dec!(0.025));

        account.withdraw(money("150.00"), &policy, Utc::now()).unwrap();
        assert_eq!(account.balance, money("100.00"));

        let err = account.withdraw(money("0.01"), &policy, Utc::now()).unwrap_err();
        assert_eq!(
            err,
            AccountError::InsufficientFunds {
                account_id: "S1".into(),
                requested: money("0.01"),
                available: money("100.00"),
            }
        );
        assert_eq!(account.balance, money("100.00"));
    }

    #[test]
    fn test_checking_overdraft_scenario() {
        let policy = LedgerPolicy::default();
        let mut account = Account::checking("C1", money("50.00"));

        account.withdraw(money("140.00"), &policy, Utc::now()).unwrap();
        assert_eq!(account.balance, money("-90.00"));

        let err = account.withdraw(money("20.00"), &policy, Utc::now()).unwrap_err();
        assert_eq!(
            err,
            AccountError::OverdraftLimitExceeded {
                account_id: "C1".into(),
                requested: money("20.00"),
                available: money("-90.00"),
            }
        );
        assert_eq!(account.monthly_transactions(), Some(1));
    }

    #[test]
    fn test_non_positive_amounts_rejected() {
        let policy = LedgerPolicy::default();
        let mut account = Account::checking("C1", money("50.00"));

        for amount in [Money::ZERO, money("-5")] {
            assert_eq!(
                account.deposit(amount, Utc::now()),
                Err(AccountError::InvalidAmount { amount })
            );
            assert_eq!(
                account.withdraw(amount, &policy, Utc::now()),
                Err(AccountError::InvalidAmount { amount })
            );
        }
        assert_eq!(account.balance, money("50.00"));
        assert_eq!(account.monthly_transactions(), Some(0));
    }

    #[test]
    fn test_savings_interest() {
        let policy = LedgerPolicy::default();
        let mut account = Account::savings("S1", money("200.00"), dec!(0.025));

        let applied = account.process_monthly_fees(&policy, Utc::now()).unwrap();
        assert_eq!(applied, money("5.00"));
        assert_eq!(account.balance, money("205.00"));
    }

    #[test]
    fn test_savings_with_zero_balance_earns_nothing() {
        let policy = LedgerPolicy::default();
        let mut account = Account::savings("S0", Money::ZERO, dec!(0.025));

        assert_eq!(account.process_monthly_fees(&policy, Utc::now()), Ok(Money::ZERO));
        assert_eq!(account.balance, Money::ZERO);
    }

    #[test]
    fn test_checking_fee_ignores_overdraft_floor() {
        let policy = LedgerPolicy::default();
        let mut account = Account::checking("C1", money("-95.00"));
        account.deposit(money("1.00"), Utc::now()).unwrap();
        assert_eq!(account.monthly_transactions(), Some(1));

        let applied = account.process_monthly_fees(&policy, Utc::now()).unwrap();
        assert_eq!(applied, money("-12.00"));
        assert_eq!(account.balance, money("-106.00"));
        assert_eq!(account.monthly_transactions(), Some(0));
    }

    #[test]
    fn test_overflowing_deposit_is_rejected() {
        let policy = LedgerPolicy::default();
        let near_max = money("79228162514264337593543950330");
        let mut account = Account::savings("S1", money("200.00"), dec!(0.025));
        let before = account.clone();

        assert_eq!(
            account.deposit(near_max, Utc::now()),
            Err(AccountError::AmountOutOfRange {
                account_id: "S1".into(),
                amount: near_max,
            })
        );
        assert_eq!(account, before);

        let mut huge = Account::savings("S2", near_max, dec!(2));
        assert!(matches!(
            huge.process_monthly_fees(&policy, Utc::now()),
            Err(AccountError::AmountOutOfRange { .. })
        ));
        assert_eq!(huge.balance, near_max);
    }

    #[test]
    fn test_overflowing_withdrawal_and_fee_are_rejected() {
        let policy = LedgerPolicy::default();
        let near_min = money("-79228162514264337593543950330");
        let mut account = Account::checking("C1", near_min);

        assert!(!account.can_withdraw(money("100.00"), &policy));
        assert!(matches!(
            account.withdraw(money("100.00"), &policy, Utc::now()),
            Err(AccountError::OverdraftLimitExceeded { .. })
        ));

        account.deposit(money("1.00"), Utc::now()).unwrap();
        let before = account.clone();
        assert!(matches!(
            account.process_monthly_fees(
                &LedgerPolicy {
                    monthly_fee: money("10.00"),
                    ..policy
                },
                Utc::now()
            ),
            Err(AccountError::AmountOutOfRange { .. })
        ));
        // Counter is only reset when the fee lands
        assert_eq!(account, before);
    }

    proptest! {
        #[test]
        fn prop_withdraw_keeps_floor(
            start in -10_000i64..100_000,
            ops in prop::collection::vec((any::<bool>(), 1i64..50_000), 0..40),
            savings in any::<bool>(),
        ) {
            let policy = LedgerPolicy::default();
            let balance = Money::from_cents(start);
            let mut account = if savings {
                Account::savings("P", balance, dec!(0.025))
            } else {
                Account::checking("P", balance)
            };

            for (is_deposit, cents) in ops {
                let amount = Money::from_cents(cents);
                let before = account.balance;
                if is_deposit {
                    account.deposit(amount, Utc::now()).unwrap();
                    prop_assert_eq!(account.balance, before + amount);
                } else {
                    match account.withdraw(amount, &policy, Utc::now()) {
                        Ok(()) => {
                            prop_assert_eq!(account.balance, before - amount);
                            prop_assert!(account.balance >= account.floor(&policy));
                        }
                        Err(_) => prop_assert_eq!(account.balance, before),
                    }
                }
            }
        }
    }
}

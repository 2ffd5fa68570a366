use std::io;
use std::sync::Arc;

use anyhow::Context;
use chrono::{DateTime, Local, NaiveTime, Utc};
use rust_decimal::Decimal;
use sqlx::SqliteConnection;
use tracing::{debug, info, instrument, warn};

use crate::config::LedgerConfig;
use crate::domain::{
    build_integrity_report, Account, AccountKind, IntegrityReport, LedgerPolicy, LogEntry, Money,
    TransferRecord,
};
use crate::io::{entry_line, transfer_line, ActivitySink, FileActivitySink, NullActivitySink};
use crate::storage::{EntryFilter, Repository};

use super::{
    AccountListing, AccountLocks, ActivityReport, DailyTotals, FeeApplication, FeeFailure,
    FeeSweepReport, HighestBalanceAccount, LedgerError, LedgerSummary, MostActiveAccount,
};

/// Application service providing high-level operations for the ledger.
/// This is the primary interface for any client (CLI, API, TUI, etc.).
///
/// Every mutating operation locks the accounts it touches, applies the account's
/// own policy, and writes balances and log records in one database transaction.
/// Activity lines go to the sink only after that transaction commits.
pub struct LedgerService {
    repo: Repository,
    policy: LedgerPolicy,
    sink: Arc<dyn ActivitySink>,
    locks: AccountLocks,
}

/// A committed mutation plus the outcome of its best-effort activity logging.
#[derive(Debug)]
pub struct Committed<T> {
    pub value: T,
    /// Set when the activity sink failed; the mutation itself stays committed
    pub activity_error: Option<io::Error>,
}

impl<T> Committed<T> {
    /// Treat an activity-log failure as an error. The mutation is still committed.
    pub fn into_result(self) -> Result<T, LedgerError> {
        match self.activity_error {
            Some(err) => Err(LedgerError::ActivityLog(err)),
            None => Ok(self.value),
        }
    }

    /// Ignore the activity-log outcome.
    pub fn into_value(self) -> T {
        self.value
    }
}

/// Result of opening an account
#[derive(Debug, Clone)]
pub struct OpenedAccount {
    pub account: Account,
    /// Present when the account was opened with a positive balance
    pub initial_entry: Option<LogEntry>,
}

/// Result of a deposit or withdrawal
#[derive(Debug, Clone)]
pub struct MovementReceipt {
    pub account: Account,
    pub entry: LogEntry,
}

/// Result of a transfer
#[derive(Debug, Clone)]
pub struct TransferReceipt {
    pub from: Account,
    pub to: Account,
    pub debit: LogEntry,
    pub credit: LogEntry,
    pub record: TransferRecord,
}

/// Result of deleting an account
#[derive(Debug, Clone)]
pub struct DeletedAccount {
    pub account: Account,
    pub removed_entries: u64,
}

impl LedgerService {
    /// Create a new ledger service with the given repository and the reference policy.
    pub fn new(repo: Repository) -> Self {
        Self {
            repo,
            policy: LedgerPolicy::default(),
            sink: Arc::new(NullActivitySink),
            locks: AccountLocks::new(),
        }
    }

    pub fn with_policy(mut self, policy: LedgerPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_activity_sink(mut self, sink: Arc<dyn ActivitySink>) -> Self {
        self.sink = sink;
        self
    }

    /// Initialize a new database at the given path.
    pub async fn init(database_path: &str) -> Result<Self, LedgerError> {
        let db_url = format!("sqlite:{}?mode=rwc", database_path);
        let repo = Repository::init(&db_url).await?;
        Ok(Self::new(repo))
    }

    /// Connect to an existing database.
    pub async fn connect(database_path: &str) -> Result<Self, LedgerError> {
        let db_url = format!("sqlite:{}", database_path);
        let repo = Repository::connect(&db_url).await?;
        Ok(Self::new(repo))
    }

    /// Build a service from configuration, migrating the database if needed.
    pub async fn from_config(config: &LedgerConfig) -> Result<Self, LedgerError> {
        let repo = Repository::init(&config.database_url()).await?;
        let sink: Arc<dyn ActivitySink> = match &config.activity_log_dir {
            Some(dir) => Arc::new(FileActivitySink::new(dir)?),
            None => Arc::new(NullActivitySink),
        };
        Ok(Self::new(repo)
            .with_policy(config.policy.clone())
            .with_activity_sink(sink))
    }

    pub fn policy(&self) -> &LedgerPolicy {
        &self.policy
    }

    // ========================
    // Account operations
    // ========================

    /// Open an account. A positive initial balance is logged as an initial deposit.
    #[instrument(skip(self))]
    pub async fn open_account(
        &self,
        kind: AccountKind,
        account_id: &str,
        initial_balance: Money,
    ) -> Result<Committed<OpenedAccount>, LedgerError> {
        let account = Account::open(kind, account_id, initial_balance, &self.policy);
        self.insert_new_account(account).await
    }

    /// Open a savings account with its own interest rate.
    #[instrument(skip(self))]
    pub async fn open_savings_account(
        &self,
        account_id: &str,
        initial_balance: Money,
        interest_rate: Decimal,
    ) -> Result<Committed<OpenedAccount>, LedgerError> {
        if interest_rate.is_sign_negative() {
            return Err(LedgerError::Ledger(format!(
                "Interest rate must not be negative, got {}",
                interest_rate
            )));
        }
        let account = Account::savings(account_id, initial_balance, interest_rate);
        self.insert_new_account(account).await
    }

    async fn insert_new_account(
        &self,
        account: Account,
    ) -> Result<Committed<OpenedAccount>, LedgerError> {
        if account.id.trim().is_empty() {
            return Err(LedgerError::Ledger("Account id must not be empty".to_string()));
        }
        if account.balance.is_negative() {
            return Err(LedgerError::InvalidAmount(format!(
                "Initial balance must not be negative, got {}",
                account.balance
            )));
        }

        let _guards = self.locks.lock(&[&account.id]).await;
        let mut tx = self.repo.begin().await?;

        if Repository::load_account(&mut tx, &account.id).await?.is_some() {
            return Err(LedgerError::AccountAlreadyExists(account.id));
        }
        Repository::insert_account(&mut tx, &account).await?;

        let initial_entry = if account.balance.is_positive() {
            let mut entry = LogEntry::movement(
                &account.id,
                account.balance,
                account.created_at,
                "Initial deposit",
            );
            Repository::append_entry(&mut tx, &mut entry).await?;
            Some(entry)
        } else {
            None
        };

        tx.commit().await.context("Failed to commit account opening")?;
        info!(account_id = %account.id, kind = %account.kind(), balance = %account.balance, "opened account");

        let lines = initial_entry.iter().map(entry_line).collect();
        Ok(self.publish(
            OpenedAccount {
                account,
                initial_entry,
            },
            lines,
        ))
    }

    /// Get an account by id.
    pub async fn get_account(&self, account_id: &str) -> Result<Account, LedgerError> {
        self.repo
            .get_account(account_id)
            .await?
            .ok_or_else(|| LedgerError::AccountNotFound(account_id.to_string()))
    }

    /// Get the current balance of an account.
    pub async fn get_balance(&self, account_id: &str) -> Result<Money, LedgerError> {
        Ok(self.get_account(account_id).await?.balance)
    }

    /// Get the kind of an account.
    pub async fn get_account_kind(&self, account_id: &str) -> Result<AccountKind, LedgerError> {
        self.repo
            .get_account_kind(account_id)
            .await?
            .ok_or_else(|| LedgerError::AccountNotFound(account_id.to_string()))
    }

    /// List all accounts, most recently created first.
    pub async fn list_accounts(&self) -> Result<Vec<AccountListing>, LedgerError> {
        let accounts = self.repo.list_accounts().await?;
        Ok(accounts.iter().map(AccountListing::from).collect())
    }

    /// Delete an account together with its transaction history.
    #[instrument(skip(self))]
    pub async fn delete_account(&self, account_id: &str) -> Result<DeletedAccount, LedgerError> {
        let _guards = self.locks.lock(&[account_id]).await;
        let mut tx = self.repo.begin().await?;

        let account = Self::load_existing(&mut tx, account_id).await?;
        let removed_entries = Repository::delete_account(&mut tx, account_id).await?;

        tx.commit().await.context("Failed to commit account deletion")?;
        info!(account_id, removed_entries, "deleted account");

        Ok(DeletedAccount {
            account,
            removed_entries,
        })
    }

    // ========================
    // Money movements
    // ========================

    /// Credit an account.
    #[instrument(skip(self))]
    pub async fn deposit(
        &self,
        account_id: &str,
        amount: Money,
    ) -> Result<Committed<MovementReceipt>, LedgerError> {
        ensure_positive(amount)?;

        let _guards = self.locks.lock(&[account_id]).await;
        let mut tx = self.repo.begin().await?;

        let mut account = Self::load_existing(&mut tx, account_id).await?;
        let now = Utc::now();
        account.deposit(amount, now)?;
        Repository::save_account(&mut tx, &account).await?;

        let mut entry = LogEntry::movement(account_id, amount, now, "Deposit");
        Repository::append_entry(&mut tx, &mut entry).await?;

        tx.commit().await.context("Failed to commit deposit")?;
        info!(account_id, amount = %amount, balance = %account.balance, "deposit committed");

        let lines = vec![entry_line(&entry)];
        Ok(self.publish(MovementReceipt { account, entry }, lines))
    }

    /// Debit an account, subject to its floor.
    #[instrument(skip(self))]
    pub async fn withdraw(
        &self,
        account_id: &str,
        amount: Money,
    ) -> Result<Committed<MovementReceipt>, LedgerError> {
        ensure_positive(amount)?;

        let _guards = self.locks.lock(&[account_id]).await;
        let mut tx = self.repo.begin().await?;

        let mut account = Self::load_existing(&mut tx, account_id).await?;
        let now = Utc::now();
        if let Err(err) = account.withdraw(amount, &self.policy, now) {
            debug!(account_id, error = %err, "withdrawal rejected");
            return Err(err.into());
        }
        Repository::save_account(&mut tx, &account).await?;

        let mut entry = LogEntry::movement(account_id, -amount, now, "Withdrawal");
        Repository::append_entry(&mut tx, &mut entry).await?;

        tx.commit().await.context("Failed to commit withdrawal")?;
        info!(account_id, amount = %amount, balance = %account.balance, "withdrawal committed");

        let lines = vec![entry_line(&entry)];
        Ok(self.publish(MovementReceipt { account, entry }, lines))
    }

    /// Move money between two accounts.
    ///
    /// The source account's withdrawal rule decides; if it refuses, neither
    /// balance changes and nothing is logged. On success both legs and the
    /// transfer summary are written in the same transaction.
    #[instrument(skip(self))]
    pub async fn transfer(
        &self,
        from_account_id: &str,
        to_account_id: &str,
        amount: Money,
    ) -> Result<Committed<TransferReceipt>, LedgerError> {
        ensure_positive(amount)?;
        if from_account_id == to_account_id {
            return Err(LedgerError::SameAccount(from_account_id.to_string()));
        }

        let _guards = self.locks.lock(&[from_account_id, to_account_id]).await;
        let mut tx = self.repo.begin().await?;

        let mut from = Self::load_existing(&mut tx, from_account_id).await?;
        let mut to = Self::load_existing(&mut tx, to_account_id).await?;

        let now = Utc::now();
        if let Err(err) = from.withdraw(amount, &self.policy, now) {
            debug!(from_account_id, to_account_id, error = %err, "transfer rejected");
            return Err(err.into());
        }
        to.deposit(amount, now)?;

        Repository::save_account(&mut tx, &from).await?;
        Repository::save_account(&mut tx, &to).await?;

        let (mut debit, mut credit) =
            LogEntry::transfer_legs(from_account_id, to_account_id, amount, now);
        Repository::append_entry(&mut tx, &mut debit).await?;
        Repository::append_entry(&mut tx, &mut credit).await?;

        let mut record = TransferRecord::new(from_account_id, to_account_id, amount, now);
        Repository::append_transfer(&mut tx, &mut record).await?;

        tx.commit().await.context("Failed to commit transfer")?;
        info!(
            from_account_id,
            to_account_id,
            amount = %amount,
            transfer_id = record.id,
            "transfer committed"
        );

        let lines = vec![
            entry_line(&debit),
            entry_line(&credit),
            transfer_line(&record),
        ];
        Ok(self.publish(
            TransferReceipt {
                from,
                to,
                debit,
                credit,
                record,
            },
            lines,
        ))
    }

    // ========================
    // Monthly sweep
    // ========================

    /// Apply interest and fees to every account.
    ///
    /// Each account is handled in its own transaction; a failure on one account is
    /// recorded in the report and the sweep moves on.
    #[instrument(skip(self))]
    pub async fn process_monthly_fees(&self) -> Result<Committed<FeeSweepReport>, LedgerError> {
        let account_ids = self.repo.list_account_ids().await?;
        let mut report = FeeSweepReport::default();
        let mut activity_error = None;

        for account_id in account_ids {
            match self.apply_monthly_fees(&account_id).await {
                Ok(Some(committed)) => {
                    if activity_error.is_none() {
                        activity_error = committed.activity_error;
                    }
                    report.applied.push(committed.value);
                }
                // Deleted between listing and processing
                Ok(None) => {}
                Err(err) => {
                    warn!(account_id = %account_id, error = %err, "monthly fee processing failed");
                    report.failed.push(FeeFailure {
                        account_id,
                        error: err.to_string(),
                    });
                }
            }
        }

        info!(
            applied = report.applied.len(),
            failed = report.failed.len(),
            "monthly sweep finished"
        );
        Ok(Committed {
            value: report,
            activity_error,
        })
    }

    async fn apply_monthly_fees(
        &self,
        account_id: &str,
    ) -> Result<Option<Committed<FeeApplication>>, LedgerError> {
        let _guards = self.locks.lock(&[account_id]).await;
        let mut tx = self.repo.begin().await?;

        let Some(mut account) = Repository::load_account(&mut tx, account_id).await? else {
            return Ok(None);
        };

        let now = Utc::now();
        let amount = account.process_monthly_fees(&self.policy, now)?;
        Repository::save_account(&mut tx, &account).await?;

        let entry = if amount.is_zero() {
            None
        } else {
            let description = if amount.is_positive() {
                "Monthly interest"
            } else {
                "Monthly fee"
            };
            let mut entry = LogEntry::movement(account_id, amount, now, description);
            Repository::append_entry(&mut tx, &mut entry).await?;
            Some(entry)
        };

        tx.commit().await.context("Failed to commit monthly fees")?;
        debug!(account_id, amount = %amount, balance = %account.balance, "monthly fees applied");

        let lines = entry.iter().map(entry_line).collect();
        Ok(Some(self.publish(
            FeeApplication {
                account_id: account.id.clone(),
                kind: account.kind(),
                amount,
                balance: account.balance,
            },
            lines,
        )))
    }

    // ========================
    // History
    // ========================

    /// Log entries, most recent first, for one account or for the whole ledger.
    pub async fn transaction_history(
        &self,
        account_id: Option<&str>,
    ) -> Result<Vec<LogEntry>, LedgerError> {
        if let Some(id) = account_id {
            self.get_account(id).await?;
        }
        let filter = EntryFilter {
            account_id: account_id.map(str::to_string),
            ..EntryFilter::default()
        };
        Ok(self.repo.list_entries(&filter).await?)
    }

    /// Log entries matching an arbitrary filter.
    pub async fn transaction_history_filtered(
        &self,
        filter: &EntryFilter,
    ) -> Result<Vec<LogEntry>, LedgerError> {
        Ok(self.repo.list_entries(filter).await?)
    }

    /// Transfer summaries, most recent first.
    pub async fn transfer_history(&self) -> Result<Vec<TransferRecord>, LedgerError> {
        Ok(self.repo.list_transfers().await?)
    }

    // ========================
    // Reports
    // ========================

    /// Number of accounts and the sum of their balances.
    pub async fn account_summary(&self) -> Result<LedgerSummary, LedgerError> {
        let accounts = self.repo.list_accounts().await?;
        Ok(LedgerSummary {
            total_accounts: accounts.len(),
            total_balance: checked_total(accounts.iter().map(|a| a.balance))?,
        })
    }

    /// Credits and debits logged since the start of the current local day.
    pub async fn daily_transaction_totals(&self) -> Result<DailyTotals, LedgerError> {
        self.daily_transaction_totals_since(start_of_local_day(Local::now()))
            .await
    }

    /// Credits and debits logged at or after `since`.
    pub async fn daily_transaction_totals_since(
        &self,
        since: DateTime<Utc>,
    ) -> Result<DailyTotals, LedgerError> {
        let entries = self.repo.list_entries_since(since).await?;

        Ok(DailyTotals {
            since,
            total_deposits: checked_total(
                entries.iter().map(|e| e.amount).filter(Money::is_positive),
            )?,
            total_withdrawals: checked_total(
                entries.iter().map(|e| e.amount).filter(Money::is_negative),
            )?,
        })
    }

    /// Most active account (by logged entries) and highest-balance account.
    /// Ties go to the lowest account id.
    pub async fn account_activity_report(&self) -> Result<ActivityReport, LedgerError> {
        let counts = self.repo.entry_counts_by_account().await?;
        let most_active = counts
            .into_iter()
            .next()
            .map(|(account_id, transaction_count)| MostActiveAccount {
                account_id,
                transaction_count,
            });

        let accounts = self.repo.list_accounts().await?;
        let highest_balance = accounts
            .iter()
            .min_by(|a, b| b.balance.cmp(&a.balance).then_with(|| a.id.cmp(&b.id)))
            .map(|account| HighestBalanceAccount {
                account_id: account.id.clone(),
                balance: account.balance,
            });

        Ok(ActivityReport {
            most_active,
            highest_balance,
        })
    }

    /// Reconcile every stored balance with the transaction log.
    pub async fn check_integrity(&self) -> Result<IntegrityReport, LedgerError> {
        let accounts = self.repo.list_accounts().await?;
        let entries = self.repo.list_entries(&EntryFilter::default()).await?;
        let transfers = self.repo.list_transfers().await?;

        Ok(build_integrity_report(&accounts, &entries, transfers.len()))
    }

    // ========================
    // Helpers
    // ========================

    async fn load_existing(
        conn: &mut SqliteConnection,
        account_id: &str,
    ) -> Result<Account, LedgerError> {
        Repository::load_account(conn, account_id)
            .await?
            .ok_or_else(|| LedgerError::AccountNotFound(account_id.to_string()))
    }

    /// Hand committed activity to the sink; the first failure is kept and the rest skipped.
    fn publish<T>(&self, value: T, lines: Vec<String>) -> Committed<T> {
        let mut activity_error = None;
        for line in &lines {
            if let Err(err) = self.sink.record(line) {
                warn!(error = %err, "failed to write activity log");
                activity_error = Some(err);
                break;
            }
        }
        Committed {
            value,
            activity_error,
        }
    }
}

fn ensure_positive(amount: Money) -> Result<(), LedgerError> {
    if amount.is_positive() {
        Ok(())
    } else {
        Err(LedgerError::InvalidAmount(format!(
            "Amount must be positive, got {}",
            amount
        )))
    }
}

fn checked_total(amounts: impl IntoIterator<Item = Money>) -> Result<Money, LedgerError> {
    Money::checked_sum(amounts)
        .ok_or_else(|| LedgerError::Ledger("Total is out of the representable range".to_string()))
}

fn start_of_local_day(now: DateTime<Local>) -> DateTime<Utc> {
    now.date_naive()
        .and_time(NaiveTime::MIN)
        .and_local_timezone(Local)
        .earliest()
        .unwrap_or(now)
        .with_timezone(&Utc)
}

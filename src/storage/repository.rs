use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use rust_decimal::Decimal;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, Sqlite, SqliteConnection, SqlitePool, Transaction};

use crate::domain::{
    Account, AccountId, AccountKind, AccountVariant, EntryKind, LogEntry, Money, TransferRecord,
};

use super::MIGRATION_001_INITIAL;

const ACCOUNT_COLUMNS: &str =
    "account_id, account_type, balance, interest_rate, monthly_transactions, created_at, last_transaction_at";

const ENTRY_COLUMNS: &str =
    "id, account_id, amount, timestamp, entry_type, related_account_id, description";

const TRANSFER_COLUMNS: &str = "id, from_account_id, to_account_id, amount, timestamp";

/// Filter for querying log entries
#[derive(Debug, Clone, Default)]
pub struct EntryFilter {
    pub account_id: Option<AccountId>,
    /// Inclusive lower bound on the entry timestamp
    pub since: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

/// Repository for persisting and querying accounts, log entries and transfers.
///
/// Reads go through the pool. Writes take a connection, normally the one behind
/// a transaction from [`Repository::begin`], so callers decide the atomic unit.
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    /// Create a new repository with the given SQLite connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to a SQLite database at the given URL.
    /// Creates the database file if it doesn't exist.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .context("Invalid database URL")?
            .create_if_missing(true)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5));

        // SQLite has a single writer; one connection keeps deferred transactions
        // from deadlocking when they upgrade to a write lock.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .context("Failed to connect to database")?;
        Ok(Self::new(pool))
    }

    /// Run database migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(MIGRATION_001_INITIAL)
            .execute(&self.pool)
            .await
            .context("Failed to run migration 001")?;
        Ok(())
    }

    /// Initialize a new database (connect + migrate).
    pub async fn init(database_url: &str) -> Result<Self> {
        let repo = Self::connect(database_url).await?;
        repo.migrate().await?;
        Ok(repo)
    }

    /// Start a database transaction. Dropping it without `commit` rolls back.
    pub async fn begin(&self) -> Result<Transaction<'static, Sqlite>> {
        self.pool
            .begin()
            .await
            .context("Failed to begin transaction")
    }

    // ========================
    // Account operations
    // ========================

    /// Load an account inside an open transaction.
    pub async fn load_account(conn: &mut SqliteConnection, id: &str) -> Result<Option<Account>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM accounts WHERE account_id = ?",
            ACCOUNT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
        .context("Failed to fetch account")?;

        row.as_ref().map(Self::row_to_account).transpose()
    }

    /// Insert a freshly opened account.
    pub async fn insert_account(conn: &mut SqliteConnection, account: &Account) -> Result<()> {
        let (interest_rate, monthly_transactions) = Self::variant_columns(&account.variant);

        sqlx::query(
            r#"
            INSERT INTO accounts (account_id, account_type, balance, interest_rate, monthly_transactions, created_at, last_transaction_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&account.id)
        .bind(account.kind().as_str())
        .bind(account.balance.to_string())
        .bind(interest_rate)
        .bind(monthly_transactions)
        .bind(format_timestamp(account.created_at))
        .bind(format_timestamp(account.last_transaction_at))
        .execute(&mut *conn)
        .await
        .context("Failed to insert account")?;
        Ok(())
    }

    /// Persist the mutable state of an existing account.
    pub async fn save_account(conn: &mut SqliteConnection, account: &Account) -> Result<()> {
        let (interest_rate, monthly_transactions) = Self::variant_columns(&account.variant);

        let result = sqlx::query(
            r#"
            UPDATE accounts
            SET balance = ?, interest_rate = ?, monthly_transactions = ?, last_transaction_at = ?
            WHERE account_id = ?
            "#,
        )
        .bind(account.balance.to_string())
        .bind(interest_rate)
        .bind(monthly_transactions)
        .bind(format_timestamp(account.last_transaction_at))
        .bind(&account.id)
        .execute(&mut *conn)
        .await
        .context("Failed to save account")?;

        if result.rows_affected() != 1 {
            anyhow::bail!("Account {} vanished while saving", account.id);
        }
        Ok(())
    }

    /// Delete an account along with its log entries and transfer summaries.
    /// Returns the number of log entries removed.
    pub async fn delete_account(conn: &mut SqliteConnection, id: &str) -> Result<u64> {
        let entries = sqlx::query("DELETE FROM log_entries WHERE account_id = ?")
            .bind(id)
            .execute(&mut *conn)
            .await
            .context("Failed to delete log entries")?
            .rows_affected();

        sqlx::query("DELETE FROM transfers WHERE from_account_id = ? OR to_account_id = ?")
            .bind(id)
            .bind(id)
            .execute(&mut *conn)
            .await
            .context("Failed to delete transfer records")?;

        sqlx::query("DELETE FROM accounts WHERE account_id = ?")
            .bind(id)
            .execute(&mut *conn)
            .await
            .context("Failed to delete account")?;

        Ok(entries)
    }

    /// Get an account by id.
    pub async fn get_account(&self, id: &str) -> Result<Option<Account>> {
        let mut conn = self.pool.acquire().await.context("Failed to acquire connection")?;
        Self::load_account(&mut conn, id).await
    }

    /// Get only the kind discriminator of an account.
    pub async fn get_account_kind(&self, id: &str) -> Result<Option<AccountKind>> {
        let kind: Option<String> =
            sqlx::query_scalar("SELECT account_type FROM accounts WHERE account_id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .context("Failed to fetch account type")?;

        kind.map(|k| {
            k.parse::<AccountKind>()
                .map_err(|e| anyhow::anyhow!("Invalid account type in database: {}", e))
        })
        .transpose()
    }

    /// List all accounts, most recently created first.
    pub async fn list_accounts(&self) -> Result<Vec<Account>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM accounts ORDER BY created_at DESC, rowid DESC",
            ACCOUNT_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await
        .context("Failed to list accounts")?;

        rows.iter().map(Self::row_to_account).collect()
    }

    /// List the ids of all accounts in ascending order.
    pub async fn list_account_ids(&self) -> Result<Vec<AccountId>> {
        sqlx::query_scalar("SELECT account_id FROM accounts ORDER BY account_id")
            .fetch_all(&self.pool)
            .await
            .context("Failed to list account ids")
    }

    fn variant_columns(variant: &AccountVariant) -> (Option<String>, Option<i64>) {
        match variant {
            AccountVariant::Savings { interest_rate } => (Some(interest_rate.to_string()), None),
            AccountVariant::Checking {
                monthly_transactions,
            } => (None, Some(i64::from(*monthly_transactions))),
        }
    }

    fn row_to_account(row: &SqliteRow) -> Result<Account> {
        let id: String = row.get("account_id");
        let account_type: String = row.get("account_type");
        let balance: String = row.get("balance");
        let interest_rate: Option<String> = row.get("interest_rate");
        let monthly_transactions: Option<i64> = row.get("monthly_transactions");
        let created_at: String = row.get("created_at");
        let last_transaction_at: String = row.get("last_transaction_at");

        let kind = account_type
            .parse::<AccountKind>()
            .map_err(|e| anyhow::anyhow!("Invalid account type in database: {}", e))?;

        let variant = match kind {
            AccountKind::Savings => {
                let rate = interest_rate
                    .ok_or_else(|| anyhow::anyhow!("Savings account {} has no interest rate", id))?;
                AccountVariant::Savings {
                    interest_rate: Decimal::from_str(&rate).context("Invalid interest rate")?,
                }
            }
            AccountKind::Checking => AccountVariant::Checking {
                monthly_transactions: u32::try_from(monthly_transactions.unwrap_or(0))
                    .context("Invalid monthly transaction count")?,
            },
        };

        Ok(Account {
            balance: parse_money(&balance).context("Invalid balance")?,
            created_at: parse_timestamp(&created_at).context("Invalid created_at timestamp")?,
            last_transaction_at: parse_timestamp(&last_transaction_at)
                .context("Invalid last_transaction_at timestamp")?,
            variant,
            id,
        })
    }

    // ========================
    // Log entry operations
    // ========================

    /// Append a log entry and assign its surrogate id.
    pub async fn append_entry(conn: &mut SqliteConnection, entry: &mut LogEntry) -> Result<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO log_entries (account_id, amount, timestamp, entry_type, related_account_id, description)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&entry.account_id)
        .bind(entry.amount.to_string())
        .bind(format_timestamp(entry.timestamp))
        .bind(entry.kind.as_str())
        .bind(&entry.related_account_id)
        .bind(&entry.description)
        .execute(&mut *conn)
        .await
        .context("Failed to append log entry")?;

        entry.id = result.last_insert_rowid();
        Ok(())
    }

    /// List log entries with optional filters, most recent first.
    pub async fn list_entries(&self, filter: &EntryFilter) -> Result<Vec<LogEntry>> {
        let mut query = format!("SELECT {} FROM log_entries WHERE 1=1", ENTRY_COLUMNS);

        let since_str = filter.since.map(format_timestamp);

        if filter.account_id.is_some() {
            query.push_str(" AND account_id = ?");
        }
        if since_str.is_some() {
            query.push_str(" AND timestamp >= ?");
        }

        query.push_str(" ORDER BY timestamp DESC, id DESC");

        if let Some(lim) = filter.limit {
            query.push_str(&format!(" LIMIT {}", lim));
        }

        let mut sql_query = sqlx::query(&query);

        if let Some(ref account_id) = filter.account_id {
            sql_query = sql_query.bind(account_id);
        }
        if let Some(ref since) = since_str {
            sql_query = sql_query.bind(since);
        }

        let rows = sql_query
            .fetch_all(&self.pool)
            .await
            .context("Failed to list log entries")?;

        rows.iter().map(Self::row_to_entry).collect()
    }

    /// Every log entry at or after `since`, most recent first.
    pub async fn list_entries_since(&self, since: DateTime<Utc>) -> Result<Vec<LogEntry>> {
        self.list_entries(&EntryFilter {
            since: Some(since),
            ..EntryFilter::default()
        })
        .await
    }

    /// Number of log entries per account, busiest first, ties by account id.
    pub async fn entry_counts_by_account(&self) -> Result<Vec<(AccountId, i64)>> {
        let rows = sqlx::query(
            r#"
            SELECT account_id, COUNT(*) as count
            FROM log_entries
            GROUP BY account_id
            ORDER BY count DESC, account_id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to count log entries")?;

        Ok(rows
            .iter()
            .map(|row| (row.get("account_id"), row.get("count")))
            .collect())
    }

    fn row_to_entry(row: &SqliteRow) -> Result<LogEntry> {
        let amount: String = row.get("amount");
        let timestamp: String = row.get("timestamp");
        let entry_type: String = row.get("entry_type");

        Ok(LogEntry {
            id: row.get("id"),
            account_id: row.get("account_id"),
            amount: parse_money(&amount).context("Invalid entry amount")?,
            timestamp: parse_timestamp(&timestamp).context("Invalid entry timestamp")?,
            kind: entry_type.parse::<EntryKind>().map_err(anyhow::Error::msg)?,
            related_account_id: row.get("related_account_id"),
            description: row.get("description"),
        })
    }

    // ========================
    // Transfer summary operations
    // ========================

    /// Append a transfer summary and assign its id.
    pub async fn append_transfer(
        conn: &mut SqliteConnection,
        transfer: &mut TransferRecord,
    ) -> Result<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO transfers (from_account_id, to_account_id, amount, timestamp)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(&transfer.from_account)
        .bind(&transfer.to_account)
        .bind(transfer.amount.to_string())
        .bind(format_timestamp(transfer.timestamp))
        .execute(&mut *conn)
        .await
        .context("Failed to append transfer record")?;

        transfer.id = result.last_insert_rowid();
        Ok(())
    }

    /// List transfer summaries, most recent first.
    pub async fn list_transfers(&self) -> Result<Vec<TransferRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM transfers ORDER BY timestamp DESC, id DESC",
            TRANSFER_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await
        .context("Failed to list transfers")?;

        rows.iter().map(Self::row_to_transfer).collect()
    }

    fn row_to_transfer(row: &SqliteRow) -> Result<TransferRecord> {
        let amount: String = row.get("amount");
        let timestamp: String = row.get("timestamp");

        Ok(TransferRecord {
            id: row.get("id"),
            from_account: row.get("from_account_id"),
            to_account: row.get("to_account_id"),
            amount: parse_money(&amount).context("Invalid transfer amount")?,
            timestamp: parse_timestamp(&timestamp).context("Invalid transfer timestamp")?,
        })
    }
}

/// Fixed-width RFC 3339 so that string order matches time order.
fn format_timestamp(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(s)?.with_timezone(&Utc))
}

fn parse_money(s: &str) -> Result<Money> {
    Ok(Money::new(Decimal::from_str(s)?))
}

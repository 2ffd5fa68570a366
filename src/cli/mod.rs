use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use tracing_subscriber::EnvFilter;

use crate::application::{Committed, LedgerError, LedgerService};
use crate::config::{LedgerConfig, DEFAULT_DATABASE};
use crate::domain::{AccountKind, Money};
use crate::storage::EntryFilter;

/// Coffer - Savings & Checking Ledger
#[derive(Parser)]
#[command(name = "coffer")]
#[command(about = "A savings/checking ledger with an append-only transaction log")]
#[command(version)]
pub struct Cli {
    /// Database file path
    #[arg(short, long, env = "COFFER_DATABASE", default_value = DEFAULT_DATABASE)]
    pub database: PathBuf,

    /// Directory for daily activity log files (omit to disable)
    #[arg(long, env = "COFFER_ACTIVITY_LOG_DIR")]
    pub log_dir: Option<PathBuf>,

    /// JSON file overriding the ledger policy (minimum balance, fees, rates)
    #[arg(long)]
    pub policy: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new database
    Init,

    /// Open a new account
    Open {
        /// Account type: savings or checking
        kind: String,

        /// Account id
        account_id: String,

        /// Initial balance (e.g., "200.00")
        #[arg(short, long, default_value = "0")]
        balance: String,

        /// Interest rate for savings accounts (e.g., "0.025")
        #[arg(short, long)]
        rate: Option<String>,
    },

    /// Deposit into an account
    Deposit {
        account_id: String,

        /// Amount to deposit (e.g., "50.00" or "50")
        amount: String,
    },

    /// Withdraw from an account
    Withdraw {
        account_id: String,

        /// Amount to withdraw (e.g., "50.00" or "50")
        amount: String,
    },

    /// Transfer money between accounts
    Transfer {
        /// Amount to transfer (e.g., "50.00" or "50")
        amount: String,

        /// Source account id
        #[arg(long)]
        from: String,

        /// Destination account id
        #[arg(long)]
        to: String,
    },

    /// Show balance for an account or all accounts
    Balance {
        /// Account id (omit for all accounts)
        account_id: Option<String>,
    },

    /// List accounts, most recently opened first
    Accounts,

    /// Delete an account and its transaction history
    Delete { account_id: String },

    /// Apply monthly interest and fees to every account
    Fees,

    /// Show the number of accounts and the total balance
    Summary,

    /// Show today's deposit and withdrawal totals
    Daily,

    /// Show the most active and the highest-balance account
    Activity,

    /// Show the transaction log
    History {
        /// Filter by account id
        #[arg(long)]
        account: Option<String>,

        /// Maximum number of entries to show
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Show transfer summaries
    Transfers,

    /// Verify stored balances against the transaction log
    Check,

    /// Export data to CSV or JSON
    Export {
        /// What to export: history, accounts, full
        #[arg(default_value = "history")]
        export_type: String,

        /// Output format: csv or json
        #[arg(short, long, default_value = "csv")]
        format: String,

        /// Output file (defaults to stdout)
        #[arg(short, long)]
        output: Option<String>,

        /// Restrict history export to one account
        #[arg(long)]
        account: Option<String>,
    },
}

impl Cli {
    fn init_tracing(&self) {
        let default = if self.verbose { "coffer=debug" } else { "warn" };
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .try_init();
    }

    fn config(&self) -> Result<LedgerConfig> {
        let mut config = LedgerConfig::new(&self.database);
        if let Some(dir) = &self.log_dir {
            config = config.with_activity_log_dir(dir);
        }
        if let Some(path) = &self.policy {
            config = config.with_policy(LedgerConfig::load_policy(path)?);
        }
        Ok(config)
    }

    pub async fn run(self) -> Result<()> {
        self.init_tracing();

        let config = self.config()?;
        let service = LedgerService::from_config(&config)
            .await
            .with_context(|| format!("Failed to open database: {}", config.database.display()))?;

        match self.command {
            Commands::Init => {
                println!("Database initialized: {}", config.database.display());
            }

            Commands::Open {
                kind,
                account_id,
                balance,
                rate,
            } => {
                let kind: AccountKind = kind.parse().map_err(LedgerError::from)?;
                let balance = parse_amount(&balance)?;

                let opened = match (kind, rate) {
                    (AccountKind::Savings, Some(rate)) => {
                        let rate = Decimal::from_str(&rate)
                            .with_context(|| format!("Invalid interest rate '{}'", rate))?;
                        service.open_savings_account(&account_id, balance, rate).await?
                    }
                    (AccountKind::Checking, Some(_)) => {
                        anyhow::bail!("Interest rates only apply to savings accounts")
                    }
                    (kind, None) => service.open_account(kind, &account_id, balance).await?,
                };
                let opened = warn_on_activity_error(opened);

                println!(
                    "Opened {} account {} with balance {}",
                    opened.account.kind(),
                    opened.account.id,
                    opened.account.balance
                );
            }

            Commands::Deposit { account_id, amount } => {
                let amount = parse_amount(&amount)?;
                let receipt = warn_on_activity_error(service.deposit(&account_id, amount).await?);
                println!(
                    "Deposited {} into {}. New balance: {}",
                    amount, receipt.account.id, receipt.account.balance
                );
            }

            Commands::Withdraw { account_id, amount } => {
                let amount = parse_amount(&amount)?;
                let receipt = warn_on_activity_error(service.withdraw(&account_id, amount).await?);
                println!(
                    "Withdrew {} from {}. New balance: {}",
                    amount, receipt.account.id, receipt.account.balance
                );
            }

            Commands::Transfer { amount, from, to } => {
                let amount = parse_amount(&amount)?;
                let receipt = warn_on_activity_error(service.transfer(&from, &to, amount).await?);
                println!(
                    "Transferred {} {} -> {} (#{})",
                    amount, receipt.from.id, receipt.to.id, receipt.record.id
                );
                println!("  {}: {}", receipt.from.id, receipt.from.balance);
                println!("  {}: {}", receipt.to.id, receipt.to.balance);
            }

            Commands::Balance { account_id } => {
                run_balance_command(&service, account_id).await?;
            }

            Commands::Accounts => {
                run_balance_command(&service, None).await?;
            }

            Commands::Delete { account_id } => {
                let deleted = service.delete_account(&account_id).await?;
                println!(
                    "Deleted account {} ({} log entries removed)",
                    deleted.account.id, deleted.removed_entries
                );
            }

            Commands::Fees => {
                run_fees_command(&service).await?;
            }

            Commands::Summary => {
                let summary = service.account_summary().await?;
                println!("Accounts:      {}", summary.total_accounts);
                println!("Total balance: {}", summary.total_balance);
            }

            Commands::Daily => {
                let totals = service.daily_transaction_totals().await?;
                println!(
                    "Since {}",
                    totals
                        .since
                        .with_timezone(&chrono::Local)
                        .format("%Y-%m-%d %H:%M")
                );
                println!("  Deposits:    {:>12}", totals.total_deposits);
                println!("  Withdrawals: {:>12}", totals.total_withdrawals);
            }

            Commands::Activity => {
                let report = service.account_activity_report().await?;
                match report.most_active {
                    Some(active) => println!(
                        "Most active:     {} ({} transactions)",
                        active.account_id, active.transaction_count
                    ),
                    None => println!("Most active:     -"),
                }
                match report.highest_balance {
                    Some(top) => println!("Highest balance: {} ({})", top.account_id, top.balance),
                    None => println!("Highest balance: -"),
                }
            }

            Commands::History { account, limit } => {
                run_history_command(&service, account, limit).await?;
            }

            Commands::Transfers => {
                let transfers = service.transfer_history().await?;
                if transfers.is_empty() {
                    println!("No transfers found.");
                } else {
                    println!(
                        "{:<6} {:<20} {:<15} {:<15} {:>12}",
                        "ID", "DATE", "FROM", "TO", "AMOUNT"
                    );
                    println!("{}", "-".repeat(72));
                    for transfer in transfers {
                        println!(
                            "{:<6} {:<20} {:<15} {:<15} {:>12}",
                            transfer.id,
                            transfer.timestamp.format("%Y-%m-%d %H:%M:%S"),
                            truncate(&transfer.from_account, 15),
                            truncate(&transfer.to_account, 15),
                            transfer.amount
                        );
                    }
                }
            }

            Commands::Check => {
                run_check_command(&service).await?;
            }

            Commands::Export {
                export_type,
                format,
                output,
                account,
            } => {
                run_export_command(
                    &service,
                    &export_type,
                    &format,
                    output.as_deref(),
                    account.as_deref(),
                )
                .await?;
            }
        }

        Ok(())
    }
}

fn parse_amount(input: &str) -> Result<Money> {
    Money::parse(input).with_context(|| format!("Invalid amount '{}'. Use '50.00' or '50'", input))
}

fn warn_on_activity_error<T>(committed: Committed<T>) -> T {
    if let Some(err) = &committed.activity_error {
        eprintln!("Warning: activity log not written: {}", err);
    }
    committed.value
}

async fn run_balance_command(service: &LedgerService, account_id: Option<String>) -> Result<()> {
    match account_id {
        Some(id) => {
            let account = service.get_account(&id).await?;
            println!("{} ({}): {}", account.id, account.kind(), account.balance);
            if let Some(rate) = account.interest_rate() {
                println!("  Interest rate: {}", rate);
            }
            if let Some(count) = account.monthly_transactions() {
                println!("  Transactions this month: {}", count);
            }
        }
        None => {
            let accounts = service.list_accounts().await?;
            if accounts.is_empty() {
                println!("No accounts found.");
            } else {
                println!("{:<20} {:<10} {:>12} {:<20}", "ACCOUNT", "TYPE", "BALANCE", "OPENED");
                println!("{}", "-".repeat(64));
                for listing in accounts {
                    println!(
                        "{:<20} {:<10} {:>12} {:<20}",
                        truncate(&listing.account_id, 20),
                        listing.kind,
                        listing.balance,
                        listing.created_at.format("%Y-%m-%d %H:%M:%S")
                    );
                }
            }
        }
    }
    Ok(())
}

async fn run_fees_command(service: &LedgerService) -> Result<()> {
    let report = warn_on_activity_error(service.process_monthly_fees().await?);

    for applied in &report.applied {
        if applied.amount.is_zero() {
            continue;
        }
        println!(
            "{:<20} {:<10} {:>10} -> {:>12}",
            truncate(&applied.account_id, 20),
            applied.kind,
            applied.amount,
            applied.balance
        );
    }
    println!();
    println!(
        "Processed {} accounts: interest {}, fees {}",
        report.applied.len(),
        report.total_interest(),
        report.total_fees()
    );

    if !report.failed.is_empty() {
        println!("Failures:");
        for failure in &report.failed {
            println!("  - {}: {}", failure.account_id, failure.error);
        }
        anyhow::bail!("Monthly processing failed for {} accounts", report.failed.len());
    }
    Ok(())
}

async fn run_history_command(
    service: &LedgerService,
    account: Option<String>,
    limit: Option<usize>,
) -> Result<()> {
    if let Some(id) = &account {
        service.get_account(id).await?;
    }
    let filter = EntryFilter {
        account_id: account,
        limit,
        ..EntryFilter::default()
    };
    let entries = service.transaction_history_filtered(&filter).await?;

    if entries.is_empty() {
        println!("No transactions found.");
    } else {
        println!(
            "{:<20} {:<15} {:<10} {:>12} DESCRIPTION",
            "DATE", "ACCOUNT", "TYPE", "AMOUNT"
        );
        println!("{}", "-".repeat(76));
        for entry in entries {
            println!(
                "{:<20} {:<15} {:<10} {:>12} {}",
                entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
                truncate(&entry.account_id, 15),
                entry.kind,
                entry.amount,
                truncate(&entry.description, 30)
            );
        }
    }
    Ok(())
}

async fn run_check_command(service: &LedgerService) -> Result<()> {
    println!("Checking ledger integrity...\n");

    let report = service.check_integrity().await?;

    println!("Accounts:    {}", report.account_count);
    println!("Log entries: {}", report.entry_count);
    println!("Transfers:   {}", report.transfer_count);
    println!();

    if report.is_healthy() {
        println!("Ledger is consistent.");
    } else {
        println!("Issues found:");
        for mismatch in &report.mismatches {
            println!(
                "  - {}: stored balance {} but log sums to {}",
                mismatch.account_id, mismatch.stored, mismatch.logged
            );
        }
        if report.orphaned_entries > 0 {
            println!(
                "  - {} log entries reference missing accounts",
                report.orphaned_entries
            );
        }
        anyhow::bail!("Ledger integrity check failed");
    }

    Ok(())
}

async fn run_export_command(
    service: &LedgerService,
    export_type: &str,
    format: &str,
    output: Option<&str>,
    account: Option<&str>,
) -> Result<()> {
    use crate::io::Exporter;
    use std::fs::File;
    use std::io::{stdout, Write};

    let exporter = Exporter::new(service);

    let writer: Box<dyn Write> = match output {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create output file: {}", path))?;
            Box::new(file)
        }
        None => Box::new(stdout()),
    };

    let count = match (export_type, format) {
        ("history", "csv") => exporter.export_history_csv(writer, account).await?,
        ("history", "json") => exporter.export_history_json(writer, account).await?,
        ("accounts", "csv") => exporter.export_accounts_csv(writer).await?,
        ("accounts", "json") => exporter.export_accounts_json(writer).await?,
        ("full", _) => {
            let snapshot = exporter.export_full_json(writer).await?;
            if output.is_some() {
                eprintln!(
                    "Exported full ledger: {} accounts, {} log entries, {} transfers",
                    snapshot.accounts.len(),
                    snapshot.entries.len(),
                    snapshot.transfers.len()
                );
            }
            return Ok(());
        }
        ("history" | "accounts", _) => {
            anyhow::bail!("Invalid format '{}'. Valid formats: csv, json", format);
        }
        _ => {
            anyhow::bail!(
                "Invalid export type '{}'. Valid types: history, accounts, full",
                export_type
            );
        }
    };

    if output.is_some() {
        eprintln!("Exported {} {} records", count, export_type);
    }
    Ok(())
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("a-very-long-account-id", 10), "a-very-...");
    }

    #[test]
    fn test_parse_amount() {
        assert_eq!(parse_amount("50").unwrap(), Money::from_cents(5000));
        assert!(parse_amount("fifty").is_err());
    }

    #[test]
    fn test_cli_parses_transfer() {
        let cli = Cli::try_parse_from([
            "coffer", "--database", "test.db", "transfer", "30", "--from", "S1", "--to", "C1",
        ])
        .unwrap();
        assert!(matches!(
            cli.command,
            Commands::Transfer { ref from, ref to, .. } if from == "S1" && to == "C1"
        ));
    }
}

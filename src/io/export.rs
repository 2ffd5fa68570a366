use anyhow::Result;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::io::Write;

use crate::application::{AccountListing, LedgerService};
use crate::domain::{Account, LogEntry, TransferRecord};

/// Full ledger snapshot for JSON export
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    pub version: String,
    pub exported_at: DateTime<Utc>,
    pub accounts: Vec<Account>,
    pub entries: Vec<LogEntry>,
    pub transfers: Vec<TransferRecord>,
}

/// Exporter for converting ledger data to various formats
pub struct Exporter<'a> {
    service: &'a LedgerService,
}

impl<'a> Exporter<'a> {
    pub fn new(service: &'a LedgerService) -> Self {
        Self { service }
    }

    /// Export the transaction history to CSV format, most recent first
    pub async fn export_history_csv<W: Write>(
        &self,
        writer: W,
        account_id: Option<&str>,
    ) -> Result<usize> {
        let entries = self.service.transaction_history(account_id).await?;
        let mut csv_writer = csv::Writer::from_writer(writer);

        csv_writer.write_record([
            "timestamp",
            "account",
            "amount",
            "type",
            "related_account",
            "description",
            "id",
        ])?;

        let mut count = 0;
        for entry in &entries {
            csv_writer.write_record([
                entry.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
                entry.account_id.clone(),
                entry.amount.to_string(),
                entry.kind.as_str().to_string(),
                entry.related_account_id.clone().unwrap_or_default(),
                entry.description.clone(),
                entry.id.to_string(),
            ])?;
            count += 1;
        }

        csv_writer.flush()?;
        Ok(count)
    }

    /// Export the transaction history as a JSON array
    pub async fn export_history_json<W: Write>(
        &self,
        mut writer: W,
        account_id: Option<&str>,
    ) -> Result<usize> {
        let entries = self.service.transaction_history(account_id).await?;

        serde_json::to_writer_pretty(&mut writer, &entries)?;
        writer.flush()?;

        Ok(entries.len())
    }

    /// Export account balances to CSV format
    pub async fn export_accounts_csv<W: Write>(&self, writer: W) -> Result<usize> {
        let accounts = self.service.list_accounts().await?;
        let mut csv_writer = csv::Writer::from_writer(writer);

        csv_writer.write_record(["account", "type", "balance", "created_at"])?;

        let mut count = 0;
        for listing in &accounts {
            csv_writer.write_record([
                listing.account_id.as_str(),
                listing.kind.as_str(),
                listing.balance.to_string().as_str(),
                listing.created_at.to_rfc3339().as_str(),
            ])?;
            count += 1;
        }

        csv_writer.flush()?;
        Ok(count)
    }

    /// Export account balances as a JSON array
    pub async fn export_accounts_json<W: Write>(&self, mut writer: W) -> Result<usize> {
        let accounts: Vec<AccountListing> = self.service.list_accounts().await?;

        serde_json::to_writer_pretty(&mut writer, &accounts)?;
        writer.flush()?;

        Ok(accounts.len())
    }

    /// Export accounts, history and transfer summaries as one JSON snapshot
    pub async fn export_full_json<W: Write>(&self, mut writer: W) -> Result<LedgerSnapshot> {
        let mut accounts = Vec::new();
        for listing in self.service.list_accounts().await? {
            accounts.push(self.service.get_account(&listing.account_id).await?);
        }

        let snapshot = LedgerSnapshot {
            version: env!("CARGO_PKG_VERSION").to_string(),
            exported_at: Utc::now(),
            accounts,
            entries: self.service.transaction_history(None).await?,
            transfers: self.service.transfer_history().await?,
        };

        let json = serde_json::to_string_pretty(&snapshot)?;
        writer.write_all(json.as_bytes())?;
        writer.flush()?;

        Ok(snapshot)
    }
}

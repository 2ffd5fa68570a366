//! Best-effort activity log.
//!
//! After a ledger mutation commits, the service hands one human-readable line per
//! log entry (and one per transfer) to an [`ActivitySink`]. A sink failure is
//! reported back to the caller but never undoes the committed mutation.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Mutex;

use chrono::{DateTime, Local, Utc};

use crate::domain::{LogEntry, TransferRecord};

const LINE_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %I:%M:%S %p";

pub trait ActivitySink: Send + Sync {
    fn record(&self, line: &str) -> io::Result<()>;
}

fn line_timestamp(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local).format(LINE_TIMESTAMP_FORMAT).to_string()
}

/// `[<time>] DEPOSIT: Account S1 - $25.00`
pub fn entry_line(entry: &LogEntry) -> String {
    let activity = if entry.is_credit() { "DEPOSIT" } else { "WITHDRAWAL" };
    format!(
        "[{}] {}: Account {} - ${}",
        line_timestamp(entry.timestamp),
        activity,
        entry.account_id,
        entry.amount.abs()
    )
}

/// `[<time>] TRANSFER: From S1 to C1 - $30.00`
pub fn transfer_line(transfer: &TransferRecord) -> String {
    format!(
        "[{}] TRANSFER: From {} to {} - ${}",
        line_timestamp(transfer.timestamp),
        transfer.from_account,
        transfer.to_account,
        transfer.amount
    )
}

/// Appends lines to `<dir>/transactions-YYYY-MM-DD.txt`, one file per local day.
pub struct FileActivitySink {
    dir: PathBuf,
}

impl FileActivitySink {
    pub fn new(dir: impl Into<PathBuf>) -> io::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn current_file(&self) -> PathBuf {
        self.dir
            .join(format!("transactions-{}.txt", Local::now().format("%Y-%m-%d")))
    }
}

impl ActivitySink for FileActivitySink {
    fn record(&self, line: &str) -> io::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.current_file())?;
        writeln!(file, "{}", line)?;
        file.flush()
    }
}

/// Keeps lines in memory; useful for embedding and tests.
#[derive(Default)]
pub struct MemoryActivitySink {
    lines: Mutex<Vec<String>>,
}

impl MemoryActivitySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .map(|lines| lines.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }
}

impl ActivitySink for MemoryActivitySink {
    fn record(&self, line: &str) -> io::Result<()> {
        self.lines
            .lock()
            .map_err(|_| io::Error::other("activity buffer poisoned"))?
            .push(line.to_string());
        Ok(())
    }
}

/// Discards everything.
pub struct NullActivitySink;

impl ActivitySink for NullActivitySink {
    fn record(&self, _line: &str) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::domain::Money;

    #[test]
    fn test_entry_line_format() {
        let deposit = LogEntry::movement("S1", Money::from_cents(2500), Utc::now(), "Deposit");
        let withdrawal = LogEntry::movement("C1", Money::from_cents(-14000), Utc::now(), "Withdrawal");

        let line = entry_line(&deposit);
        assert!(line.starts_with('['));
        assert!(line.ends_with("] DEPOSIT: Account S1 - $25.00"), "{}", line);
        assert!(entry_line(&withdrawal).ends_with("] WITHDRAWAL: Account C1 - $140.00"));
    }

    #[test]
    fn test_transfer_line_format() {
        let transfer = TransferRecord::new("S1", "C1", Money::from_cents(3000), Utc::now());
        assert!(transfer_line(&transfer).ends_with("] TRANSFER: From S1 to C1 - $30.00"));
    }

    #[test]
    fn test_file_sink_appends() {
        let temp = TempDir::new().unwrap();
        let sink = FileActivitySink::new(temp.path().join("logs")).unwrap();

        sink.record("first").unwrap();
        sink.record("second").unwrap();

        let content = fs::read_to_string(sink.current_file()).unwrap();
        assert_eq!(content, "first\nsecond\n");
    }

    #[test]
    fn test_memory_sink_keeps_order() {
        let sink = MemoryActivitySink::new();
        sink.record("a").unwrap();
        sink.record("b").unwrap();
        assert_eq!(sink.lines(), vec!["a".to_string(), "b".to_string()]);
    }
}

// Allow dead_code because these helpers are used across different test files
// which are compiled separately
#![allow(dead_code)]

use std::io;
use std::sync::Arc;

use anyhow::Result;
use coffer::application::LedgerService;
use coffer::domain::{AccountKind, Money};
use coffer::io::{ActivitySink, MemoryActivitySink};
use rust_decimal_macros::dec;
use tempfile::TempDir;

/// Helper to create a test service with a temporary database
pub async fn test_service() -> Result<(LedgerService, TempDir)> {
    let temp_dir = TempDir::new()?;
    let db_path = temp_dir.path().join("test.db");
    let service = LedgerService::init(db_path.to_str().unwrap()).await?;
    Ok((service, temp_dir))
}

/// Helper to create a test service whose activity lines are kept in memory
pub async fn test_service_with_sink() -> Result<(LedgerService, Arc<MemoryActivitySink>, TempDir)> {
    let (service, temp_dir) = test_service().await?;
    let sink = Arc::new(MemoryActivitySink::new());
    let service = service.with_activity_sink(sink.clone());
    Ok((service, sink, temp_dir))
}

/// Helper to parse a money literal
pub fn money(input: &str) -> Money {
    Money::parse(input).unwrap()
}

/// Activity sink that always fails
pub struct FailingSink;

impl ActivitySink for FailingSink {
    fn record(&self, _line: &str) -> io::Result<()> {
        Err(io::Error::other("disk full"))
    }
}

/// Test fixture: the reference accounts
pub struct StandardAccounts;

impl StandardAccounts {
    /// Savings "S1" with 200.00 at 2.5% and Checking "C1" with 50.00
    pub async fn create(service: &LedgerService) -> Result<()> {
        service
            .open_savings_account("S1", money("200.00"), dec!(0.025))
            .await?
            .into_result()?;
        service
            .open_account(AccountKind::Checking, "C1", money("50.00"))
            .await?
            .into_result()?;
        Ok(())
    }
}

mod common;

use std::sync::Arc;

use anyhow::Result;
use coffer::application::LedgerError;
use coffer::domain::{AccountKind, EntryKind, Money};
use common::{StandardAccounts, money, test_service, test_service_with_sink};

#[tokio::test]
async fn test_transfer_writes_both_legs_and_summary() -> Result<()> {
    let (service, sink, _temp) = test_service_with_sink().await?;
    StandardAccounts::create(&service).await?;
    service.deposit("S1", money("5.00")).await?.into_result()?;
    service.withdraw("C1", money("140.00")).await?.into_result()?;

    let receipt = service
        .transfer("S1", "C1", money("30.00"))
        .await?
        .into_result()?;

    assert_eq!(receipt.from.balance, money("175.00"));
    assert_eq!(receipt.to.balance, money("-60.00"));
    assert_eq!(service.get_balance("S1").await?, money("175.00"));
    assert_eq!(service.get_balance("C1").await?, money("-60.00"));

    assert_eq!(receipt.debit.account_id, "S1");
    assert_eq!(receipt.debit.amount, money("-30.00"));
    assert_eq!(receipt.debit.kind, EntryKind::Transfer);
    assert_eq!(receipt.debit.related_account_id.as_deref(), Some("C1"));
    assert_eq!(receipt.credit.account_id, "C1");
    assert_eq!(receipt.credit.amount, money("30.00"));
    assert_eq!(receipt.credit.related_account_id.as_deref(), Some("S1"));

    let transfers = service.transfer_history().await?;
    assert_eq!(transfers.len(), 1);
    assert_eq!(transfers[0].from_account, "S1");
    assert_eq!(transfers[0].to_account, "C1");
    assert_eq!(transfers[0].amount, money("30.00"));
    assert_eq!(transfers[0].id, receipt.record.id);

    let lines = sink.lines();
    let tail = &lines[lines.len() - 3..];
    assert!(tail[0].ends_with("WITHDRAWAL: Account S1 - $30.00"));
    assert!(tail[1].ends_with("DEPOSIT: Account C1 - $30.00"));
    assert!(tail[2].ends_with("TRANSFER: From S1 to C1 - $30.00"));

    // Destination checking account counts the incoming leg
    assert_eq!(receipt.to.monthly_transactions(), Some(2));

    Ok(())
}

#[tokio::test]
async fn test_rejected_transfer_changes_nothing() -> Result<()> {
    let (service, _temp) = test_service().await?;
    StandardAccounts::create(&service).await?;

    let result = service.transfer("S1", "C1", money("150.00")).await;
    assert!(matches!(result, Err(LedgerError::InsufficientFunds { .. })));

    assert_eq!(service.get_balance("S1").await?, money("200.00"));
    assert_eq!(service.get_balance("C1").await?, money("50.00"));
    assert!(service.transfer_history().await?.is_empty());
    assert_eq!(service.transaction_history(None).await?.len(), 2);

    // Checking source uses its overdraft floor
    let result = service.transfer("C1", "S1", money("150.01")).await;
    assert!(matches!(result, Err(LedgerError::OverdraftLimitExceeded { .. })));
    service.transfer("C1", "S1", money("150.00")).await?.into_result()?;
    assert_eq!(service.get_balance("C1").await?, money("-100.00"));

    Ok(())
}

#[tokio::test]
async fn test_transfer_validation() -> Result<()> {
    let (service, _temp) = test_service().await?;
    StandardAccounts::create(&service).await?;

    assert!(matches!(
        service.transfer("S1", "C1", Money::ZERO).await,
        Err(LedgerError::InvalidAmount(_))
    ));
    assert!(matches!(
        service.transfer("S1", "S1", money("1.00")).await,
        Err(LedgerError::SameAccount(id)) if id == "S1"
    ));
    assert!(matches!(
        service.transfer("S1", "NOPE", money("1.00")).await,
        Err(LedgerError::AccountNotFound(id)) if id == "NOPE"
    ));
    assert!(matches!(
        service.transfer("NOPE", "S1", money("1.00")).await,
        Err(LedgerError::AccountNotFound(id)) if id == "NOPE"
    ));

    // A failed lookup on the destination leaves the source alone
    assert_eq!(service.get_balance("S1").await?, money("200.00"));
    assert!(service.transfer_history().await?.is_empty());

    Ok(())
}

#[tokio::test]
async fn test_transfers_conserve_total_balance() -> Result<()> {
    let (service, _temp) = test_service().await?;
    StandardAccounts::create(&service).await?;
    service
        .open_account(AccountKind::Checking, "C2", money("75.00"))
        .await?
        .into_result()?;

    let before = service.account_summary().await?.total_balance;

    service.transfer("S1", "C1", money("40.00")).await?.into_result()?;
    service.transfer("C1", "C2", money("100.00")).await?.into_result()?;
    service.transfer("C2", "S1", money("12.34")).await?.into_result()?;

    assert_eq!(service.account_summary().await?.total_balance, before);

    let report = service.check_integrity().await?;
    assert!(report.is_healthy(), "{:?}", report);
    assert_eq!(report.transfer_count, 3);

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_transfers_on_shared_account() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let service = Arc::new(service);
    service
        .open_account(AccountKind::Checking, "HUB", money("1000.00"))
        .await?
        .into_result()?;
    for id in ["A", "B", "C", "D"] {
        service
            .open_account(AccountKind::Checking, id, money("100.00"))
            .await?
            .into_result()?;
    }

    let mut handles = Vec::new();
    for (i, id) in ["A", "B", "C", "D"].into_iter().enumerate() {
        for round in 0..5 {
            let service = Arc::clone(&service);
            handles.push(tokio::spawn(async move {
                if (i + round) % 2 == 0 {
                    service.transfer("HUB", id, money("10.00")).await
                } else {
                    service.transfer(id, "HUB", money("5.00")).await
                }
            }));
        }
    }
    for handle in handles {
        handle.await??.into_result()?;
    }

    let summary = service.account_summary().await?;
    assert_eq!(summary.total_accounts, 5);
    assert_eq!(summary.total_balance, money("1400.00"));
    assert_eq!(service.transfer_history().await?.len(), 20);

    let report = service.check_integrity().await?;
    assert!(report.is_healthy(), "{:?}", report);

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_opposite_transfers_do_not_deadlock() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let service = Arc::new(service);
    for id in ["X", "Y"] {
        service
            .open_account(AccountKind::Checking, id, money("500.00"))
            .await?
            .into_result()?;
    }

    let mut handles = Vec::new();
    for n in 0..10 {
        let service = Arc::clone(&service);
        handles.push(tokio::spawn(async move {
            if n % 2 == 0 {
                service.transfer("X", "Y", money("1.00")).await
            } else {
                service.transfer("Y", "X", money("1.00")).await
            }
        }));
    }
    for handle in handles {
        handle.await??.into_result()?;
    }

    assert_eq!(service.get_balance("X").await?, money("500.00"));
    assert_eq!(service.get_balance("Y").await?, money("500.00"));

    Ok(())
}

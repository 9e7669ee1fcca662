//! Concurrency properties of the ledger over the in-memory store

use std::sync::Arc;
use std::time::Duration;

use agentrix_ledger::{
    Account, AccountStatus, FundOperation, Ledger, LedgerError, NewAccount, Owner, WalletType,
};
use futures::future::join_all;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tokio::time::timeout;

async fn open(ledger: &Ledger, owner: &Owner, balance: Decimal) -> Account {
    let account = ledger
        .create_account(NewAccount::new("Main", owner.clone(), WalletType::Virtual))
        .await
        .unwrap();
    if balance.is_zero() {
        return account;
    }
    ledger
        .deposit(&account.id, FundOperation::new(balance))
        .await
        .unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn opposite_transfers_never_deadlock() {
    let ledger = Arc::new(Ledger::in_memory());
    let a = open(&ledger, &Owner::user("alice"), dec!(1000)).await;
    let b = open(&ledger, &Owner::user("bob"), dec!(1000)).await;

    let mut tasks = Vec::new();
    for i in 0..200 {
        let ledger = ledger.clone();
        let (from, to) = if i % 2 == 0 { (a.id, b.id) } else { (b.id, a.id) };
        tasks.push(tokio::spawn(async move {
            ledger
                .transfer(&from, &to, FundOperation::new(dec!(1.5)))
                .await
        }));
    }

    let results = timeout(Duration::from_secs(10), join_all(tasks))
        .await
        .expect("opposite transfers deadlocked");
    for result in results {
        result.unwrap().unwrap();
    }

    let a = ledger.get_account(&a.id).await.unwrap();
    let b = ledger.get_account(&b.id).await.unwrap();
    assert_eq!(a.available_balance, dec!(1000));
    assert_eq!(b.available_balance, dec!(1000));
    assert_eq!(a.transaction_count, 201);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_deposits_are_not_lost() {
    let ledger = Arc::new(Ledger::in_memory());
    let account = open(&ledger, &Owner::agent(agentrix_types::AgentId::new()), Decimal::ZERO).await;

    let tasks: Vec<_> = (0..100)
        .map(|_| {
            let ledger = ledger.clone();
            let id = account.id;
            tokio::spawn(async move { ledger.deposit(&id, FundOperation::new(dec!(0.01))).await })
        })
        .collect();
    for result in join_all(tasks).await {
        result.unwrap().unwrap();
    }

    let account = ledger.get_account(&account.id).await.unwrap();
    assert_eq!(account.available_balance, dec!(1.00));
    assert_eq!(account.total_deposit, dec!(1.00));
    assert_eq!(account.transaction_count, 100);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_withdrawals_never_overdraw() {
    let ledger = Arc::new(Ledger::in_memory());
    let account = open(&ledger, &Owner::merchant("m-1"), dec!(100)).await;

    let tasks: Vec<_> = (0..50)
        .map(|_| {
            let ledger = ledger.clone();
            let id = account.id;
            tokio::spawn(async move { ledger.withdraw(&id, FundOperation::new(dec!(7))).await })
        })
        .collect();

    let mut succeeded = 0;
    for result in join_all(tasks).await {
        match result.unwrap() {
            Ok(account) => {
                assert!(account.available_balance >= Decimal::ZERO);
                succeeded += 1;
            }
            Err(LedgerError::InsufficientFunds { .. }) => {}
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    let account = ledger.get_account(&account.id).await.unwrap();
    assert_eq!(succeeded, 14);
    assert_eq!(account.available_balance, dec!(2));
    assert_eq!(account.total_withdraw, dec!(98));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn transfers_across_many_accounts_conserve_total() {
    let ledger = Arc::new(Ledger::in_memory());
    let mut ids = Vec::new();
    for i in 0..5 {
        let account = open(&ledger, &Owner::user(format!("u-{i}")), dec!(100)).await;
        ids.push(account.id);
    }

    let tasks: Vec<_> = (0..300)
        .map(|i| {
            let ledger = ledger.clone();
            let from = ids[i % ids.len()];
            let to = ids[(i * 3 + 1) % ids.len()];
            tokio::spawn(async move {
                if from == to {
                    return;
                }
                let amount = Decimal::from((i % 40) as i64 + 1);
                match ledger.transfer(&from, &to, FundOperation::new(amount)).await {
                    Ok(_) | Err(LedgerError::InsufficientFunds { .. }) => {}
                    Err(other) => panic!("unexpected error: {other}"),
                }
            })
        })
        .collect();

    timeout(Duration::from_secs(10), join_all(tasks))
        .await
        .expect("transfers deadlocked");

    let accounts = ledger.get_accounts(&ids).await.unwrap();
    let total: Decimal = accounts.iter().map(|a| a.available_balance).sum();
    assert_eq!(total, dec!(500));
    for account in accounts {
        assert!(account.ensure_non_negative().is_ok());
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_set_default_leaves_one_default() {
    let ledger = Arc::new(Ledger::in_memory());
    let owner = Owner::user("carol");
    let mut ids = Vec::new();
    for _ in 0..6 {
        ids.push(open(&ledger, &owner, Decimal::ZERO).await.id);
    }

    let tasks: Vec<_> = (0..60)
        .map(|i| {
            let ledger = ledger.clone();
            let owner = owner.clone();
            let id = ids[i % ids.len()];
            tokio::spawn(async move { ledger.set_default_account(&id, &owner).await })
        })
        .collect();

    let mut observers = Vec::new();
    for _ in 0..20 {
        let ledger = ledger.clone();
        let owner = owner.clone();
        observers.push(tokio::spawn(async move {
            let accounts = ledger.list_accounts(&owner).await.unwrap();
            accounts.iter().filter(|a| a.is_default).count()
        }));
    }

    for result in join_all(tasks).await {
        result.unwrap().unwrap();
    }
    for observed in join_all(observers).await {
        assert!(observed.unwrap() <= 1);
    }

    let accounts = ledger.list_accounts(&owner).await.unwrap();
    assert_eq!(accounts.iter().filter(|a| a.is_default).count(), 1);
    assert!(accounts[0].is_default);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn freeze_races_with_deposits() {
    let ledger = Arc::new(Ledger::in_memory());
    let account = open(&ledger, &Owner::platform("fees"), dec!(10)).await;

    let mut tasks = Vec::new();
    for i in 0..40 {
        let ledger = ledger.clone();
        let id = account.id;
        tasks.push(tokio::spawn(async move {
            if i == 20 {
                ledger.freeze_account(&id, Some("review".into())).await.map(|_| ())
            } else {
                ledger
                    .deposit(&id, FundOperation::new(dec!(1)))
                    .await
                    .map(|_| ())
            }
        }));
    }

    let mut deposits = 0i64;
    for result in join_all(tasks).await {
        match result.unwrap() {
            Ok(()) => deposits += 1,
            Err(err) => assert!(matches!(err, LedgerError::InvalidState { .. })),
        }
    }
    // The freeze itself counts as one success
    deposits -= 1;

    let account = ledger.get_account(&account.id).await.unwrap();
    assert_eq!(account.status, AccountStatus::Frozen);
    assert_eq!(account.available_balance, dec!(10) + Decimal::from(deposits));
    assert_eq!(account.transaction_count, 1 + deposits);
}

//! Concurrency tests
//!
//! Every operation is one unit of work on the store, so concurrent callers
//! can never both pass a balance check that only one of them fits into.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::{Arc, Barrier};
use std::thread;
use stream_ledger::{
    BalanceEngine, InMemoryLedgerStore, LedgerConfig, LedgerError, ReferenceType,
    StreamHoldManager,
};

type Engine = BalanceEngine<InMemoryLedgerStore>;

fn engine_with(accounts: &[(&str, Decimal)]) -> Engine {
    let engine = BalanceEngine::new(Arc::new(InMemoryLedgerStore::new()), LedgerConfig::default());
    for (account_id, amount) in accounts {
        engine.open_account(account_id).unwrap();
        if !amount.is_zero() {
            engine
                .credit(account_id, *amount, ReferenceType::Deposit, "seed", "")
                .unwrap();
        }
    }
    engine
}

fn assert_replays(engine: &Engine, account_id: &str) {
    let report = engine.verify_account(account_id).unwrap();
    assert_eq!(report.live, report.replayed);
}

#[test]
fn test_two_concurrent_debits_exactly_one_succeeds() {
    for _ in 0..50 {
        let engine = engine_with(&[("acc", dec!(100))]);
        let barrier = Arc::new(Barrier::new(2));

        let results: Vec<Result<_, LedgerError>> = thread::scope(|scope| {
            let handles: Vec<_> = (0..2)
                .map(|i| {
                    let engine = engine.clone();
                    let barrier = Arc::clone(&barrier);
                    scope.spawn(move || {
                        barrier.wait();
                        engine.debit(
                            "acc",
                            dec!(60),
                            ReferenceType::Withdrawal,
                            &format!("w-{}", i),
                            "",
                        )
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let successes = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(successes, 1);
        assert!(results.iter().any(|r| matches!(
            r,
            Err(LedgerError::InsufficientBalance { available, requested, .. })
                if *available == dec!(40) && *requested == dec!(60)
        )));

        let balance = engine.get_balance("acc").unwrap();
        assert_eq!(balance.available, dec!(40));
        assert_eq!(balance.total, dec!(40));
        assert_replays(&engine, "acc");
    }
}

#[test]
fn test_opposing_transfers_conserve_funds() {
    let engine = engine_with(&[("a", dec!(1000)), ("b", dec!(1000))]);

    thread::scope(|scope| {
        for i in 0..8 {
            let engine = engine.clone();
            scope.spawn(move || {
                let (from, to) = if i % 2 == 0 { ("a", "b") } else { ("b", "a") };
                for n in 0..200 {
                    let _ = engine.transfer(
                        from,
                        to,
                        dec!(7.5),
                        ReferenceType::Transfer,
                        &format!("t-{}-{}", i, n),
                        "",
                    );
                }
            });
        }
    });

    let a = engine.get_balance("a").unwrap();
    let b = engine.get_balance("b").unwrap();
    assert_eq!(a.total + b.total, dec!(2000));
    assert!(a.available >= Decimal::ZERO);
    assert!(b.available >= Decimal::ZERO);
    assert_replays(&engine, "a");
    assert_replays(&engine, "b");
}

#[test]
fn test_same_stream_id_on_two_accounts_is_held_once() {
    for _ in 0..50 {
        let engine = engine_with(&[("a", dec!(100)), ("b", dec!(100))]);
        let barrier = Arc::new(Barrier::new(2));

        let results: Vec<_> = thread::scope(|scope| {
            let handles: Vec<_> = ["a", "b"]
                .into_iter()
                .map(|account_id| {
                    let engine = engine.clone();
                    let barrier = Arc::clone(&barrier);
                    scope.spawn(move || {
                        barrier.wait();
                        engine.hold_for_stream(account_id, "shared", dec!(10), dec!(2))
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results
            .iter()
            .any(|r| matches!(r, Err(LedgerError::StreamAlreadyHeld { .. }))));

        let reserved = engine.get_balance("a").unwrap().in_streams.total
            + engine.get_balance("b").unwrap().in_streams.total;
        assert_eq!(reserved, dec!(10));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_payouts_and_completion_race_on_multi_thread_runtime() {
    let engine = engine_with(&[("payer", dec!(10000))]);
    let manager = StreamHoldManager::new(engine.clone());
    manager.start("payer", "s1", dec!(1000), dec!(100)).unwrap();

    let mut tasks = Vec::new();
    for n in 0..20 {
        let manager = manager.clone();
        tasks.push(tokio::task::spawn_blocking(move || {
            manager.payout("s1", dec!(10), &format!("p-{}", n))
        }));
    }
    for task in tasks {
        let _ = task.await.unwrap();
    }

    let (hold, returned) = manager.complete("s1", dec!(300)).unwrap();

    assert_eq!(hold.streamed, dec!(500));
    assert_eq!(returned, dec!(500));
    let balance = engine.get_balance("payer").unwrap();
    assert_eq!(balance.total, dec!(9500));
    assert_eq!(balance.available, dec!(9500));
    assert_eq!(balance.in_streams.total, Decimal::ZERO);
    assert_eq!(balance.in_streams.buffer, Decimal::ZERO);
    assert_replays(&engine, "payer");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_mixed_credits_and_debits_keep_invariants() {
    let engine = engine_with(&[("acc", dec!(50))]);

    let mut tasks = Vec::new();
    for n in 0..64 {
        let engine = engine.clone();
        tasks.push(tokio::task::spawn_blocking(move || {
            let reference = format!("op-{}", n);
            if n % 2 == 0 {
                engine.credit("acc", dec!(3), ReferenceType::Deposit, &reference, "")
            } else {
                engine.debit("acc", dec!(5), ReferenceType::Withdrawal, &reference, "")
            }
        }));
    }

    let mut debited = 0;
    for (n, task) in tasks.into_iter().enumerate() {
        let result = task.await.unwrap();
        if n % 2 == 1 && result.is_ok() {
            debited += 1;
        }
    }

    let balance = engine.get_balance("acc").unwrap();
    assert_eq!(
        balance.total,
        dec!(50) + dec!(3) * Decimal::from(32) - dec!(5) * Decimal::from(debited)
    );
    assert!(balance.available >= Decimal::ZERO);
    assert_replays(&engine, "acc");
}

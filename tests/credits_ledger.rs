//! Integration tests for the credits ledger
//!
//! Tests cover:
//! - Running-sum accounting across mixed operations
//! - The per-row ledger invariant and the balance chain
//! - Insufficient-funds denials leaving no trace
//! - Concurrent deductions for one user
//! - Refunds and history aggregates
//! - Manipulation detection over recorded activity
//! - Postgres-backed storage (ignored unless TEST_DATABASE_URL is set)

use std::sync::Arc;

use serde_json::{Value, json};

use pixora_metering::application::{
    CreditsLedgerService, LedgerDenial, LedgerReceipt, ManipulationDetector, ManipulationReason,
};
use pixora_metering::config::DetectionConfig;
use pixora_metering::domain::credits::{CreditsStore, TransactionReason};
use pixora_metering::domain::identity::UserId;
use pixora_metering::infrastructure::InMemoryCreditsStore;

// ============================================================================
// Test Fixtures
// ============================================================================

fn ledger(initial_balance: i64) -> (CreditsLedgerService, Arc<InMemoryCreditsStore>) {
    let store = Arc::new(InMemoryCreditsStore::new(initial_balance));
    (CreditsLedgerService::new(store.clone()), store)
}

async fn fund(service: &CreditsLedgerService, user: UserId, amount: u32) -> LedgerReceipt {
    let receipt = service
        .add_points(user, amount, TransactionReason::Purchase, None, Value::Null)
        .await
        .unwrap();
    assert!(receipt.success);
    receipt
}

async fn spend(service: &CreditsLedgerService, user: UserId, amount: u32) -> LedgerReceipt {
    service
        .deduct_points(user, amount, TransactionReason::Generation, None, None, Value::Null)
        .await
        .unwrap()
}

// ============================================================================
// Accounting Properties
// ============================================================================

mod accounting_tests {
    use super::*;

    #[tokio::test]
    async fn test_balance_tracks_successful_operations_only() {
        let (service, _) = ledger(20);
        let user = UserId::generate();
        let mut expected = 20_i64;

        let receipt = fund(&service, user, 100).await;
        expected += 100;
        assert_eq!(receipt.balance, expected);
        assert_eq!(service.balance(user).await.unwrap(), expected);

        let receipt = spend(&service, user, 50).await;
        assert!(receipt.success);
        expected -= 50;
        assert_eq!(service.balance(user).await.unwrap(), expected);

        // Denied deduction moves nothing
        let receipt = spend(&service, user, 500).await;
        assert!(!receipt.success);
        assert_eq!(service.balance(user).await.unwrap(), expected);

        let receipt = spend(&service, user, 70).await;
        assert!(receipt.success);
        expected -= 70;
        assert_eq!(service.balance(user).await.unwrap(), expected);
        assert_eq!(expected, 0);
    }

    #[tokio::test]
    async fn test_every_recorded_row_is_consistent_and_chained() {
        let (service, _) = ledger(0);
        let user = UserId::generate();

        fund(&service, user, 100).await;
        spend(&service, user, 30).await;
        fund(&service, user, 45).await;
        spend(&service, user, 200).await; // denied, must not appear
        spend(&service, user, 115).await;

        let history = service.history(user, 50, 0).await.unwrap();
        assert_eq!(history.transactions.len(), 4);

        for entry in &history.transactions {
            assert!(entry.balances_consistent());
        }
        // Newest first: each row starts where the previous one ended
        for pair in history.transactions.windows(2) {
            assert_eq!(pair[0].balance_before, pair[1].balance_after);
        }
        assert_eq!(
            history.current_balance,
            history.transactions[0].balance_after
        );
    }

    #[tokio::test]
    async fn test_insufficient_funds_leaves_balance_and_log_untouched() {
        let (service, _) = ledger(10);
        let user = UserId::generate();

        let receipt = spend(&service, user, 11).await;
        assert!(!receipt.success);
        assert_eq!(receipt.denial, Some(LedgerDenial::InsufficientPoints));
        assert_eq!(receipt.balance, 10);
        assert_eq!(receipt.transaction_id, None);

        assert_eq!(service.balance(user).await.unwrap(), 10);
        let history = service.history(user, 10, 0).await.unwrap();
        assert!(history.transactions.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_user_reads_the_initial_balance() {
        let (service, _) = ledger(5);
        assert_eq!(service.balance(UserId::generate()).await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_generation_payment_and_refund_flow() {
        let (service, _) = ledger(0);
        let user = UserId::generate();
        fund(&service, user, 80).await;

        let payment = service
            .deduct_points(
                user,
                25,
                TransactionReason::Generation,
                Some("gen_7f3a".to_string()),
                None,
                json!({"model": "pixora-xl"}),
            )
            .await
            .unwrap();
        assert!(payment.success);
        assert_eq!(payment.balance, 55);
        let payment_id = payment.transaction_id.unwrap();

        // Generation failed downstream; the web layer refunds
        let refund = service.refund_points(user, 25, payment_id).await.unwrap();
        assert!(refund.success);
        assert_eq!(refund.balance, 80);

        let history = service.history(user, 10, 0).await.unwrap();
        let refund_entry = &history.transactions[0];
        assert_eq!(refund_entry.reason, TransactionReason::Refund);
        assert_eq!(refund_entry.reference_id, Some(payment_id));

        let payment_entry = &history.transactions[1];
        assert_eq!(payment_entry.generation_id.as_deref(), Some("gen_7f3a"));
        assert_eq!(payment_entry.metadata, json!({"model": "pixora-xl"}));
    }

    #[tokio::test]
    async fn test_history_aggregates_and_pagination() {
        let (service, _) = ledger(0);
        let user = UserId::generate();

        fund(&service, user, 100).await;
        spend(&service, user, 30).await;
        service
            .add_points(user, 50, TransactionReason::Promotion, None, Value::Null)
            .await
            .unwrap();
        spend(&service, user, 20).await;

        let history = service.history(user, 10, 0).await.unwrap();
        assert_eq!(history.total_earned, 150);
        assert_eq!(history.total_spent, 50);
        assert_eq!(history.current_balance, 100);

        let newest = service.history(user, 2, 0).await.unwrap();
        assert_eq!(newest.transactions.len(), 2);
        assert_eq!(newest.transactions[0].amount, -20);
        assert_eq!(newest.transactions[1].amount, 50);

        let older = service.history(user, 2, 2).await.unwrap();
        assert_eq!(older.transactions[0].amount, -30);
        assert_eq!(older.transactions[1].amount, 100);
    }

    #[tokio::test]
    async fn test_committed_transactions_verify_clean() {
        let (service, _) = ledger(0);
        let user = UserId::generate();

        let funded = fund(&service, user, 60).await;
        let spent = spend(&service, user, 15).await;

        for id in [
            funded.transaction_id.unwrap(),
            spent.transaction_id.unwrap(),
        ] {
            assert!(service.verify_transaction(id).await.unwrap());
        }
    }
}

// ============================================================================
// Concurrent Deductions
// ============================================================================

mod concurrency_tests {
    use super::*;

    async fn concurrent_deductions(
        service: Arc<CreditsLedgerService>,
        user: UserId,
        amount: u32,
        callers: usize,
    ) -> Vec<LedgerReceipt> {
        let mut handles = Vec::new();
        for _ in 0..callers {
            let service = service.clone();
            handles.push(tokio::spawn(async move {
                service
                    .deduct_points(
                        user,
                        amount,
                        TransactionReason::Generation,
                        None,
                        None,
                        Value::Null,
                    )
                    .await
                    .unwrap()
            }));
        }
        let mut receipts = Vec::new();
        for handle in handles {
            receipts.push(handle.await.unwrap());
        }
        receipts
    }

    #[tokio::test]
    async fn test_three_concurrent_deductions_that_fit_all_succeed() {
        let (service, _) = ledger(0);
        let user = UserId::generate();
        fund(&service, user, 100).await;

        let receipts = concurrent_deductions(Arc::new(service), user, 30, 3).await;
        let successes = receipts.iter().filter(|r| r.success).count() as i64;

        let final_balance = receipts
            .iter()
            .filter(|r| r.success)
            .map(|r| r.balance)
            .min()
            .unwrap();
        assert_eq!(successes, 3);
        assert_eq!(final_balance, 100 - 30 * successes);
        assert_eq!(final_balance, 10);
    }

    #[tokio::test]
    async fn test_oversubscribed_deductions_never_go_negative() {
        let (service, _) = ledger(0);
        let user = UserId::generate();
        fund(&service, user, 100).await;
        let service = Arc::new(service);

        let receipts = concurrent_deductions(service.clone(), user, 30, 5).await;
        let successes = receipts.iter().filter(|r| r.success).count() as i64;
        let final_balance = service.balance(user).await.unwrap();

        assert_eq!(final_balance, 100 - 30 * successes);
        assert!(final_balance >= 0);
        assert_eq!(successes, 3);
        for denied in receipts.iter().filter(|r| !r.success) {
            assert_eq!(denied.denial, Some(LedgerDenial::InsufficientPoints));
        }
    }

    #[tokio::test]
    async fn test_interleaved_additions_and_deductions_stay_consistent() {
        let (service, _) = ledger(0);
        let user = UserId::generate();
        fund(&service, user, 100).await;
        let service = Arc::new(service);

        let mut handles = Vec::new();
        for i in 0..8 {
            let service = service.clone();
            handles.push(tokio::spawn(async move {
                if i % 2 == 0 {
                    let receipt = service
                        .add_points(user, 50, TransactionReason::Purchase, None, Value::Null)
                        .await
                        .unwrap();
                    (50_i64, receipt)
                } else {
                    let receipt = service
                        .deduct_points(
                            user,
                            40,
                            TransactionReason::Generation,
                            None,
                            None,
                            Value::Null,
                        )
                        .await
                        .unwrap();
                    (-40_i64, receipt)
                }
            }));
        }

        let mut committed = 0_i64;
        for handle in handles {
            let (amount, receipt) = handle.await.unwrap();
            if receipt.success {
                committed += amount;
            }
        }

        let final_balance = service.balance(user).await.unwrap();
        assert_eq!(final_balance, 100 + committed);
        assert!(final_balance >= 0);

        let history = service.history(user, 50, 0).await.unwrap();
        for pair in history.transactions.windows(2) {
            assert_eq!(pair[0].balance_before, pair[1].balance_after);
        }
    }

    #[tokio::test]
    async fn test_accounting_survives_exhausted_retries() {
        // A single optimistic attempt loses races under contention; losers
        // must fail without corrupting the running sum
        let store = Arc::new(InMemoryCreditsStore::new(0).with_max_retries(1));
        let service = Arc::new(CreditsLedgerService::new(store));
        let user = UserId::generate();

        let mut handles = Vec::new();
        for _ in 0..10 {
            let service = service.clone();
            handles.push(tokio::spawn(async move {
                service
                    .add_points(user, 10, TransactionReason::Purchase, None, Value::Null)
                    .await
                    .unwrap()
            }));
        }

        let mut successes = 0_i64;
        for handle in handles {
            let receipt = handle.await.unwrap();
            if receipt.success {
                successes += 1;
            } else {
                assert_eq!(receipt.denial, Some(LedgerDenial::Unavailable));
            }
        }

        assert!(successes >= 1);
        assert_eq!(service.balance(user).await.unwrap(), 10 * successes);
    }
}

// ============================================================================
// Manipulation Detection
// ============================================================================

mod audit_tests {
    use super::*;

    fn audited_ledger() -> (CreditsLedgerService, ManipulationDetector) {
        let store = Arc::new(InMemoryCreditsStore::new(0));
        let service = CreditsLedgerService::new(store.clone());
        let detector = ManipulationDetector::new(store, DetectionConfig::default());
        (service, detector)
    }

    #[tokio::test]
    async fn test_ordinary_activity_is_not_flagged() {
        let (service, detector) = audited_ledger();
        let user = UserId::generate();

        fund(&service, user, 200).await;
        spend(&service, user, 30).await;
        spend(&service, user, 30).await;

        let report = detector.detect(user).await.unwrap();
        assert!(!report.suspicious);
        assert!(report.reasons.is_empty());
    }

    #[tokio::test]
    async fn test_rapid_fire_additions_are_flagged() {
        let (service, detector) = audited_ledger();
        let user = UserId::generate();

        for _ in 0..11 {
            fund(&service, user, 10).await;
        }

        let report = detector.detect(user).await.unwrap();
        assert!(report.suspicious);
        assert!(report.reasons.iter().any(|r| matches!(
            r,
            ManipulationReason::ExcessiveAdditions {
                count: 11,
                threshold: 10
            }
        )));
    }

    #[tokio::test]
    async fn test_large_hourly_volume_is_flagged() {
        let (service, detector) = audited_ledger();
        let user = UserId::generate();

        fund(&service, user, 600).await;
        fund(&service, user, 600).await;

        let report = detector.detect(user).await.unwrap();
        assert!(report.suspicious);
        assert!(report.reasons.iter().any(|r| matches!(
            r,
            ManipulationReason::ExcessivePointsAdded {
                points: 1200,
                threshold: 1000
            }
        )));
        // Two additions are well under the count threshold
        assert!(
            !report
                .reasons
                .iter()
                .any(|r| matches!(r, ManipulationReason::ExcessiveAdditions { .. }))
        );
    }
}

// ============================================================================
// Postgres-Backed Storage
// Requires a scratch database - run with --ignored and TEST_DATABASE_URL set
// ============================================================================

mod postgres_tests {
    use super::*;
    use pixora_metering::domain::credits::LedgerError;
    use pixora_metering::infrastructure::SqlxCreditsStore;
    use sqlx::postgres::PgPoolOptions;

    async fn postgres_store() -> SqlxCreditsStore {
        let url = std::env::var("TEST_DATABASE_URL")
            .expect("TEST_DATABASE_URL must point at a scratch Postgres database");
        let pool = Arc::new(
            PgPoolOptions::new()
                .max_connections(5)
                .connect(&url)
                .await
                .expect("Failed to connect to test database"),
        );
        sqlx::raw_sql(include_str!("../migrations/0001_initial_schema.sql"))
            .execute(&*pool)
            .await
            .expect("Failed to apply schema");
        SqlxCreditsStore::new(pool, 0)
    }

    #[tokio::test]
    #[ignore = "requires TEST_DATABASE_URL pointing at a scratch Postgres database"]
    async fn test_postgres_row_locks_serialize_concurrent_deductions() {
        let store = Arc::new(postgres_store().await);
        let user = UserId::generate();

        store
            .apply(&user, 100, TransactionReason::Purchase, None, None, Value::Null)
            .await
            .unwrap();

        let mut handles = Vec::new();
        for _ in 0..5 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .apply(
                        &user,
                        -30,
                        TransactionReason::Generation,
                        None,
                        None,
                        Value::Null,
                    )
                    .await
            }));
        }

        let mut successes = 0_i64;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(entry) => {
                    assert!(entry.balances_consistent());
                    successes += 1;
                }
                Err(LedgerError::InsufficientPoints { balance }) => assert!(balance < 30),
                Err(other) => panic!("unexpected ledger error: {other}"),
            }
        }

        assert_eq!(successes, 3);
        assert_eq!(store.balance(&user).await.unwrap(), 10);
    }

    #[tokio::test]
    #[ignore = "requires TEST_DATABASE_URL pointing at a scratch Postgres database"]
    async fn test_postgres_transaction_round_trip() {
        let store = postgres_store().await;
        let user = UserId::generate();

        let funded = store
            .apply(&user, 40, TransactionReason::SignupBonus, None, None, Value::Null)
            .await
            .unwrap();
        let entry = store
            .apply(
                &user,
                -15,
                TransactionReason::Generation,
                Some("gen_izzy".to_string()),
                Some(funded.id),
                json!({"model": "pixora-turbo"}),
            )
            .await
            .unwrap();

        let read_back = store
            .transaction(&entry.id)
            .await
            .unwrap()
            .expect("transaction should exist");
        assert_eq!(read_back.amount, -15);
        assert_eq!(read_back.balance_before, 40);
        assert_eq!(read_back.balance_after, 25);
        assert_eq!(read_back.reason, TransactionReason::Generation);
        assert_eq!(read_back.generation_id.as_deref(), Some("gen_izzy"));
        assert_eq!(read_back.reference_id, Some(funded.id));
        assert_eq!(read_back.metadata, json!({"model": "pixora-turbo"}));
    }
}

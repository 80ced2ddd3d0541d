mod common;

use common::{amt, new_employee, payroll, register, FlakyProvider};
use payroll_backend::batch::audit;
use payroll_backend::models::{Disclosure, EmployeeUpdate, PayrollBatch, RunPhase, ViewOutcome};
use payroll_backend::query;
use payroll_backend::{Payroll, PayrollError};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn batch_totals_and_ledgers_after_run() {
    let payroll = payroll();
    register(&payroll, "w1", "0.05").await;
    register(&payroll, "w2", "0.10").await;

    let batch = payroll.start_run().await.unwrap();
    assert_eq!(batch.total_amount, amt("0.15"));
    assert_eq!(batch.employee_count, 2);
    assert_eq!(batch.transactions.len(), 2);
    assert_eq!(payroll.phase(), RunPhase::Committed);

    for employee in payroll.list_all().await {
        assert_eq!(employee.payments_count, 1);
        assert_eq!(employee.total_paid, employee.salary);
        assert_eq!(employee.last_paid_at, Some(batch.created_at));
    }
}

#[tokio::test]
async fn duplicate_wallet_leaves_registry_unchanged() {
    let payroll = payroll();
    register(&payroll, "w1", "0.05").await;

    let err = payroll.register(new_employee("w1", "0.07")).await.unwrap_err();
    assert!(matches!(err, PayrollError::DuplicateWallet(w) if w == "w1"));
    assert_eq!(payroll.list_all().await.len(), 1);
}

#[tokio::test]
async fn unknown_wallet_has_no_view() {
    let payroll = payroll();
    register(&payroll, "w1", "0.05").await;
    assert!(matches!(payroll.own_view("unknown", false).await, ViewOutcome::EmployeeNotFound));
}

#[tokio::test]
async fn empty_registry_cannot_run() {
    let payroll = payroll();
    let err = payroll.start_run().await.unwrap_err();
    assert!(matches!(err, PayrollError::NoEmployees));
    assert!(payroll.history().await.is_empty());
    assert_eq!(payroll.phase(), RunPhase::Aborted);
}

#[tokio::test]
async fn sealed_amounts_add_up_to_batch_total() {
    let payroll = payroll();
    for (wallet, salary) in [("w1", "1200.5"), ("w2", "0.00000001"), ("w3", "87.25")] {
        register(&payroll, wallet, salary).await;
    }

    let batch = payroll.start_run().await.unwrap();
    audit(payroll.provider().as_ref(), &batch).unwrap();
    assert_eq!(batch.total_amount, amt("1287.75000001"));
    assert_eq!(batch.employee_count, payroll.list_all().await.len());
}

#[tokio::test]
async fn ledgers_grow_by_snapshot_amount_each_run() {
    let payroll = payroll();
    register(&payroll, "w1", "3").await;
    register(&payroll, "w2", "0.5").await;

    payroll.start_run().await.unwrap();
    payroll.start_run().await.unwrap();

    let w1 = payroll.find_by_wallet("w1").await.unwrap();
    let w2 = payroll.find_by_wallet("w2").await.unwrap();
    assert_eq!((w1.total_paid, w1.payments_count), (amt("6"), 2));
    assert_eq!((w2.total_paid, w2.payments_count), (amt("1"), 2));

    let history = payroll.history().await;
    assert_eq!(history.len(), 2);
    assert!(history[0].created_at >= history[1].created_at);
}

#[tokio::test]
async fn provider_failure_mid_run_changes_nothing() {
    let provider = Arc::new(FlakyProvider::new());
    let payroll = Payroll::new(provider.clone(), Duration::ZERO);
    register(&payroll, "w1", "0.05").await;
    register(&payroll, "w2", "0.10").await;
    let before = payroll.list_all().await;

    // The first transaction seals, the second does not.
    provider.fail_after_seals(1);
    let err = payroll.start_run().await.unwrap_err();
    assert!(matches!(err, PayrollError::Provider(_)));
    assert!(err.is_retryable());
    assert_eq!(payroll.phase(), RunPhase::Aborted);
    assert!(payroll.history().await.is_empty());
    for (old, new) in before.iter().zip(payroll.list_all().await) {
        assert_eq!(old.total_paid, new.total_paid);
        assert_eq!(old.payments_count, new.payments_count);
    }

    provider.heal();
    let batch = payroll.start_run().await.unwrap();
    assert_eq!(batch.total_amount, amt("0.15"));
}

#[tokio::test]
async fn second_run_is_rejected_while_one_is_in_flight() {
    let payroll = payroll();
    register(&payroll, "w1", "0.05").await;

    let run = payroll.begin_run().await.unwrap();
    assert_eq!(payroll.phase(), RunPhase::Running);

    let err = payroll.start_run().await.unwrap_err();
    assert!(matches!(err, PayrollError::ConcurrentRunRejected));
    assert!(!err.is_retryable());
    assert_eq!(payroll.phase(), RunPhase::Running);

    let batch = run.execute().await.unwrap();
    assert_eq!(batch.total_amount, amt("0.05"));
    assert_eq!(payroll.history().await.len(), 1);
}

#[tokio::test]
async fn run_suspended_in_settlement_rejects_concurrent_runs() {
    let payroll = Payroll::new(common::zk_provider(), Duration::from_millis(300));
    register(&payroll, "w1", "0.05").await;

    let background = payroll.clone();
    let first = tokio::spawn(async move { background.start_run().await });
    while payroll.phase() != RunPhase::Running {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    assert!(matches!(payroll.start_run().await, Err(PayrollError::ConcurrentRunRejected)));
    first.await.unwrap().unwrap();
    assert_eq!(payroll.history().await.len(), 1);
    assert_eq!(payroll.find_by_wallet("w1").await.unwrap().payments_count, 1);
}

#[tokio::test]
async fn dropped_run_aborts_and_frees_the_slot() {
    let payroll = payroll();
    register(&payroll, "w1", "0.05").await;

    drop(payroll.begin_run().await.unwrap());
    assert_eq!(payroll.phase(), RunPhase::Aborted);
    assert!(payroll.history().await.is_empty());

    payroll.start_run().await.unwrap();
    assert_eq!(payroll.phase(), RunPhase::Committed);
}

#[tokio::test]
async fn run_pays_the_registry_as_it_was_at_start() {
    let payroll = payroll();
    let w1 = register(&payroll, "w1", "0.05").await;
    register(&payroll, "w2", "0.10").await;

    let run = payroll.begin_run().await.unwrap();
    register(&payroll, "w3", "7").await;
    payroll
        .update(w1.id, EmployeeUpdate { name: None, role: None, salary: Some("9".into()) })
        .await
        .unwrap();

    let batch = run.execute().await.unwrap();
    assert_eq!(batch.employee_count, 2);
    assert_eq!(batch.total_amount, amt("0.15"));
    assert_eq!(payroll.find_by_wallet("w1").await.unwrap().total_paid, amt("0.05"));
    assert_eq!(payroll.find_by_wallet("w3").await.unwrap().payments_count, 0);
}

#[tokio::test]
async fn salary_edit_leaves_committed_batches_alone() {
    let payroll = payroll();
    let w1 = register(&payroll, "w1", "0.05").await;
    let committed = payroll.start_run().await.unwrap();

    let updated = payroll
        .update(w1.id, EmployeeUpdate { name: None, role: Some("Lead".into()), salary: Some("0.2".into()) })
        .await
        .unwrap();
    assert_eq!(updated.salary, amt("0.2"));
    assert_eq!(updated.role, "Lead");
    assert_ne!(updated.sealed_salary, w1.sealed_salary);

    let stored = payroll.batch(committed.id).await.unwrap();
    assert_eq!(stored.total_amount, amt("0.05"));
    audit(payroll.provider().as_ref(), &stored).unwrap();

    let next = payroll.start_run().await.unwrap();
    assert_eq!(next.total_amount, amt("0.2"));
    assert_eq!(payroll.find_by_wallet("w1").await.unwrap().total_paid, amt("0.25"));
}

#[tokio::test]
async fn own_view_reveals_only_on_request() {
    let provider = Arc::new(FlakyProvider::new());
    let payroll = Payroll::new(provider.clone(), Duration::ZERO);
    register(&payroll, "w1", "0.05").await;
    register(&payroll, "w2", "0.10").await;
    let first = payroll.start_run().await.unwrap();
    let second = payroll.start_run().await.unwrap();

    let ViewOutcome::Found(view) = payroll.own_view("w1", false).await else {
        panic!("w1 should be registered");
    };
    assert_eq!(view.salary, Disclosure::Sealed);
    assert_eq!(view.history.len(), 2);
    assert_eq!(view.history[0].batch_id, second.id);
    assert!(view.history.iter().all(|p| p.amount == Disclosure::Sealed));

    let damaged = first.transactions.iter().find(|tx| tx.wallet == "w1").unwrap();
    provider.make_unreadable(&damaged.sealed_amount);

    let ViewOutcome::Found(view) = payroll.own_view("w1", true).await else {
        panic!("w1 should be registered");
    };
    assert_eq!(view.salary, Disclosure::Revealed(amt("0.05")));
    assert_eq!(view.history[0].amount, Disclosure::Revealed(amt("0.05")));
    assert_eq!(view.history[1].amount, Disclosure::Unavailable);
    assert_eq!(view.total_paid, amt("0.1"));
    assert_eq!(view.payments_count, 2);
}

#[tokio::test]
async fn own_view_never_opens_other_wallets() {
    let payroll = payroll();
    register(&payroll, "w1", "0.05").await;
    register(&payroll, "w2", "0.10").await;
    payroll.start_run().await.unwrap();

    let ViewOutcome::Found(view) = payroll.own_view("w2", true).await else {
        panic!("w2 should be registered");
    };
    assert_eq!(view.history.len(), 1);
    assert_eq!(view.history[0].amount, Disclosure::Revealed(amt("0.10")));

    let w1 = payroll.find_by_wallet("w1").await.unwrap();
    assert!(payroll.provider().unseal(&w1.sealed_salary, "w2").is_err());
}

#[tokio::test]
async fn summary_tracks_registry_and_history() {
    let payroll = payroll();
    register(&payroll, "w1", "0.05").await;
    register(&payroll, "w2", "0.10").await;
    payroll.start_run().await.unwrap();
    register(&payroll, "w3", "1").await;

    let summary = payroll.summary().await.unwrap();
    assert_eq!(summary.employee_count, 3);
    assert_eq!(summary.monthly_payroll, amt("1.15"));
    assert_eq!(summary.payroll_runs, 1);
    assert_eq!(summary.total_disbursed, amt("0.15"));
}

#[tokio::test]
async fn committed_batches_verify_from_proofs_alone() {
    let payroll = payroll();
    register(&payroll, "w1", "0.05").await;
    register(&payroll, "w2", "0.10").await;
    register(&payroll, "w3", "2").await;
    let batch = payroll.start_run().await.unwrap();

    let verification = payroll.verify_batch(batch.id).await.unwrap();
    assert!(verification.valid);
    assert!(verification.batch_proof_valid);
    assert!(verification.invalid_transactions.is_empty());

    let attestation = payroll.provider().check(&batch.batch_proof).unwrap();
    assert_eq!(attestation.total, Some(batch.total_amount));
    assert!(attestation.covers_batch_of(3));
    assert!(payroll.verify_proof(batch.batch_proof.clone()).await);
    assert!(payroll.verify_proof(batch.transactions[0].proof.clone()).await);
    assert!(payroll.verify_batch(uuid::Uuid::new_v4()).await.is_none());
}

async fn committed_pair() -> (Payroll, PayrollBatch) {
    let payroll = payroll();
    register(&payroll, "w1", "0.05").await;
    register(&payroll, "w2", "0.10").await;
    let batch = payroll.start_run().await.unwrap();
    (payroll, batch)
}

#[tokio::test]
async fn rewritten_total_with_dropped_transaction_is_rejected() {
    let (payroll, mut batch) = committed_pair().await;
    batch.total_amount = amt("999");
    batch.transactions.pop();
    batch.employee_count = 1;

    let verification = query::verify_batch(payroll.provider().as_ref(), &batch);
    assert!(!verification.valid);
    assert!(!verification.batch_proof_valid);
    assert!(audit(payroll.provider().as_ref(), &batch).is_err());
}

#[tokio::test]
async fn rewritten_total_alone_is_rejected() {
    let (payroll, mut batch) = committed_pair().await;
    batch.total_amount = amt("0.16");

    let verification = query::verify_batch(payroll.provider().as_ref(), &batch);
    assert!(!verification.valid);
    assert!(!verification.batch_proof_valid);
    assert!(verification.invalid_transactions.is_empty());
}

#[tokio::test]
async fn dropped_transaction_with_consistent_total_is_rejected() {
    let (payroll, mut batch) = committed_pair().await;
    batch.transactions.pop();
    batch.employee_count = 1;
    batch.total_amount = amt("0.05");

    let verification = query::verify_batch(payroll.provider().as_ref(), &batch);
    assert!(!verification.valid);
    assert!(!verification.batch_proof_valid);
}

#[tokio::test]
async fn reordered_transactions_are_rejected() {
    let (payroll, mut batch) = committed_pair().await;
    batch.transactions.swap(0, 1);

    assert!(!query::verify_batch(payroll.provider().as_ref(), &batch).valid);
}

#[tokio::test]
async fn transaction_proof_from_another_batch_is_flagged() {
    let (payroll, mut batch) = committed_pair().await;
    let other = payroll.start_run().await.unwrap();
    batch.transactions[1].proof = other.transactions[1].proof.clone();

    let verification = query::verify_batch(payroll.provider().as_ref(), &batch);
    assert!(!verification.valid);
    assert_eq!(verification.invalid_transactions, [batch.transactions[1].tx_ref.clone()]);
}

#[tokio::test]
async fn batch_proof_cannot_stand_in_for_a_transaction_proof() {
    let (payroll, mut batch) = committed_pair().await;
    batch.transactions[0].proof = batch.batch_proof.clone();

    let verification = query::verify_batch(payroll.provider().as_ref(), &batch);
    assert!(!verification.valid);
    assert!(verification.invalid_transactions.contains(&batch.transactions[0].tx_ref));
}

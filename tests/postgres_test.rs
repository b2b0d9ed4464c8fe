//! Needs a local Postgres (see `common::setup_pool`). Run with
//! `cargo test --test postgres_test -- --ignored`.

mod common;

use common::*;
use payment_saga::domain::error::PaymentError;
use payment_saga::domain::history::{HistoryEvent, HistoryStore};
use payment_saga::domain::id::{RunId, WorkflowId};
use payment_saga::domain::payment::{PaymentStatus, StatusUpdate};
use payment_saga::domain::store::StatusStore;
use payment_saga::domain::workflow::WorkflowHandle;
use payment_saga::infra::postgres::history_repo::PgHistoryStore;
use payment_saga::infra::postgres::payment_repo::PgStatusStore;
use payment_saga::services::reconciler::WebhookReconciler;
use std::sync::Arc;

const DB: &str = "payment_saga_test";

// ── 1. create_pending_is_idempotent ────────────────────────────────────────

#[tokio::test]
#[ignore = "requires postgres"]
async fn create_pending_is_idempotent() {
    let store = PgStatusStore::new(setup_pool(DB).await);
    let input = make_input("pg_idem", "PG-IDEM");

    seed(&store, &input).await;
    seed(&store, &input).await;

    let record = store.find_by_reference("PG-IDEM").await.unwrap().unwrap();
    assert_eq!(record.id, "pg_idem");
    assert_eq!(record.status, PaymentStatus::Pending);

    let clash = make_input("pg_idem_other", "PG-IDEM");
    let err = store
        .create_pending(&payment_saga::domain::payment::NewPaymentRecord {
            id: clash.payment_id.clone(),
            reference: clash.reference.clone(),
            amount: clash.amount,
            currency: clash.currency.clone(),
            merchant_id: clash.merchant_id.clone(),
            payment_method_id: clash.payment_method_id.clone(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, PaymentError::Validation(_)));
}

// ── 2. cas_writes_audit_only_on_success ────────────────────────────────────

#[tokio::test]
#[ignore = "requires postgres"]
async fn cas_writes_audit_only_on_success() {
    let pool = setup_pool(DB).await;
    let store = PgStatusStore::new(pool.clone());
    let input = make_input("pg_cas", "PG-CAS");
    seed(&store, &input).await;
    let update = StatusUpdate::by("test").with_gateway_reference(Some("txn_pg".into()));

    let stale = store
        .update_status("pg_cas", PaymentStatus::Processing, PaymentStatus::Completed, &update)
        .await
        .unwrap();
    assert!(!stale);
    assert_eq!(count_audit_entries(&pool, "pg_cas").await, 0);

    let ok = store
        .update_status("pg_cas", PaymentStatus::Pending, PaymentStatus::Completed, &update)
        .await
        .unwrap();
    assert!(ok);
    assert_eq!(count_audit_entries(&pool, "pg_cas").await, 1);

    let record = store.find_by_id("pg_cas").await.unwrap().unwrap();
    assert_eq!(record.status, PaymentStatus::Completed);
    assert_eq!(record.gateway_reference.as_deref(), Some("txn_pg"));
    assert!(record.completed_at.is_some());
}

// ── 3. concurrent_cas_has_one_winner ───────────────────────────────────────
// Ten writers race Pending -> {Completed, Failed}. Row-level CAS lets exactly
// one through.

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore = "requires postgres"]
async fn concurrent_cas_has_one_winner() {
    let pool = setup_pool(DB).await;
    let store = Arc::new(PgStatusStore::new(pool.clone()));
    seed(store.as_ref(), &make_input("pg_race", "PG-RACE")).await;

    let mut handles = Vec::new();
    for i in 0..10 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            let target = if i % 2 == 0 {
                PaymentStatus::Completed
            } else {
                PaymentStatus::Failed
            };
            store
                .update_status("pg_race", PaymentStatus::Pending, target, &StatusUpdate::by("race"))
                .await
                .unwrap()
        }));
    }

    let mut winners = 0;
    for h in handles {
        if h.await.unwrap() {
            winners += 1;
        }
    }
    assert_eq!(winners, 1, "exactly one CAS applied");
    assert_eq!(count_audit_entries(&pool, "pg_race").await, 1);
}

// ── 4. reconciler_over_postgres ────────────────────────────────────────────

#[tokio::test]
#[ignore = "requires postgres"]
async fn reconciler_over_postgres() {
    let pool = setup_pool(DB).await;
    let store = Arc::new(PgStatusStore::new(pool.clone()));
    seed(store.as_ref(), &make_input("pg_rec", "PG-REC")).await;
    let reconciler = WebhookReconciler::new(store.clone(), false);

    assert!(reconciler
        .reconcile("PG-REC", PaymentStatus::Completed, Some("gw".into()), None)
        .await
        .unwrap()
        .applied());
    assert!(!reconciler
        .reconcile("PG-REC", PaymentStatus::Completed, Some("gw".into()), None)
        .await
        .unwrap()
        .applied());
    assert_eq!(count_audit_entries(&pool, "pg_rec").await, 1);
}

// ── 5. history_roundtrip_and_open_workflows ────────────────────────────────

#[tokio::test]
#[ignore = "requires postgres"]
async fn history_roundtrip_and_open_workflows() {
    let history = PgHistoryStore::new(setup_pool(DB).await);
    let input = make_input("pg_hist", "PG-HIST");
    let handle = WorkflowHandle {
        workflow_id: WorkflowId::for_payment("pg_hist", 1),
        run_id: RunId::new(),
    };

    assert_eq!(history.run_count("pg_hist").await.unwrap(), 0);
    history
        .append(
            &handle.workflow_id,
            &HistoryEvent::WorkflowStarted {
                handle: handle.clone(),
                input: input.clone(),
            },
        )
        .await
        .unwrap();
    history
        .append(
            &handle.workflow_id,
            &HistoryEvent::CancellationChecked {
                seq: 1,
                requested: false,
            },
        )
        .await
        .unwrap();

    let duplicate = history
        .append(
            &handle.workflow_id,
            &HistoryEvent::WorkflowStarted {
                handle: handle.clone(),
                input,
            },
        )
        .await;
    assert!(matches!(duplicate, Err(PaymentError::Start(_))));

    let events = history.load(&handle.workflow_id).await.unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(events[1].seq(), Some(1));
    assert_eq!(history.run_count("pg_hist").await.unwrap(), 1);

    let open = history.open_workflows().await.unwrap();
    assert!(open.iter().any(|w| w.handle == handle));
}

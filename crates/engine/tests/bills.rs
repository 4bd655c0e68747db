use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use async_trait::async_trait;
use sea_orm::{Database, DatabaseConnection};
use tokio::sync::{Mutex, mpsc, oneshot};

use engine::{
    BillStatus, CreateBillCmd, CreateGroupCmd, Engine, EngineError, MemberRole, MemberStatus,
    ParticipantStatus, PaymentEvent, PaymentOutcome, SettlementOutcome, SettlementSummary,
    TransactionKind,
    gateways::{ChargeReceipt, ChargeRequest, GatewayError, PaymentGateway, SimulatedPayments},
};
use migration::MigratorTrait;

async fn engine_with(payments: Arc<dyn PaymentGateway>) -> (Engine, DatabaseConnection) {
    let db = Database::connect("sqlite::memory:").await.unwrap();
    migration::Migrator::up(&db, None).await.unwrap();
    let engine = Engine::builder()
        .database(db.clone())
        .payments(payments)
        .build()
        .await
        .unwrap();
    (engine, db)
}

/// Creates the users and a group owned by the first one; everyone else is
/// invited and accepts.
async fn group_with(engine: &Engine, members: &[&str]) -> String {
    for name in members {
        engine.create_user(name, "password", None).await.unwrap();
    }
    let owner = members[0];
    let group_id = engine
        .create_group(CreateGroupCmd::new("Flatmates", owner))
        .await
        .unwrap();
    for name in &members[1..] {
        engine
            .invite_member(&group_id, name, MemberRole::Member, owner)
            .await
            .unwrap();
        engine.accept_invite(&group_id, name).await.unwrap();
    }
    group_id
}

fn dinner(group_id: &str) -> CreateBillCmd {
    CreateBillCmd::new(group_id, "alice")
        .merchant("Trattoria")
        .item(1, "Burger", 18_99)
        .item(2, "Fries", 5_99)
        .item(3, "Steak", 47_52)
        .tax(6_16)
        .tip(13_05)
}

#[tokio::test]
async fn create_bill_splits_tax_and_tip_proportionally() {
    let (engine, _db) = engine_with(Arc::new(SimulatedPayments)).await;
    let group_id = group_with(&engine, &["alice", "bob"]).await;

    let bill_id = engine
        .create_bill(
            dinner(&group_id)
                .claim("alice", vec![1, 2])
                .claim("bob", vec![3])
                .draft(true),
        )
        .await
        .unwrap();

    let detail = engine.bill(&bill_id, "bob").await.unwrap();
    assert_eq!(detail.bill.status, BillStatus::Draft);
    assert_eq!(detail.bill.subtotal_minor, 72_50);
    assert_eq!(detail.bill.total_minor, 91_71);
    assert_eq!(detail.settlement, SettlementSummary::NotStarted);

    let owed = |name: &str| {
        detail
            .participants
            .iter()
            .find(|p| p.username == name)
            .map(|p| p.owed_minor)
            .unwrap()
    };
    // 24.98 + 19.21 * 24.98 / 72.50 = 31.5988...
    assert_eq!(owed("alice"), 31_60);
    assert_eq!(owed("bob"), 60_11);
    assert_eq!(owed("alice") + owed("bob"), detail.bill.total_minor);
    assert!(
        detail
            .items
            .iter()
            .all(|item| item.claimed_by.len() == 1)
    );
}

#[tokio::test]
async fn shared_items_are_stored_per_claimant() {
    let (engine, _db) = engine_with(Arc::new(SimulatedPayments)).await;
    let group_id = group_with(&engine, &["alice", "bob"]).await;

    let bill_id = engine
        .create_bill(
            CreateBillCmd::new(&group_id, "alice")
                .item(1, "Pizza", 20_01)
                .item(2, "Cola", 3_00)
                .tip(2_30)
                .claim("alice", vec![1, 2])
                .claim("bob", vec![1]),
        )
        .await
        .unwrap();

    let detail = engine.bill(&bill_id, "bob").await.unwrap();
    let pizza = &detail.items[0];
    assert_eq!(pizza.claimed_by, vec!["alice".to_string(), "bob".to_string()]);
    assert_eq!(detail.items[1].claimed_by, vec!["alice".to_string()]);

    let participant = |name: &str| {
        detail
            .participants
            .iter()
            .find(|p| p.username == name)
            .unwrap()
    };
    assert_eq!(participant("alice").item_ids, vec![1, 2]);
    assert_eq!(participant("bob").item_ids, vec![1]);
    // Pizza 20.01 split 10.01 (creator) / 10.00, tip 2.30 over 13.01 / 10.00.
    assert_eq!(participant("alice").owed_minor, 13_01 + 1_30);
    assert_eq!(participant("bob").owed_minor, 10_00 + 1_00);
    assert_eq!(
        participant("alice").owed_minor + participant("bob").owed_minor,
        detail.bill.total_minor
    );
}

#[tokio::test]
async fn create_bill_rejects_undefined_split_and_outsiders() {
    let (engine, _db) = engine_with(Arc::new(SimulatedPayments)).await;
    let group_id = group_with(&engine, &["alice", "bob"]).await;
    engine.create_user("mallory", "password", None).await.unwrap();

    let err = engine
        .create_bill(
            CreateBillCmd::new(&group_id, "alice")
                .item(1, "Free sample", 0)
                .tax(1_00)
                .claim("alice", vec![1]),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::DivisionUndefined));

    let err = engine
        .create_bill(dinner(&group_id).claim("alice", vec![1, 9]))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::ItemNotFound(_)));

    let err = engine
        .create_bill(dinner(&group_id).claim("mallory", vec![1, 2, 3]))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));

    let err = engine
        .create_bill(
            CreateBillCmd::new(&group_id, "mallory")
                .item(1, "Pizza", 10_00)
                .claim("alice", vec![1]),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Forbidden(_)));
}

#[tokio::test]
async fn settlement_completes_bill_when_one_charge_fails() {
    let (engine, _db) = engine_with(Arc::new(SimulatedPayments)).await;
    let group_id = group_with(&engine, &["alice", "bob", "carol"]).await;
    engine.link_payment_method("alice", "cus_alice").await.unwrap();
    engine.link_payment_method("bob", "decline_bob").await.unwrap();
    engine.link_payment_method("carol", "cus_carol").await.unwrap();

    let bill_id = engine
        .create_bill(
            CreateBillCmd::new(&group_id, "alice")
                .item(1, "Pizza", 12_00)
                .item(2, "Pasta", 10_00)
                .item(3, "Salad", 8_00)
                .claim("alice", vec![1])
                .claim("bob", vec![2])
                .claim("carol", vec![3]),
        )
        .await
        .unwrap();

    let outcome = engine.settle_bill(&bill_id).await.unwrap();
    assert_eq!(
        outcome,
        SettlementOutcome::Completed {
            paid: 2,
            outstanding: 1
        }
    );

    let detail = engine.bill(&bill_id, "alice").await.unwrap();
    assert_eq!(detail.bill.status, BillStatus::Completed);
    assert!(detail.bill.settled_at.is_some());
    for participant in &detail.participants {
        match participant.username.as_str() {
            "bob" => {
                assert_eq!(participant.status, ParticipantStatus::Pending);
                assert!(participant.failure_reason.is_some());
                assert_eq!(participant.paid_minor, 0);
            }
            _ => {
                assert_eq!(participant.status, ParticipantStatus::Paid);
                assert_eq!(participant.paid_minor, participant.owed_minor);
                assert!(participant.charge_ref.is_some());
            }
        }
    }
    assert_eq!(
        detail.settlement,
        SettlementSummary::Outstanding {
            participants: vec!["bob".to_string()],
            amount_minor: 10_00,
        }
    );

    // Running the pass again does nothing.
    assert_eq!(
        engine.settle_bill(&bill_id).await.unwrap(),
        SettlementOutcome::Skipped {
            status: BillStatus::Completed
        }
    );

    let bob_ledger = engine.user_transactions("bob", 50).await.unwrap();
    assert!(bob_ledger.is_empty());
    let alice_ledger = engine.user_transactions("alice", 50).await.unwrap();
    let receipts: Vec<_> = alice_ledger
        .iter()
        .filter(|tx| tx.kind == TransactionKind::SplitReceipt)
        .collect();
    assert_eq!(receipts.len(), 1);
    assert_eq!(receipts[0].amount_minor, 8_00);

    let group = engine.group(&group_id, "alice").await.unwrap();
    assert_eq!(group.group.total_split_minor, 30_00);

    let failed: Vec<_> = engine
        .list_notifications("bob", false)
        .await
        .unwrap()
        .into_iter()
        .filter(|n| n.kind == engine::NotificationKind::PaymentFailed)
        .collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].data["bill_id"], bill_id.as_str());
    assert!(
        !engine
            .list_notifications("carol", false)
            .await
            .unwrap()
            .iter()
            .any(|n| n.kind == engine::NotificationKind::PaymentFailed)
    );
}

/// Holds the first charge until the test releases it.
struct GatedPayments {
    started: mpsc::UnboundedSender<()>,
    resume: Mutex<Option<oneshot::Receiver<()>>>,
    charges: AtomicUsize,
}

#[async_trait]
impl PaymentGateway for GatedPayments {
    async fn charge(&self, request: &ChargeRequest) -> Result<ChargeReceipt, GatewayError> {
        self.charges.fetch_add(1, Ordering::SeqCst);
        if let Some(resume) = self.resume.lock().await.take() {
            let _ = self.started.send(());
            let _ = resume.await;
        }
        Ok(ChargeReceipt {
            reference: format!("ch_{}", request.idempotency_key),
        })
    }
}

#[tokio::test]
async fn cancelling_a_processing_bill_stops_settlement() {
    let (started_tx, mut started_rx) = mpsc::unbounded_channel();
    let (resume_tx, resume_rx) = oneshot::channel();
    let payments = Arc::new(GatedPayments {
        started: started_tx,
        resume: Mutex::new(Some(resume_rx)),
        charges: AtomicUsize::new(0),
    });
    let (engine, _db) = engine_with(payments.clone()).await;
    let engine = Arc::new(engine);
    let group_id = group_with(&engine, &["alice", "bob"]).await;
    engine.link_payment_method("alice", "cus_alice").await.unwrap();
    engine.link_payment_method("bob", "cus_bob").await.unwrap();

    let bill_id = engine
        .create_bill(
            CreateBillCmd::new(&group_id, "alice")
                .item(1, "Pizza", 12_00)
                .item(2, "Pasta", 10_00)
                .claim("alice", vec![1])
                .claim("bob", vec![2]),
        )
        .await
        .unwrap();

    let settling = tokio::spawn({
        let engine = engine.clone();
        let bill_id = bill_id.clone();
        async move { engine.settle_bill(&bill_id).await }
    });

    started_rx.recv().await.unwrap();
    let detail = engine.bill(&bill_id, "alice").await.unwrap();
    assert_eq!(detail.bill.status, BillStatus::Processing);
    engine.cancel_bill(&bill_id, "alice").await.unwrap();
    resume_tx.send(()).unwrap();

    let outcome = settling.await.unwrap().unwrap();
    assert!(matches!(
        outcome,
        SettlementOutcome::Interrupted {
            status: BillStatus::Cancelled,
            ..
        }
    ));
    assert_eq!(payments.charges.load(Ordering::SeqCst), 1);

    let detail = engine.bill(&bill_id, "alice").await.unwrap();
    assert_eq!(detail.bill.status, BillStatus::Cancelled);
    assert!(detail.bill.settled_at.is_none());
    let bob = detail
        .participants
        .iter()
        .find(|p| p.username == "bob")
        .unwrap();
    assert_eq!(bob.status, ParticipantStatus::Pending);

    let group = engine.group(&group_id, "alice").await.unwrap();
    assert_eq!(group.group.total_split_minor, 0);
}

#[tokio::test]
async fn payment_webhook_is_applied_once() {
    let (engine, _db) = engine_with(Arc::new(SimulatedPayments)).await;
    let group_id = group_with(&engine, &["alice", "bob"]).await;
    engine.link_payment_method("bob", "decline_bob").await.unwrap();

    let bill_id = engine
        .create_bill(
            CreateBillCmd::new(&group_id, "alice")
                .item(1, "Tickets", 40_00)
                .claim("bob", vec![1]),
        )
        .await
        .unwrap();
    engine.settle_bill(&bill_id).await.unwrap();

    let event = PaymentEvent {
        bill_id: bill_id.clone(),
        username: "bob".to_string(),
        outcome: PaymentOutcome::Succeeded {
            charge_ref: "ch_123".to_string(),
        },
    };
    engine.apply_payment_event(event.clone()).await.unwrap();
    engine.apply_payment_event(event).await.unwrap();

    let detail = engine.bill(&bill_id, "bob").await.unwrap();
    assert_eq!(detail.participants[0].status, ParticipantStatus::Paid);
    assert_eq!(detail.participants[0].charge_ref.as_deref(), Some("ch_123"));
    assert_eq!(detail.settlement, SettlementSummary::Settled);

    let bob_ledger = engine.user_transactions("bob", 50).await.unwrap();
    assert_eq!(bob_ledger.len(), 1);
    assert_eq!(bob_ledger[0].kind, TransactionKind::SplitPayment);

    // A late failure event does not undo the payment.
    engine
        .apply_payment_event(PaymentEvent {
            bill_id: bill_id.clone(),
            username: "bob".to_string(),
            outcome: PaymentOutcome::Failed {
                reason: "late decline".to_string(),
            },
        })
        .await
        .unwrap();
    let detail = engine.bill(&bill_id, "bob").await.unwrap();
    assert_eq!(detail.participants[0].status, ParticipantStatus::Paid);

    let members = engine.list_members(&group_id, "alice").await.unwrap();
    let balance = |name: &str| {
        members
            .iter()
            .find(|m| m.username == name)
            .map(|m| m.balance_minor)
            .unwrap()
    };
    assert_eq!(balance("bob"), -40_00);
    assert_eq!(balance("alice"), 40_00);
}

#[tokio::test]
async fn retry_marks_participant_failed_and_surfaces_gateway_error() {
    let (engine, _db) = engine_with(Arc::new(SimulatedPayments)).await;
    let group_id = group_with(&engine, &["alice", "bob"]).await;
    engine.link_payment_method("bob", "decline_bob").await.unwrap();

    let bill_id = engine
        .create_bill(
            CreateBillCmd::new(&group_id, "alice")
                .item(1, "Taxi", 25_00)
                .claim("bob", vec![1]),
        )
        .await
        .unwrap();
    engine.settle_bill(&bill_id).await.unwrap();

    let err = engine
        .retry_participant_charge(&bill_id, "bob", "mallory")
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Forbidden(_)));

    let err = engine
        .retry_participant_charge(&bill_id, "bob", "bob")
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Gateway(_)));
    let detail = engine.bill(&bill_id, "bob").await.unwrap();
    assert_eq!(detail.participants[0].status, ParticipantStatus::Failed);

    engine.link_payment_method("bob", "cus_bob").await.unwrap();
    let status = engine
        .retry_participant_charge(&bill_id, "bob", "alice")
        .await
        .unwrap();
    assert_eq!(status, ParticipantStatus::Paid);

    let notifications = engine.list_notifications("bob", false).await.unwrap();
    assert!(
        notifications
            .iter()
            .any(|n| n.kind == engine::NotificationKind::PaymentFailed)
    );
    assert!(
        notifications
            .iter()
            .any(|n| n.kind == engine::NotificationKind::PaymentSuccess)
    );
}

#[tokio::test]
async fn draft_bills_wait_for_submit_and_can_be_cancelled() {
    let (engine, _db) = engine_with(Arc::new(SimulatedPayments)).await;
    let group_id = group_with(&engine, &["alice", "bob"]).await;

    let bill_id = engine
        .create_bill(dinner(&group_id).claim("alice", vec![1, 2, 3]).draft(true))
        .await
        .unwrap();
    assert_eq!(
        engine.settle_bill(&bill_id).await.unwrap(),
        SettlementOutcome::Skipped {
            status: BillStatus::Draft
        }
    );

    let err = engine.submit_bill(&bill_id, "bob").await.unwrap_err();
    assert!(matches!(err, EngineError::Forbidden(_)));
    engine.submit_bill(&bill_id, "alice").await.unwrap();
    let err = engine.submit_bill(&bill_id, "alice").await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidState(_)));

    engine.cancel_bill(&bill_id, "alice").await.unwrap();
    let detail = engine.bill(&bill_id, "alice").await.unwrap();
    assert_eq!(detail.bill.status, BillStatus::Cancelled);
    assert_eq!(
        engine.settle_bill(&bill_id).await.unwrap(),
        SettlementOutcome::Skipped {
            status: BillStatus::Cancelled
        }
    );
}

#[tokio::test]
async fn bill_reads_are_limited_to_group_members() {
    let (engine, _db) = engine_with(Arc::new(SimulatedPayments)).await;
    let group_id = group_with(&engine, &["alice", "bob"]).await;
    engine.create_user("mallory", "password", None).await.unwrap();

    let bill_id = engine
        .create_bill(dinner(&group_id).claim("alice", vec![1, 2, 3]))
        .await
        .unwrap();

    let err = engine.bill(&bill_id, "mallory").await.unwrap_err();
    assert!(matches!(err, EngineError::Forbidden(_)));

    engine
        .set_member_status(&group_id, "bob", MemberStatus::Removed, "alice")
        .await
        .unwrap();
    let err = engine.bill(&bill_id, "bob").await.unwrap_err();
    assert!(matches!(err, EngineError::Forbidden(_)));

    let bills = engine
        .list_bills(&group_id, engine::BillFilter::default(), "alice")
        .await
        .unwrap();
    assert_eq!(bills.len(), 1);
}

#[tokio::test]
async fn dashboard_sums_split_payments() {
    let (engine, _db) = engine_with(Arc::new(SimulatedPayments)).await;
    let group_id = group_with(&engine, &["alice", "bob"]).await;
    engine.link_payment_method("bob", "cus_bob").await.unwrap();

    let bill_id = engine
        .create_bill(
            CreateBillCmd::new(&group_id, "alice")
                .item(1, "Groceries", 33_33)
                .claim("bob", vec![1]),
        )
        .await
        .unwrap();
    engine.settle_bill(&bill_id).await.unwrap();

    let dashboard = engine.dashboard("bob").await.unwrap();
    assert_eq!(dashboard.total_paid_minor, 33_33);
    assert_eq!(dashboard.bills_last_30_days, 1);
    assert_eq!(dashboard.recent_transactions.len(), 1);

    let unread = engine.list_notifications("bob", true).await.unwrap();
    assert!(!unread.is_empty());
    for notification in &unread {
        engine
            .mark_notification_read(&notification.id.to_string(), "bob")
            .await
            .unwrap();
    }
    assert!(engine.list_notifications("bob", true).await.unwrap().is_empty());

    let err = engine
        .mark_notification_read(&unread[0].id.to_string(), "alice")
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::KeyNotFound(_)));
}

use std::sync::Arc;

use sea_orm::{ConnectionTrait, Database, DatabaseConnection};

use engine::{
    BillStatus, CardAuthorization, CardStatus, CreateBillCmd, CreateGroupCmd, Engine,
    EngineError, MemberRole,
    gateways::{CardIssuer, SimulatedCardIssuer},
};
use migration::MigratorTrait;

async fn engine_with(cards: Option<Arc<dyn CardIssuer>>) -> (Engine, DatabaseConnection) {
    let db = Database::connect("sqlite::memory:").await.unwrap();
    migration::Migrator::up(&db, None).await.unwrap();
    let mut builder = Engine::builder().database(db.clone());
    if let Some(cards) = cards {
        builder = builder.card_issuer(cards);
    }
    (builder.build().await.unwrap(), db)
}

async fn bill_for(engine: &Engine) -> String {
    for name in ["alice", "bob", "mallory"] {
        engine.create_user(name, "password", None).await.unwrap();
    }
    let group_id = engine
        .create_group(CreateGroupCmd::new("Dinner club", "alice"))
        .await
        .unwrap();
    engine
        .invite_member(&group_id, "bob", MemberRole::Member, "alice")
        .await
        .unwrap();
    engine.accept_invite(&group_id, "bob").await.unwrap();
    engine
        .create_bill(
            CreateBillCmd::new(&group_id, "alice")
                .merchant("Trattoria")
                .item(1, "Pizza", 30_00)
                .item(2, "Wine", 20_00)
                .tip(5_00)
                .claim("alice", vec![1])
                .claim("bob", vec![2])
                .draft(true),
        )
        .await
        .unwrap()
}

fn authorization(card_ref: &str, amount_minor: i64) -> CardAuthorization {
    CardAuthorization {
        authorization_ref: "iauth_1".to_string(),
        card_ref: card_ref.to_string(),
        amount_minor,
        merchant: Some("Trattoria".to_string()),
    }
}

#[tokio::test]
async fn without_issuer_a_stub_card_is_recorded() {
    let (engine, _db) = engine_with(None).await;
    let bill_id = bill_for(&engine).await;

    let card = engine.create_virtual_card(&bill_id, "bob").await.unwrap();
    assert_eq!(card.last4, "0000");
    assert_eq!(card.brand, "virtual");
    assert!(card.card_ref.is_none());
    assert_eq!(card.spending_limit_minor, 55_00);
    assert_eq!(card.status, CardStatus::Active);
    assert_eq!(card.expires_at - card.created_at, chrono::Duration::hours(1));

    let cards = engine.bill_cards(&bill_id, "alice").await.unwrap();
    assert_eq!(cards.len(), 1);
    assert_eq!(cards[0].id, card.id);
    assert_eq!(cards[0].username, "bob");
}

#[tokio::test]
async fn cards_are_limited_to_group_members_and_live_bills() {
    let (engine, _db) = engine_with(None).await;
    let bill_id = bill_for(&engine).await;

    let err = engine
        .create_virtual_card(&bill_id, "mallory")
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Forbidden(_)));
    let err = engine.bill_cards(&bill_id, "mallory").await.unwrap_err();
    assert!(matches!(err, EngineError::Forbidden(_)));

    engine.cancel_bill(&bill_id, "alice").await.unwrap();
    let detail = engine.bill(&bill_id, "alice").await.unwrap();
    assert_eq!(detail.bill.status, BillStatus::Cancelled);
    let err = engine
        .create_virtual_card(&bill_id, "alice")
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidState(_)));
}

#[tokio::test]
async fn authorization_within_limit_uses_the_card_once() {
    let (engine, _db) = engine_with(Some(Arc::new(SimulatedCardIssuer))).await;
    let bill_id = bill_for(&engine).await;
    let card = engine.create_virtual_card(&bill_id, "alice").await.unwrap();
    let card_ref = card.card_ref.clone().unwrap();
    assert_eq!(card.last4, "4242");

    assert!(!engine.authorize_card(authorization(&card_ref, 55_01)).await.unwrap());
    assert!(engine.authorize_card(authorization(&card_ref, 54_10)).await.unwrap());
    assert!(!engine.authorize_card(authorization(&card_ref, 1_00)).await.unwrap());
    assert!(!engine.authorize_card(authorization("unknown", 1_00)).await.unwrap());

    let cards = engine.bill_cards(&bill_id, "bob").await.unwrap();
    assert_eq!(cards.len(), 1);
    assert_eq!(cards[0].status, CardStatus::Used);
    assert_eq!(cards[0].spent_minor, 54_10);
    assert!(cards[0].used_at.is_some());
}

#[tokio::test]
async fn expired_card_is_declined_and_marked() {
    let (engine, db) = engine_with(Some(Arc::new(SimulatedCardIssuer))).await;
    let bill_id = bill_for(&engine).await;
    let card = engine.create_virtual_card(&bill_id, "alice").await.unwrap();
    db.execute_unprepared("UPDATE virtual_cards SET expires_at = '2020-01-01T00:00:00+00:00'")
        .await
        .unwrap();

    let approved = engine
        .authorize_card(authorization(card.card_ref.as_deref().unwrap(), 10_00))
        .await
        .unwrap();
    assert!(!approved);
    let cards = engine.bill_cards(&bill_id, "alice").await.unwrap();
    assert_eq!(cards[0].status, CardStatus::Expired);
}

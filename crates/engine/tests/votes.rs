use chrono::{Duration, Utc};
use sea_orm::{ConnectionTrait, Database, DatabaseConnection};

use engine::{
    CreateGroupCmd, Decision, Direction, Engine, EngineError, ExecutionOutcome, MemberRole,
    MemberStatus, NotificationKind, ProposeInvestmentCmd, TradeAction, TransactionKind,
    VoteStatus, jobs::Job,
};
use migration::MigratorTrait;

const MEMBERS: [&str; 5] = ["alice", "bob", "carol", "dave", "erin"];

async fn engine_with_db() -> (Engine, DatabaseConnection) {
    let db = Database::connect("sqlite::memory:").await.unwrap();
    migration::Migrator::up(&db, None).await.unwrap();
    let engine = Engine::builder()
        .database(db.clone())
        .build()
        .await
        .unwrap();
    (engine, db)
}

async fn group_with(engine: &Engine, members: &[&str]) -> String {
    for name in members {
        engine.create_user(name, "password", None).await.unwrap();
    }
    let owner = members[0];
    let group_id = engine
        .create_group(CreateGroupCmd::new("Investment club", owner).vote_threshold_pct(60))
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

async fn propose_buy(engine: &Engine, group_id: &str, amount_minor: i64) -> String {
    engine
        .propose_investment(
            ProposeInvestmentCmd::new(group_id, "alice", TradeAction::Buy, "vti", amount_minor)
                .shares(2_500_000)
                .reasoning("broad market"),
        )
        .await
        .unwrap()
}

#[tokio::test]
async fn three_of_five_approves_at_sixty_percent() {
    let (engine, _db) = engine_with_db().await;
    let group_id = group_with(&engine, &MEMBERS).await;
    let vote_id = propose_buy(&engine, &group_id, 500_00).await;

    let detail = engine.vote(&vote_id, "bob").await.unwrap();
    assert_eq!(detail.vote.votes_required, 5);
    assert_eq!(detail.vote.symbol, "VTI");
    assert_eq!(detail.approvals_needed, 3);
    assert_eq!(detail.tally.yes, 1);
    assert_eq!(detail.tally.outstanding, 4);

    assert_eq!(
        engine.cast_vote(&vote_id, "bob", Decision::Yes).await.unwrap(),
        VoteStatus::Pending
    );
    engine.cast_vote(&vote_id, "carol", Decision::Yes).await.unwrap();
    engine.cast_vote(&vote_id, "dave", Decision::No).await.unwrap();
    let status = engine.cast_vote(&vote_id, "erin", Decision::No).await.unwrap();
    assert_eq!(status, VoteStatus::Approved);

    let err = engine
        .cast_vote(&vote_id, "erin", Decision::Yes)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidState(_)));
}

#[tokio::test]
async fn two_of_five_rejects() {
    let (engine, _db) = engine_with_db().await;
    let group_id = group_with(&engine, &MEMBERS).await;
    let vote_id = propose_buy(&engine, &group_id, 500_00).await;

    engine.cast_vote(&vote_id, "bob", Decision::Yes).await.unwrap();
    engine.cast_vote(&vote_id, "carol", Decision::No).await.unwrap();
    engine.cast_vote(&vote_id, "dave", Decision::Abstain).await.unwrap();
    let status = engine.cast_vote(&vote_id, "erin", Decision::No).await.unwrap();
    assert_eq!(status, VoteStatus::Rejected);

    let outcome = engine.execute_trade(&vote_id).await.unwrap();
    assert_eq!(
        outcome,
        ExecutionOutcome::NotApproved {
            status: VoteStatus::Rejected
        }
    );
    assert!(
        engine
            .group_investments(&group_id, "alice")
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
async fn changing_a_ballot_counts_only_the_last_decision() {
    let (engine, _db) = engine_with_db().await;
    let group_id = group_with(&engine, &["alice", "bob", "carol"]).await;
    let vote_id = propose_buy(&engine, &group_id, 90_00).await;

    engine.cast_vote(&vote_id, "bob", Decision::No).await.unwrap();
    engine.cast_vote(&vote_id, "bob", Decision::Yes).await.unwrap();

    let detail = engine.vote(&vote_id, "alice").await.unwrap();
    assert_eq!(detail.tally.yes, 2);
    assert_eq!(detail.tally.no, 0);
    assert_eq!(detail.tally.outstanding, 1);
    assert_eq!(detail.vote.status, VoteStatus::Pending);
}

#[tokio::test]
async fn late_joiners_cannot_vote() {
    let (engine, _db) = engine_with_db().await;
    let group_id = group_with(&engine, &["alice", "bob"]).await;
    let vote_id = propose_buy(&engine, &group_id, 10_00).await;

    engine.create_user("zoe", "password", None).await.unwrap();
    engine
        .invite_member(&group_id, "zoe", MemberRole::Member, "alice")
        .await
        .unwrap();

    // Still invited: not an active member.
    let err = engine
        .cast_vote(&vote_id, "zoe", Decision::Yes)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Forbidden(_)));

    engine.accept_invite(&group_id, "zoe").await.unwrap();
    let err = engine
        .cast_vote(&vote_id, "zoe", Decision::Yes)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Forbidden(_)));

    let detail = engine.vote(&vote_id, "zoe").await.unwrap();
    assert_eq!(detail.vote.votes_required, 2);
}

#[tokio::test]
async fn executing_twice_books_one_position() {
    let (engine, _db) = engine_with_db().await;
    let group_id = group_with(&engine, &["alice", "bob", "carol"]).await;
    let vote_id = propose_buy(&engine, &group_id, 100_00).await;
    engine.cast_vote(&vote_id, "bob", Decision::Yes).await.unwrap();
    let status = engine.cast_vote(&vote_id, "carol", Decision::Yes).await.unwrap();
    assert_eq!(status, VoteStatus::Approved);

    let first = engine.execute_trade(&vote_id).await.unwrap();
    let ExecutionOutcome::Executed {
        investment_id: Some(investment_id),
    } = first
    else {
        panic!("unexpected outcome {first:?}");
    };
    assert_eq!(
        engine.execute_trade(&vote_id).await.unwrap(),
        ExecutionOutcome::AlreadyExecuted
    );

    let positions = engine.group_investments(&group_id, "bob").await.unwrap();
    assert_eq!(positions.len(), 1);
    assert_eq!(positions[0].id.to_string(), investment_id);
    assert_eq!(positions[0].shares_micros, 2_500_000);
    // 100.00 for 2.5 shares.
    assert_eq!(positions[0].avg_cost_minor, 40_00);

    let ledger = engine.group_transactions(&group_id, "alice").await.unwrap();
    assert_eq!(ledger.len(), 3);
    assert!(ledger.iter().all(|tx| tx.kind == TransactionKind::InvestmentBuy));
    let mut parts: Vec<i64> = ledger.iter().map(|tx| tx.amount_minor).collect();
    parts.sort_unstable();
    assert_eq!(parts, vec![33_33, 33_33, 33_34]);

    let group = engine.group(&group_id, "carol").await.unwrap();
    assert_eq!(group.group.total_invested_minor, 100_00);
    let vote = engine.vote(&vote_id, "alice").await.unwrap();
    assert_eq!(vote.vote.status, VoteStatus::Executed);
    assert!(vote.vote.executed_at.is_some());
}

#[tokio::test]
async fn hold_executes_without_bookings() {
    let (engine, _db) = engine_with_db().await;
    let group_id = group_with(&engine, &["alice"]).await;
    let vote_id = engine
        .propose_investment(ProposeInvestmentCmd::new(
            &group_id,
            "alice",
            TradeAction::Hold,
            "VTI",
            0,
        ))
        .await
        .unwrap();

    // A single member's proposal is decided immediately.
    let detail = engine.vote(&vote_id, "alice").await.unwrap();
    assert_eq!(detail.vote.status, VoteStatus::Approved);

    assert_eq!(
        engine.execute_trade(&vote_id).await.unwrap(),
        ExecutionOutcome::Executed {
            investment_id: None
        }
    );
    assert!(
        engine
            .group_transactions(&group_id, "alice")
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
async fn overdue_votes_expire() {
    let (engine, _db) = engine_with_db().await;
    let group_id = group_with(&engine, &["alice", "bob"]).await;
    let vote_id = propose_buy(&engine, &group_id, 10_00).await;

    assert_eq!(engine.expire_votes(Utc::now()).await.unwrap(), 0);
    let later = Utc::now() + Duration::hours(25);
    assert_eq!(engine.expire_votes(later).await.unwrap(), 1);

    let detail = engine.vote(&vote_id, "bob").await.unwrap();
    assert_eq!(detail.vote.status, VoteStatus::Expired);
    let err = engine
        .cast_vote(&vote_id, "bob", Decision::Yes)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidState(_)));
}

#[tokio::test]
async fn only_the_proposer_cancels() {
    let (engine, _db) = engine_with_db().await;
    let group_id = group_with(&engine, &["alice", "bob"]).await;
    let vote_id = propose_buy(&engine, &group_id, 10_00).await;

    let err = engine.cancel_vote(&vote_id, "bob").await.unwrap_err();
    assert!(matches!(err, EngineError::Forbidden(_)));
    engine.cancel_vote(&vote_id, "alice").await.unwrap();
    let err = engine.cancel_vote(&vote_id, "alice").await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidState(_)));

    let cancelled = engine
        .list_votes(&group_id, Some(VoteStatus::Cancelled), "bob")
        .await
        .unwrap();
    assert_eq!(cancelled.len(), 1);
}

#[tokio::test]
async fn unfinished_work_is_recovered() {
    let (engine, _db) = engine_with_db().await;
    let group_id = group_with(&engine, &["alice"]).await;
    let vote_id = propose_buy(&engine, &group_id, 10_00).await;

    let jobs = engine.unfinished_jobs().await.unwrap();
    assert_eq!(
        jobs,
        vec![Job::ExecuteTrade {
            vote_id: vote_id.clone()
        }]
    );

    engine.execute_trade(&vote_id).await.unwrap();
    assert!(engine.unfinished_jobs().await.unwrap().is_empty());
}

#[tokio::test]
async fn sell_books_negative_position_and_credits_members() {
    let (engine, _db) = engine_with_db().await;
    let group_id = group_with(&engine, &["alice", "bob"]).await;
    let buy_id = propose_buy(&engine, &group_id, 100_00).await;
    engine.cast_vote(&buy_id, "bob", Decision::Yes).await.unwrap();
    engine.execute_trade(&buy_id).await.unwrap();

    let sell_id = engine
        .propose_investment(
            ProposeInvestmentCmd::new(&group_id, "alice", TradeAction::Sell, "VTI", 50_00)
                .shares(1_000_000),
        )
        .await
        .unwrap();
    let status = engine.cast_vote(&sell_id, "bob", Decision::Yes).await.unwrap();
    assert_eq!(status, VoteStatus::Approved);
    let ExecutionOutcome::Executed {
        investment_id: Some(sell_position),
    } = engine.execute_trade(&sell_id).await.unwrap()
    else {
        panic!("sell was not booked");
    };

    let positions = engine.group_investments(&group_id, "alice").await.unwrap();
    assert_eq!(positions.len(), 2);
    let sell = positions
        .iter()
        .find(|p| p.id.to_string() == sell_position)
        .unwrap();
    assert_eq!(sell.shares_micros, -1_000_000);
    assert_eq!(sell.avg_cost_minor, 50_00);

    let sells: Vec<_> = engine
        .group_transactions(&group_id, "bob")
        .await
        .unwrap()
        .into_iter()
        .filter(|tx| tx.kind == TransactionKind::InvestmentSell)
        .collect();
    assert_eq!(sells.len(), 2);
    assert!(
        sells
            .iter()
            .all(|tx| tx.direction == Direction::Credit && tx.amount_minor == 25_00)
    );

    // Sells do not count as invested money.
    let group = engine.group(&group_id, "alice").await.unwrap();
    assert_eq!(group.group.total_invested_minor, 100_00);
    let dashboard = engine.dashboard("bob").await.unwrap();
    assert_eq!(dashboard.portfolio_value_minor, 50_00);
}

#[tokio::test]
async fn trades_without_shares_are_rejected() {
    let (engine, _db) = engine_with_db().await;
    let group_id = group_with(&engine, &["alice", "bob"]).await;

    for action in [TradeAction::Buy, TradeAction::Sell] {
        let err = engine
            .propose_investment(ProposeInvestmentCmd::new(
                &group_id, "alice", action, "VTI", 10_00,
            ))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidAmount(_)));
    }
    assert!(
        engine
            .list_votes(&group_id, None, "alice")
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
async fn failed_execution_is_recorded_and_notified_once() {
    let (engine, db) = engine_with_db().await;
    let group_id = group_with(&engine, &["alice"]).await;
    let vote_id = propose_buy(&engine, &group_id, 10_00).await;

    db.execute_unprepared("UPDATE group_members SET status = 'suspended'")
        .await
        .unwrap();

    let err = engine.execute_trade(&vote_id).await.unwrap_err();
    assert!(matches!(err, EngineError::Consistency(_)));
    assert!(engine.execute_trade(&vote_id).await.is_err());

    let detail = engine.vote(&vote_id, "alice").await.unwrap();
    assert_eq!(detail.vote.status, VoteStatus::Approved);
    assert!(detail.vote.execution_error.is_some());
    assert!(
        engine
            .group_investments(&group_id, "alice")
            .await
            .unwrap()
            .is_empty()
    );

    let failures = engine
        .list_notifications("alice", false)
        .await
        .unwrap()
        .into_iter()
        .filter(|n| n.kind == NotificationKind::TradeFailed)
        .count();
    assert_eq!(failures, 1);

    // Still approved, so recovery retries it.
    assert_eq!(
        engine.unfinished_jobs().await.unwrap(),
        vec![Job::ExecuteTrade { vote_id }]
    );
}

#[tokio::test]
async fn suspended_holder_no_longer_blocks_the_decision() {
    let (engine, _db) = engine_with_db().await;
    let group_id = group_with(&engine, &["alice", "bob", "carol"]).await;
    let vote_id = propose_buy(&engine, &group_id, 30_00).await;

    let status = engine.cast_vote(&vote_id, "bob", Decision::Yes).await.unwrap();
    assert_eq!(status, VoteStatus::Pending);

    engine
        .set_member_status(&group_id, "carol", MemberStatus::Suspended, "alice")
        .await
        .unwrap();

    let detail = engine.vote(&vote_id, "alice").await.unwrap();
    assert_eq!(detail.vote.status, VoteStatus::Approved);
    assert_eq!(detail.tally.outstanding, 1);
    let err = engine
        .cast_vote(&vote_id, "carol", Decision::No)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidState(_)));
    assert_eq!(
        engine.unfinished_jobs().await.unwrap(),
        vec![Job::ExecuteTrade { vote_id }]
    );
}

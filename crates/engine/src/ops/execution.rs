use chrono::Utc;
use sea_orm::{Condition, QueryFilter, QueryOrder, TransactionTrait, prelude::*, sea_query::Expr};

use crate::{
    EngineError, Money, ResultEngine, Shares,
    gateways::{Event, group_topic},
    groups,
    investments::{self, Investment},
    notifications::{Notification, NotificationKind},
    split::split_evenly,
    transactions::{Direction, Transaction, TransactionKind},
    vote_ballots,
    votes::{self, TradeAction, VoteStatus},
};

use super::{Engine, notify::Outbox, with_tx};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExecutionOutcome {
    /// The trade was booked; `hold` books no position.
    Executed { investment_id: Option<String> },
    AlreadyExecuted,
    NotApproved { status: VoteStatus },
}

impl Engine {
    /// Executes an approved vote exactly once.
    ///
    /// The `approved -> executed` transition, the position row, the group
    /// total and the per-member ledger entries commit together; a second call
    /// finds the vote already executed and does nothing. The amount is split
    /// evenly across the currently active members, leftover cents going to
    /// the first members by username.
    ///
    /// A failed attempt leaves the vote `approved` so recovery can retry it;
    /// the error is stored on the vote and the ballot holders are notified
    /// once per distinct error.
    pub async fn execute_trade(&self, vote_id: &str) -> ResultEngine<ExecutionOutcome> {
        match self.book_trade(vote_id).await {
            Err(err) if !matches!(err, EngineError::KeyNotFound(_)) => {
                tracing::error!(%vote_id, error = %err, "trade execution failed");
                if let Err(record_err) = self.record_trade_failure(vote_id, &err.to_string()).await
                {
                    tracing::error!(%vote_id, error = %record_err, "cannot record trade failure");
                }
                Err(err)
            }
            result => result,
        }
    }

    async fn book_trade(&self, vote_id: &str) -> ResultEngine<ExecutionOutcome> {
        let mut outbox = Outbox::default();
        let outcome = with_tx!(self, |db_tx| {
            let vote = self.require_vote(&db_tx, vote_id).await?;
            let res = votes::Entity::update_many()
                .col_expr(votes::Column::Status, Expr::value(VoteStatus::Executed.as_str()))
                .col_expr(votes::Column::ExecutedAt, Expr::value(Utc::now()))
                .col_expr(
                    votes::Column::ExecutionError,
                    Expr::value(Option::<String>::None),
                )
                .filter(votes::Column::Id.eq(vote_id.to_string()))
                .filter(votes::Column::Status.eq(VoteStatus::Approved.as_str()))
                .exec(&db_tx)
                .await?;
            if res.rows_affected == 0 {
                let current = self.require_vote(&db_tx, vote_id).await?;
                return Ok(match current.status {
                    VoteStatus::Executed => ExecutionOutcome::AlreadyExecuted,
                    status => ExecutionOutcome::NotApproved { status },
                });
            }

            let group = self.require_group(&db_tx, &vote.group_id).await?;
            let members = self.active_members(&db_tx, &vote.group_id).await?;
            if members.is_empty() {
                return Err(EngineError::Consistency(
                    "approved vote in a group without active members".to_string(),
                ));
            }

            let booking = match vote.action {
                TradeAction::Buy | TradeAction::Rebalance => Some((
                    TransactionKind::InvestmentBuy,
                    Direction::Debit,
                    vote.shares_micros,
                )),
                TradeAction::Sell => Some((
                    TransactionKind::InvestmentSell,
                    Direction::Credit,
                    -vote.shares_micros,
                )),
                TradeAction::Hold => None,
            };

            let mut investment_id = None;
            let mut parts = vec![0; members.len()];
            if let Some((kind, direction, shares_micros)) = booking {
                let investment = Investment::from_trade(
                    &vote.group_id,
                    vote_id,
                    &vote.symbol,
                    vote.amount_minor,
                    shares_micros,
                );
                let id = investment.id.to_string();
                investments::ActiveModel::from(&investment)
                    .insert(&db_tx)
                    .await?;

                if direction == Direction::Debit {
                    groups::Entity::update_many()
                        .col_expr(
                            groups::Column::TotalInvestedMinor,
                            Expr::col(groups::Column::TotalInvestedMinor).add(vote.amount_minor),
                        )
                        .filter(groups::Column::Id.eq(vote.group_id.clone()))
                        .exec(&db_tx)
                        .await?;
                }

                parts = split_evenly(vote.amount_minor, members.len());
                for (member, part) in members.iter().zip(&parts) {
                    if *part == 0 {
                        continue;
                    }
                    let tx = Transaction::new(
                        &member.username,
                        kind,
                        direction,
                        *part,
                        group.currency,
                    )?
                    .group(vote.group_id.clone())
                    .vote(vote_id)
                    .investment(id.clone())
                    .description(format!("{} {}", vote.action.as_str(), vote.symbol));
                    self.record_transaction(&db_tx, &tx).await?;
                }
                investment_id = Some(id);
            }

            for (member, part) in members.iter().zip(&parts) {
                outbox
                    .notify(
                        &db_tx,
                        Notification::new(
                            &member.username,
                            NotificationKind::TradeExecuted,
                            "Trade executed",
                            format!(
                                "Your group executed {} {} {}: your share is {}",
                                vote.action.as_str(),
                                Shares::new(vote.shares_micros),
                                vote.symbol,
                                Money::new(*part)
                            ),
                            serde_json::json!({
                                "vote_id": vote_id,
                                "investment_id": investment_id,
                                "share_minor": part,
                            }),
                        ),
                    )
                    .await?;
            }
            outbox.publish(
                group_topic(&vote.group_id),
                Event::TradeExecuted {
                    vote_id: vote_id.to_string(),
                    group_id: vote.group_id.clone(),
                    investment_id: investment_id.clone(),
                },
            );
            tracing::info!(
                %vote_id,
                ?investment_id,
                action = vote.action.as_str(),
                members = members.len(),
                "trade executed"
            );
            Ok(ExecutionOutcome::Executed { investment_id })
        })?;
        self.dispatch(outbox).await;
        Ok(outcome)
    }

    async fn record_trade_failure(&self, vote_id: &str, reason: &str) -> ResultEngine<()> {
        let mut outbox = Outbox::default();
        with_tx!(self, |db_tx| {
            let res = votes::Entity::update_many()
                .col_expr(votes::Column::ExecutionError, Expr::value(reason.to_string()))
                .filter(votes::Column::Id.eq(vote_id.to_string()))
                .filter(votes::Column::Status.eq(VoteStatus::Approved.as_str()))
                .filter(
                    Condition::any()
                        .add(votes::Column::ExecutionError.is_null())
                        .add(votes::Column::ExecutionError.ne(reason.to_string())),
                )
                .exec(&db_tx)
                .await?;
            if res.rows_affected == 0 {
                return Ok(());
            }
            let vote = self.require_vote(&db_tx, vote_id).await?;
            let holders = vote_ballots::Entity::find()
                .filter(vote_ballots::Column::VoteId.eq(vote_id.to_string()))
                .order_by_asc(vote_ballots::Column::Username)
                .all(&db_tx)
                .await?;
            for ballot in holders {
                outbox
                    .notify(
                        &db_tx,
                        Notification::new(
                            &ballot.username,
                            NotificationKind::TradeFailed,
                            "Trade failed",
                            format!(
                                "The approved {} of {} could not be executed: {reason}",
                                vote.action.as_str(),
                                vote.symbol
                            ),
                            serde_json::json!({ "vote_id": vote_id, "group_id": vote.group_id }),
                        ),
                    )
                    .await?;
            }
            Ok(())
        })?;
        self.dispatch(outbox).await;
        Ok(())
    }

    /// Positions of a group, oldest first. Group members only.
    pub async fn group_investments(
        &self,
        group_id: &str,
        username: &str,
    ) -> ResultEngine<Vec<Investment>> {
        with_tx!(self, |db_tx| {
            self.require_group(&db_tx, group_id).await?;
            self.require_member(&db_tx, group_id, username).await?;
            investments::Entity::find()
                .filter(investments::Column::GroupId.eq(group_id.to_string()))
                .order_by_asc(investments::Column::CreatedAt)
                .all(&db_tx)
                .await?
                .into_iter()
                .map(Investment::try_from)
                .collect::<ResultEngine<Vec<_>>>()
        })
    }
}

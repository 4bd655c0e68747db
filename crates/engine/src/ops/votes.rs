//! Quorum voting on pooled trades.
//!
//! A proposal snapshots its electorate: one ballot per active member at
//! proposal time, and `votes_required` equal to that count. The vote is
//! decided when every ballot is cast, not counting outstanding ballots of
//! members who have since been suspended or removed. It is approved when the
//! `yes` count reaches `ceil(electorate * threshold / 100)`. The decision is a
//! conditional `pending -> approved | rejected` update, and only the caller
//! that wins it schedules execution.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveValue, DatabaseTransaction, QueryFilter, QueryOrder, TransactionTrait,
    prelude::*,
    sea_query::{Expr, OnConflict},
};
use uuid::Uuid;

use crate::{
    EngineError, Money, ResultEngine,
    commands::ProposeInvestmentCmd,
    gateways::{Event, group_topic, user_topic},
    groups::{Group, approvals_needed},
    jobs::Job,
    notifications::{Notification, NotificationKind},
    util::{normalize_optional_text, normalize_symbol},
    vote_ballots,
    votes::{self, Ballot, Decision, InvestmentVote, Tally, TradeAction, VoteDetail, VoteStatus},
};

use super::{Engine, notify::Outbox, with_tx};

impl Engine {
    /// Opens a vote on a trade. The proposer's ballot is recorded as `yes`.
    pub async fn propose_investment(&self, cmd: ProposeInvestmentCmd) -> ResultEngine<String> {
        let symbol = normalize_symbol(&cmd.symbol)?;
        if cmd.amount_minor < 0 || (cmd.action != TradeAction::Hold && cmd.amount_minor == 0) {
            return Err(EngineError::InvalidAmount(
                "amount must be > 0".to_string(),
            ));
        }
        if cmd.shares_micros < 0 {
            return Err(EngineError::InvalidAmount(
                "shares must be >= 0".to_string(),
            ));
        }
        if cmd.action != TradeAction::Hold && cmd.shares_micros == 0 {
            return Err(EngineError::InvalidAmount(
                "shares must be > 0".to_string(),
            ));
        }

        let now = Utc::now();
        let mut outbox = Outbox::default();
        let vote_id = with_tx!(self, |db_tx| {
            let group = self.require_group(&db_tx, &cmd.group_id).await?;
            self.require_active_member(&db_tx, &cmd.group_id, &cmd.proposed_by)
                .await?;
            let electorate = self.active_members(&db_tx, &cmd.group_id).await?;
            let votes_required = u32::try_from(electorate.len())
                .map_err(|_| EngineError::Validation("group too large".to_string()))?;

            let vote = InvestmentVote {
                id: Uuid::new_v4(),
                group_id: cmd.group_id.clone(),
                proposed_by: cmd.proposed_by.clone(),
                action: cmd.action,
                symbol: symbol.clone(),
                amount_minor: cmd.amount_minor,
                shares_micros: cmd.shares_micros,
                reasoning: normalize_optional_text(cmd.reasoning.as_deref()),
                votes_required,
                status: VoteStatus::Pending,
                expires_at: now + self.vote_ttl,
                created_at: now,
                decided_at: None,
                executed_at: None,
                execution_error: None,
            };
            let vote_id = vote.id.to_string();
            votes::ActiveModel::from(&vote).insert(&db_tx).await?;

            for member in &electorate {
                let is_proposer = member.username == cmd.proposed_by;
                vote_ballots::ActiveModel {
                    vote_id: ActiveValue::Set(vote_id.clone()),
                    username: ActiveValue::Set(member.username.clone()),
                    decision: ActiveValue::Set(
                        is_proposer.then(|| Decision::Yes.as_str().to_string()),
                    ),
                    cast_at: ActiveValue::Set(is_proposer.then_some(now)),
                }
                .insert(&db_tx)
                .await?;

                if is_proposer {
                    continue;
                }
                outbox
                    .notify(
                        &db_tx,
                        Notification::new(
                            &member.username,
                            NotificationKind::InvestmentVote,
                            "New investment proposal",
                            format!(
                                "{} proposes to {} {} {} ({})",
                                cmd.proposed_by,
                                cmd.action.as_str(),
                                Money::new(cmd.amount_minor),
                                group.currency,
                                symbol
                            ),
                            serde_json::json!({ "vote_id": vote_id, "group_id": cmd.group_id }),
                        ),
                    )
                    .await?;
                outbox.publish(user_topic(&member.username), new_vote_event(&vote));
            }
            outbox.publish(group_topic(&cmd.group_id), new_vote_event(&vote));

            self.complete_if_decided(&db_tx, &mut outbox, &vote, &group)
                .await?;
            Ok(vote_id)
        })?;

        tracing::info!(
            %vote_id,
            group_id = %cmd.group_id,
            action = cmd.action.as_str(),
            %symbol,
            "investment proposed"
        );
        self.dispatch(outbox).await;
        Ok(vote_id)
    }

    /// Records a member's decision. Resubmitting overwrites the previous
    /// decision. Returns the vote status after the ballot was counted.
    pub async fn cast_vote(
        &self,
        vote_id: &str,
        username: &str,
        decision: Decision,
    ) -> ResultEngine<VoteStatus> {
        let now = Utc::now();
        let mut outbox = Outbox::default();
        let status = with_tx!(self, |db_tx| {
            let vote = self.require_vote(&db_tx, vote_id).await?;
            if vote.status != VoteStatus::Pending {
                return Err(EngineError::InvalidState(format!(
                    "vote is {}",
                    vote.status.as_str()
                )));
            }
            if now > vote.expires_at {
                return Err(EngineError::InvalidState("vote expired".to_string()));
            }
            let group = self.require_group(&db_tx, &vote.group_id).await?;
            self.require_active_member(&db_tx, &vote.group_id, username)
                .await?;
            let ballot_key = (vote_id.to_string(), username.to_string());
            let eligible = vote_ballots::Entity::find_by_id(ballot_key)
                .one(&db_tx)
                .await?
                .is_some();
            if !eligible {
                return Err(EngineError::Forbidden(
                    "joined after the proposal, not eligible to vote".to_string(),
                ));
            }

            vote_ballots::Entity::insert(vote_ballots::ActiveModel {
                vote_id: ActiveValue::Set(vote_id.to_string()),
                username: ActiveValue::Set(username.to_string()),
                decision: ActiveValue::Set(Some(decision.as_str().to_string())),
                cast_at: ActiveValue::Set(Some(now)),
            })
            .on_conflict(
                OnConflict::columns([
                    vote_ballots::Column::VoteId,
                    vote_ballots::Column::Username,
                ])
                .update_columns([vote_ballots::Column::Decision, vote_ballots::Column::CastAt])
                .to_owned(),
            )
            .exec(&db_tx)
            .await?;
            tracing::debug!(%vote_id, %username, decision = decision.as_str(), "ballot cast");

            self.complete_if_decided(&db_tx, &mut outbox, &vote, &group)
                .await
        })?;
        self.dispatch(outbox).await;
        Ok(status)
    }

    /// Withdraws a pending proposal. Proposer only.
    pub async fn cancel_vote(&self, vote_id: &str, username: &str) -> ResultEngine<()> {
        let mut outbox = Outbox::default();
        with_tx!(self, |db_tx| {
            let vote = self.require_vote(&db_tx, vote_id).await?;
            if vote.proposed_by != username {
                return Err(EngineError::Forbidden(
                    "only the proposer can cancel a vote".to_string(),
                ));
            }
            if !self
                .decide_vote(&db_tx, vote_id, VoteStatus::Cancelled, Utc::now())
                .await?
            {
                return Err(EngineError::InvalidState(format!(
                    "vote is {}",
                    vote.status.as_str()
                )));
            }
            outbox.publish(
                group_topic(&vote.group_id),
                result_event(&vote, VoteStatus::Cancelled),
            );
            Ok(())
        })?;
        self.dispatch(outbox).await;
        Ok(())
    }

    /// Moves overdue pending votes to `expired`. Returns how many expired.
    pub async fn expire_votes(&self, now: DateTime<Utc>) -> ResultEngine<u64> {
        let expired = with_tx!(self, |db_tx| {
            let res = votes::Entity::update_many()
                .col_expr(votes::Column::Status, Expr::value(VoteStatus::Expired.as_str()))
                .col_expr(votes::Column::DecidedAt, Expr::value(now))
                .filter(votes::Column::Status.eq(VoteStatus::Pending.as_str()))
                .filter(votes::Column::ExpiresAt.lt(now))
                .exec(&db_tx)
                .await?;
            Ok(res.rows_affected)
        })?;
        if expired > 0 {
            tracing::info!(expired, "votes expired");
        }
        Ok(expired)
    }

    /// Vote with ballots and tally. Group members only.
    pub async fn vote(&self, vote_id: &str, username: &str) -> ResultEngine<VoteDetail> {
        with_tx!(self, |db_tx| {
            let vote = self.require_vote(&db_tx, vote_id).await?;
            let group = self.require_group(&db_tx, &vote.group_id).await?;
            self.require_member(&db_tx, &vote.group_id, username)
                .await?;
            let ballots = vote_ballots::Entity::find()
                .filter(vote_ballots::Column::VoteId.eq(vote_id.to_string()))
                .order_by_asc(vote_ballots::Column::Username)
                .all(&db_tx)
                .await?
                .into_iter()
                .map(Ballot::try_from)
                .collect::<ResultEngine<Vec<_>>>()?;
            let tally = Tally::from_ballots(ballots.iter().map(|b| &b.decision));
            Ok(VoteDetail {
                approvals_needed: group.approvals_needed(vote.votes_required),
                vote,
                ballots,
                tally,
            })
        })
    }

    /// Votes of a group, newest first. Group members only.
    pub async fn list_votes(
        &self,
        group_id: &str,
        status: Option<VoteStatus>,
        username: &str,
    ) -> ResultEngine<Vec<InvestmentVote>> {
        with_tx!(self, |db_tx| {
            self.require_group(&db_tx, group_id).await?;
            self.require_member(&db_tx, group_id, username).await?;
            let mut query = votes::Entity::find()
                .filter(votes::Column::GroupId.eq(group_id.to_string()))
                .order_by_desc(votes::Column::CreatedAt);
            if let Some(status) = status {
                query = query.filter(votes::Column::Status.eq(status.as_str()));
            }
            query
                .all(&db_tx)
                .await?
                .into_iter()
                .map(InvestmentVote::try_from)
                .collect::<ResultEngine<Vec<_>>>()
        })
    }

    pub(super) async fn require_vote(
        &self,
        db: &DatabaseTransaction,
        vote_id: &str,
    ) -> ResultEngine<InvestmentVote> {
        votes::Entity::find_by_id(vote_id.to_string())
            .one(db)
            .await?
            .ok_or_else(|| EngineError::KeyNotFound("vote not exists".to_string()))?
            .try_into()
    }

    /// Decides the vote once every ballot that can still be cast is in.
    ///
    /// An outstanding ballot whose holder is no longer an active member can
    /// never be cast, so it leaves the quorum; ballots already cast stay
    /// counted.
    pub(super) async fn complete_if_decided(
        &self,
        db: &DatabaseTransaction,
        outbox: &mut Outbox,
        vote: &InvestmentVote,
        group: &Group,
    ) -> ResultEngine<VoteStatus> {
        let vote_id = vote.id.to_string();
        let ballots = vote_ballots::Entity::find()
            .filter(vote_ballots::Column::VoteId.eq(vote_id.clone()))
            .all(db)
            .await?;
        let active: HashSet<String> = self
            .active_members(db, &vote.group_id)
            .await?
            .into_iter()
            .map(|m| m.username)
            .collect();

        let electorate = ballots
            .iter()
            .filter(|b| b.decision.is_some() || active.contains(&b.username))
            .count();
        let cast = ballots.iter().filter(|b| b.decision.is_some()).count();
        if cast < electorate {
            return Ok(VoteStatus::Pending);
        }

        let yes = ballots
            .iter()
            .filter(|b| b.decision.as_deref() == Some(Decision::Yes.as_str()))
            .count();
        let electorate = u32::try_from(electorate)
            .map_err(|_| EngineError::Validation("group too large".to_string()))?;
        let needed = approvals_needed(electorate, group.vote_threshold_pct);
        let outcome = if yes >= needed as usize {
            VoteStatus::Approved
        } else {
            VoteStatus::Rejected
        };

        if !self.decide_vote(db, &vote_id, outcome, Utc::now()).await? {
            // Someone else decided it first.
            let current = self.require_vote(db, &vote_id).await?;
            return Ok(current.status);
        }

        tracing::info!(
            %vote_id,
            yes,
            needed,
            electorate,
            status = outcome.as_str(),
            "vote decided"
        );
        for ballot in ballots {
            outbox
                .notify(
                    db,
                    Notification::new(
                        &ballot.username,
                        NotificationKind::VoteResult,
                        "Vote result",
                        format!(
                            "The proposal to {} {} was {}",
                            vote.action.as_str(),
                            vote.symbol,
                            outcome.as_str()
                        ),
                        serde_json::json!({ "vote_id": vote_id, "status": outcome.as_str() }),
                    ),
                )
                .await?;
        }
        outbox.publish(group_topic(&vote.group_id), result_event(vote, outcome));
        if outcome == VoteStatus::Approved {
            outbox.enqueue(Job::ExecuteTrade {
                vote_id: vote_id.clone(),
            });
        }
        Ok(outcome)
    }

    /// Conditional `pending -> status`. Returns whether this call won.
    async fn decide_vote(
        &self,
        db: &DatabaseTransaction,
        vote_id: &str,
        status: VoteStatus,
        at: DateTime<Utc>,
    ) -> ResultEngine<bool> {
        let res = votes::Entity::update_many()
            .col_expr(votes::Column::Status, Expr::value(status.as_str()))
            .col_expr(votes::Column::DecidedAt, Expr::value(at))
            .filter(votes::Column::Id.eq(vote_id.to_string()))
            .filter(votes::Column::Status.eq(VoteStatus::Pending.as_str()))
            .exec(db)
            .await?;
        Ok(res.rows_affected == 1)
    }
}

fn new_vote_event(vote: &InvestmentVote) -> Event {
    Event::NewVote {
        vote_id: vote.id.to_string(),
        group_id: vote.group_id.clone(),
        proposed_by: vote.proposed_by.clone(),
        action: vote.action.as_str().to_string(),
        symbol: vote.symbol.clone(),
        amount_minor: vote.amount_minor,
    }
}

fn result_event(vote: &InvestmentVote, status: VoteStatus) -> Event {
    Event::VoteResult {
        vote_id: vote.id.to_string(),
        group_id: vote.group_id.clone(),
        status: status.as_str().to_string(),
    }
}

//! Investment proposals and their ballots.
//!
//! The quorum is fixed when the proposal is made: one ballot row is created
//! per active member and `votes_required` records that count. Members who
//! join later hold no ballot and cannot vote on it.

use chrono::{DateTime, Utc};
use sea_orm::{ActiveValue, entity::prelude::*};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{EngineError, util::parse_uuid};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeAction {
    Buy,
    Sell,
    Hold,
    Rebalance,
}

impl TradeAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Buy => "buy",
            Self::Sell => "sell",
            Self::Hold => "hold",
            Self::Rebalance => "rebalance",
        }
    }
}

impl TryFrom<&str> for TradeAction {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "buy" => Ok(Self::Buy),
            "sell" => Ok(Self::Sell),
            "hold" => Ok(Self::Hold),
            "rebalance" => Ok(Self::Rebalance),
            other => Err(EngineError::Validation(format!(
                "invalid trade action: {other}"
            ))),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoteStatus {
    Pending,
    Approved,
    Rejected,
    Executed,
    Expired,
    Cancelled,
}

impl VoteStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Executed => "executed",
            Self::Expired => "expired",
            Self::Cancelled => "cancelled",
        }
    }
}

impl TryFrom<&str> for VoteStatus {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            "executed" => Ok(Self::Executed),
            "expired" => Ok(Self::Expired),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(EngineError::Validation(format!(
                "invalid vote status: {other}"
            ))),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Yes,
    No,
    Abstain,
}

impl Decision {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Yes => "yes",
            Self::No => "no",
            Self::Abstain => "abstain",
        }
    }
}

impl TryFrom<&str> for Decision {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "yes" => Ok(Self::Yes),
            "no" => Ok(Self::No),
            "abstain" => Ok(Self::Abstain),
            other => Err(EngineError::Validation(format!("invalid decision: {other}"))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvestmentVote {
    pub id: Uuid,
    pub group_id: String,
    pub proposed_by: String,
    pub action: TradeAction,
    pub symbol: String,
    pub amount_minor: i64,
    pub shares_micros: i64,
    pub reasoning: Option<String>,
    pub votes_required: u32,
    pub status: VoteStatus,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub decided_at: Option<DateTime<Utc>>,
    pub executed_at: Option<DateTime<Utc>>,
    /// Why the last execution attempt of an approved vote failed.
    pub execution_error: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tally {
    pub yes: u32,
    pub no: u32,
    pub abstain: u32,
    pub outstanding: u32,
}

impl Tally {
    pub fn cast(&self) -> u32 {
        self.yes + self.no + self.abstain
    }

    pub fn from_ballots<'a>(ballots: impl IntoIterator<Item = &'a Option<Decision>>) -> Self {
        ballots
            .into_iter()
            .fold(Self::default(), |mut tally, ballot| {
                match ballot {
                    Some(Decision::Yes) => tally.yes += 1,
                    Some(Decision::No) => tally.no += 1,
                    Some(Decision::Abstain) => tally.abstain += 1,
                    None => tally.outstanding += 1,
                }
                tally
            })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ballot {
    pub username: String,
    pub decision: Option<Decision>,
    pub cast_at: Option<DateTime<Utc>>,
}

/// A vote with its ballots and current tally.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteDetail {
    pub vote: InvestmentVote,
    pub ballots: Vec<Ballot>,
    pub tally: Tally,
    pub approvals_needed: u32,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "investment_votes")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub group_id: String,
    pub proposed_by: String,
    pub action: String,
    pub symbol: String,
    pub amount_minor: i64,
    pub shares_micros: i64,
    pub reasoning: Option<String>,
    pub votes_required: i32,
    pub status: String,
    pub expires_at: DateTimeUtc,
    pub created_at: DateTimeUtc,
    pub decided_at: Option<DateTimeUtc>,
    pub executed_at: Option<DateTimeUtc>,
    pub execution_error: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::vote_ballots::Entity")]
    Ballots,
}

impl Related<super::vote_ballots::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Ballots.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl From<&InvestmentVote> for ActiveModel {
    fn from(vote: &InvestmentVote) -> Self {
        Self {
            id: ActiveValue::Set(vote.id.to_string()),
            group_id: ActiveValue::Set(vote.group_id.clone()),
            proposed_by: ActiveValue::Set(vote.proposed_by.clone()),
            action: ActiveValue::Set(vote.action.as_str().to_string()),
            symbol: ActiveValue::Set(vote.symbol.clone()),
            amount_minor: ActiveValue::Set(vote.amount_minor),
            shares_micros: ActiveValue::Set(vote.shares_micros),
            reasoning: ActiveValue::Set(vote.reasoning.clone()),
            votes_required: ActiveValue::Set(
                i32::try_from(vote.votes_required).unwrap_or(i32::MAX),
            ),
            status: ActiveValue::Set(vote.status.as_str().to_string()),
            expires_at: ActiveValue::Set(vote.expires_at),
            created_at: ActiveValue::Set(vote.created_at),
            decided_at: ActiveValue::Set(vote.decided_at),
            executed_at: ActiveValue::Set(vote.executed_at),
            execution_error: ActiveValue::Set(vote.execution_error.clone()),
        }
    }
}

impl TryFrom<Model> for InvestmentVote {
    type Error = EngineError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        Ok(Self {
            id: parse_uuid(&model.id, "vote")?,
            group_id: model.group_id,
            proposed_by: model.proposed_by,
            action: TradeAction::try_from(model.action.as_str())?,
            symbol: model.symbol,
            amount_minor: model.amount_minor,
            shares_micros: model.shares_micros,
            reasoning: model.reasoning,
            votes_required: u32::try_from(model.votes_required)
                .map_err(|_| EngineError::Validation("invalid stored quorum".to_string()))?,
            status: VoteStatus::try_from(model.status.as_str())?,
            expires_at: model.expires_at,
            created_at: model.created_at,
            decided_at: model.decided_at,
            executed_at: model.executed_at,
            execution_error: model.execution_error,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tally_counts_outstanding_ballots() {
        let ballots = vec![
            Some(Decision::Yes),
            Some(Decision::No),
            None,
            Some(Decision::Yes),
            Some(Decision::Abstain),
        ];
        let tally = Tally::from_ballots(&ballots);
        assert_eq!(tally.yes, 2);
        assert_eq!(tally.no, 1);
        assert_eq!(tally.abstain, 1);
        assert_eq!(tally.outstanding, 1);
        assert_eq!(tally.cast(), 4);
    }

    #[test]
    fn unknown_action_is_rejected() {
        assert_eq!(TradeAction::try_from("rebalance").unwrap(), TradeAction::Rebalance);
        assert!(TradeAction::try_from("short").is_err());
    }
}

//! A `Group` is a set of users sharing bills and, optionally, a pooled
//! investment portfolio.

use chrono::{DateTime, Utc};
use sea_orm::{ActiveValue, entity::prelude::*};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Currency, EngineError, ResultEngine, util::parse_uuid};

pub const DEFAULT_VOTE_THRESHOLD_PCT: u8 = 60;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupKind {
    #[default]
    Friends,
    Family,
    Roommates,
    Colleagues,
    InvestmentClub,
    Custom,
}

impl GroupKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Friends => "friends",
            Self::Family => "family",
            Self::Roommates => "roommates",
            Self::Colleagues => "colleagues",
            Self::InvestmentClub => "investment_club",
            Self::Custom => "custom",
        }
    }
}

impl TryFrom<&str> for GroupKind {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "friends" => Ok(Self::Friends),
            "family" => Ok(Self::Family),
            "roommates" => Ok(Self::Roommates),
            "colleagues" => Ok(Self::Colleagues),
            "investment_club" => Ok(Self::InvestmentClub),
            "custom" => Ok(Self::Custom),
            other => Err(EngineError::Validation(format!(
                "invalid group kind: {other}"
            ))),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvestmentStrategy {
    Conservative,
    #[default]
    Moderate,
    Aggressive,
    Custom,
}

impl InvestmentStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Conservative => "conservative",
            Self::Moderate => "moderate",
            Self::Aggressive => "aggressive",
            Self::Custom => "custom",
        }
    }
}

impl TryFrom<&str> for InvestmentStrategy {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "conservative" => Ok(Self::Conservative),
            "moderate" => Ok(Self::Moderate),
            "aggressive" => Ok(Self::Aggressive),
            "custom" => Ok(Self::Custom),
            other => Err(EngineError::Validation(format!(
                "invalid investment strategy: {other}"
            ))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub kind: GroupKind,
    pub strategy: InvestmentStrategy,
    pub vote_threshold_pct: u8,
    pub currency: Currency,
    pub created_by: String,
    pub total_split_minor: i64,
    pub total_invested_minor: i64,
    pub created_at: DateTime<Utc>,
}

impl Group {
    pub fn new(
        name: String,
        description: Option<String>,
        kind: GroupKind,
        strategy: InvestmentStrategy,
        vote_threshold_pct: Option<u8>,
        created_by: &str,
    ) -> ResultEngine<Self> {
        let vote_threshold_pct = vote_threshold_pct.unwrap_or(DEFAULT_VOTE_THRESHOLD_PCT);
        validate_threshold(vote_threshold_pct)?;
        Ok(Self {
            id: Uuid::new_v4(),
            name,
            description,
            kind,
            strategy,
            vote_threshold_pct,
            currency: Currency::default(),
            created_by: created_by.to_string(),
            total_split_minor: 0,
            total_invested_minor: 0,
            created_at: Utc::now(),
        })
    }

    /// Minimum `yes` ballots needed out of `votes_required`.
    pub fn approvals_needed(&self, votes_required: u32) -> u32 {
        approvals_needed(votes_required, self.vote_threshold_pct)
    }
}

/// `ceil(votes_required * pct / 100)`.
pub fn approvals_needed(votes_required: u32, pct: u8) -> u32 {
    (votes_required * u32::from(pct)).div_ceil(100)
}

pub(crate) fn validate_threshold(pct: u8) -> ResultEngine<()> {
    if pct == 0 || pct > 100 {
        return Err(EngineError::Validation(
            "vote threshold must be within 1..=100".to_string(),
        ));
    }
    Ok(())
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "groups")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub kind: String,
    pub strategy: String,
    pub vote_threshold_pct: i32,
    pub currency: String,
    pub created_by: String,
    pub total_split_minor: i64,
    pub total_invested_minor: i64,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::group_members::Entity")]
    Members,
    #[sea_orm(has_many = "super::bills::Entity")]
    Bills,
}

impl Related<super::group_members::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Members.def()
    }
}

impl Related<super::bills::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Bills.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl From<&Group> for ActiveModel {
    fn from(group: &Group) -> Self {
        Self {
            id: ActiveValue::Set(group.id.to_string()),
            name: ActiveValue::Set(group.name.clone()),
            description: ActiveValue::Set(group.description.clone()),
            kind: ActiveValue::Set(group.kind.as_str().to_string()),
            strategy: ActiveValue::Set(group.strategy.as_str().to_string()),
            vote_threshold_pct: ActiveValue::Set(i32::from(group.vote_threshold_pct)),
            currency: ActiveValue::Set(group.currency.code().to_string()),
            created_by: ActiveValue::Set(group.created_by.clone()),
            total_split_minor: ActiveValue::Set(group.total_split_minor),
            total_invested_minor: ActiveValue::Set(group.total_invested_minor),
            created_at: ActiveValue::Set(group.created_at),
        }
    }
}

impl TryFrom<Model> for Group {
    type Error = EngineError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        Ok(Self {
            id: parse_uuid(&model.id, "group")?,
            name: model.name,
            description: model.description,
            kind: GroupKind::try_from(model.kind.as_str())?,
            strategy: InvestmentStrategy::try_from(model.strategy.as_str())?,
            vote_threshold_pct: u8::try_from(model.vote_threshold_pct)
                .map_err(|_| EngineError::Validation("invalid stored threshold".to_string()))?,
            currency: Currency::try_from(model.currency.as_str())?,
            created_by: model.created_by,
            total_split_minor: model.total_split_minor,
            total_invested_minor: model.total_invested_minor,
            created_at: model.created_at,
        })
    }
}

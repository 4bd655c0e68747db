//! In-app notifications.

use chrono::{DateTime, Utc};
use sea_orm::{ActiveValue, entity::prelude::*};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{EngineError, util::parse_uuid};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    GroupInvite,
    BillCreated,
    PaymentSuccess,
    PaymentFailed,
    InvestmentVote,
    VoteResult,
    TradeExecuted,
    TradeFailed,
}

impl NotificationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::GroupInvite => "group_invite",
            Self::BillCreated => "bill_created",
            Self::PaymentSuccess => "payment_success",
            Self::PaymentFailed => "payment_failed",
            Self::InvestmentVote => "investment_vote",
            Self::VoteResult => "vote_result",
            Self::TradeExecuted => "trade_executed",
            Self::TradeFailed => "trade_failed",
        }
    }
}

impl TryFrom<&str> for NotificationKind {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "group_invite" => Ok(Self::GroupInvite),
            "bill_created" => Ok(Self::BillCreated),
            "payment_success" => Ok(Self::PaymentSuccess),
            "payment_failed" => Ok(Self::PaymentFailed),
            "investment_vote" => Ok(Self::InvestmentVote),
            "vote_result" => Ok(Self::VoteResult),
            "trade_executed" => Ok(Self::TradeExecuted),
            "trade_failed" => Ok(Self::TradeFailed),
            other => Err(EngineError::Validation(format!(
                "invalid notification kind: {other}"
            ))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub username: String,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub data: serde_json::Value,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(
        username: &str,
        kind: NotificationKind,
        title: impl Into<String>,
        message: impl Into<String>,
        data: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            username: username.to_string(),
            kind,
            title: title.into(),
            message: message.into(),
            data,
            read: false,
            created_at: Utc::now(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "notifications")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub username: String,
    pub kind: String,
    pub title: String,
    pub message: String,
    pub data: Json,
    pub read: bool,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl From<&Notification> for ActiveModel {
    fn from(n: &Notification) -> Self {
        Self {
            id: ActiveValue::Set(n.id.to_string()),
            username: ActiveValue::Set(n.username.clone()),
            kind: ActiveValue::Set(n.kind.as_str().to_string()),
            title: ActiveValue::Set(n.title.clone()),
            message: ActiveValue::Set(n.message.clone()),
            data: ActiveValue::Set(n.data.clone()),
            read: ActiveValue::Set(n.read),
            created_at: ActiveValue::Set(n.created_at),
        }
    }
}

impl TryFrom<Model> for Notification {
    type Error = EngineError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        Ok(Self {
            id: parse_uuid(&model.id, "notification")?,
            kind: NotificationKind::try_from(model.kind.as_str())?,
            username: model.username,
            title: model.title,
            message: model.message,
            data: model.data,
            read: model.read,
            created_at: model.created_at,
        })
    }
}

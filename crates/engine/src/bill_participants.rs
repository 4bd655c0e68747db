//! Per-participant obligations of a bill.
//!
//! `owed_minor` is fixed when the bill is created; only the settlement
//! workflow moves `status`.

use chrono::{DateTime, Utc};
use sea_orm::{ActiveValue, entity::prelude::*};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{EngineError, split::Obligation, util::parse_uuid};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticipantStatus {
    Pending,
    Accepted,
    Declined,
    Paid,
    Failed,
    Refunded,
}

impl ParticipantStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Declined => "declined",
            Self::Paid => "paid",
            Self::Failed => "failed",
            Self::Refunded => "refunded",
        }
    }

    /// States from which a charge may still be attempted.
    pub fn is_chargeable(self) -> bool {
        matches!(self, Self::Pending | Self::Accepted | Self::Failed)
    }
}

impl TryFrom<&str> for ParticipantStatus {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "pending" => Ok(Self::Pending),
            "accepted" => Ok(Self::Accepted),
            "declined" => Ok(Self::Declined),
            "paid" => Ok(Self::Paid),
            "failed" => Ok(Self::Failed),
            "refunded" => Ok(Self::Refunded),
            other => Err(EngineError::Validation(format!(
                "invalid participant status: {other}"
            ))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillParticipant {
    pub id: Uuid,
    pub bill_id: String,
    pub username: String,
    pub item_ids: Vec<u32>,
    pub owed_minor: i64,
    pub paid_minor: i64,
    pub status: ParticipantStatus,
    pub charge_ref: Option<String>,
    pub failure_reason: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "bill_participants")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub bill_id: String,
    pub username: String,
    pub owed_minor: i64,
    pub paid_minor: i64,
    pub status: String,
    pub charge_ref: Option<String>,
    pub failure_reason: Option<String>,
    pub paid_at: Option<DateTimeUtc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::bills::Entity",
        from = "Column::BillId",
        to = "super::bills::Column::Id",
        on_update = "NoAction",
        on_delete = "Cascade"
    )]
    Bills,
}

impl Related<super::bills::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Bills.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl ActiveModel {
    pub(crate) fn pending(bill_id: &str, obligation: &Obligation) -> Self {
        Self {
            id: ActiveValue::Set(Uuid::new_v4().to_string()),
            bill_id: ActiveValue::Set(bill_id.to_string()),
            username: ActiveValue::Set(obligation.participant.clone()),
            owed_minor: ActiveValue::Set(obligation.owed_minor),
            paid_minor: ActiveValue::Set(0),
            status: ActiveValue::Set(ParticipantStatus::Pending.as_str().to_string()),
            charge_ref: ActiveValue::Set(None),
            failure_reason: ActiveValue::Set(None),
            paid_at: ActiveValue::Set(None),
        }
    }
}

impl BillParticipant {
    /// Converts a stored row; item ids are filled in from `bill_items`.
    pub(crate) fn from_model(model: Model, item_ids: Vec<u32>) -> Result<Self, EngineError> {
        Ok(Self {
            id: parse_uuid(&model.id, "participant")?,
            status: ParticipantStatus::try_from(model.status.as_str())?,
            bill_id: model.bill_id,
            username: model.username,
            item_ids,
            owed_minor: model.owed_minor,
            paid_minor: model.paid_minor,
            charge_ref: model.charge_ref,
            failure_reason: model.failure_reason,
            paid_at: model.paid_at,
        })
    }
}

//! Shared bills.
//!
//! A bill moves `draft -> pending -> processing -> completed | failed` and can
//! be cancelled from any non-terminal state. Totals are fixed at creation.

use chrono::{DateTime, Utc};
use sea_orm::{ActiveValue, entity::prelude::*};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    Currency, EngineError, bill_items::BillItem, bill_participants::BillParticipant,
    bill_participants::ParticipantStatus, util::parse_uuid,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillStatus {
    Draft,
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl BillStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

impl TryFrom<&str> for BillStatus {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "draft" => Ok(Self::Draft),
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(EngineError::Validation(format!(
                "invalid bill status: {other}"
            ))),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReceiptSource {
    #[default]
    Manual,
    Scanned,
}

impl ReceiptSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::Scanned => "scanned",
        }
    }
}

impl TryFrom<&str> for ReceiptSource {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "manual" => Ok(Self::Manual),
            "scanned" => Ok(Self::Scanned),
            other => Err(EngineError::Validation(format!(
                "invalid receipt source: {other}"
            ))),
        }
    }
}

/// Collection state of a bill, combining its status with the participants'.
///
/// A `completed` bill only means the settlement pass ran; money may still be
/// outstanding.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SettlementSummary {
    NotStarted,
    Outstanding {
        participants: Vec<String>,
        amount_minor: i64,
    },
    Settled,
}

impl SettlementSummary {
    pub fn from_parts(status: BillStatus, participants: &[BillParticipant]) -> Self {
        if matches!(
            status,
            BillStatus::Draft | BillStatus::Pending | BillStatus::Cancelled
        ) {
            return Self::NotStarted;
        }
        let unpaid: Vec<&BillParticipant> = participants
            .iter()
            .filter(|p| {
                p.owed_minor > 0
                    && !matches!(
                        p.status,
                        ParticipantStatus::Paid | ParticipantStatus::Refunded
                    )
            })
            .collect();
        if unpaid.is_empty() {
            return Self::Settled;
        }
        Self::Outstanding {
            participants: unpaid.iter().map(|p| p.username.clone()).collect(),
            amount_minor: unpaid.iter().map(|p| p.owed_minor - p.paid_minor).sum(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bill {
    pub id: Uuid,
    pub group_id: String,
    pub created_by: String,
    pub merchant: Option<String>,
    pub subtotal_minor: i64,
    pub tax_minor: i64,
    pub tip_minor: i64,
    pub total_minor: i64,
    pub currency: Currency,
    pub receipt_source: ReceiptSource,
    pub status: BillStatus,
    pub created_at: DateTime<Utc>,
    pub settled_at: Option<DateTime<Utc>>,
}

/// A bill with its items, participants and settlement summary.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillDetail {
    pub bill: Bill,
    pub items: Vec<BillItem>,
    pub participants: Vec<BillParticipant>,
    pub settlement: SettlementSummary,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "bills")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub group_id: String,
    pub created_by: String,
    pub merchant: Option<String>,
    pub subtotal_minor: i64,
    pub tax_minor: i64,
    pub tip_minor: i64,
    pub total_minor: i64,
    pub currency: String,
    pub receipt_source: String,
    pub status: String,
    pub created_at: DateTimeUtc,
    pub settled_at: Option<DateTimeUtc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::groups::Entity",
        from = "Column::GroupId",
        to = "super::groups::Column::Id",
        on_update = "NoAction",
        on_delete = "Cascade"
    )]
    Groups,
    #[sea_orm(has_many = "super::bill_items::Entity")]
    Items,
    #[sea_orm(has_many = "super::bill_participants::Entity")]
    Participants,
}

impl Related<super::groups::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Groups.def()
    }
}

impl Related<super::bill_items::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Items.def()
    }
}

impl Related<super::bill_participants::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Participants.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl From<&Bill> for ActiveModel {
    fn from(bill: &Bill) -> Self {
        Self {
            id: ActiveValue::Set(bill.id.to_string()),
            group_id: ActiveValue::Set(bill.group_id.clone()),
            created_by: ActiveValue::Set(bill.created_by.clone()),
            merchant: ActiveValue::Set(bill.merchant.clone()),
            subtotal_minor: ActiveValue::Set(bill.subtotal_minor),
            tax_minor: ActiveValue::Set(bill.tax_minor),
            tip_minor: ActiveValue::Set(bill.tip_minor),
            total_minor: ActiveValue::Set(bill.total_minor),
            currency: ActiveValue::Set(bill.currency.code().to_string()),
            receipt_source: ActiveValue::Set(bill.receipt_source.as_str().to_string()),
            status: ActiveValue::Set(bill.status.as_str().to_string()),
            created_at: ActiveValue::Set(bill.created_at),
            settled_at: ActiveValue::Set(bill.settled_at),
        }
    }
}

impl TryFrom<Model> for Bill {
    type Error = EngineError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        Ok(Self {
            id: parse_uuid(&model.id, "bill")?,
            group_id: model.group_id,
            created_by: model.created_by,
            merchant: model.merchant,
            subtotal_minor: model.subtotal_minor,
            tax_minor: model.tax_minor,
            tip_minor: model.tip_minor,
            total_minor: model.total_minor,
            currency: Currency::try_from(model.currency.as_str())?,
            receipt_source: ReceiptSource::try_from(model.receipt_source.as_str())?,
            status: BillStatus::try_from(model.status.as_str())?,
            created_at: model.created_at,
            settled_at: model.settled_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn participant(username: &str, owed: i64, status: ParticipantStatus) -> BillParticipant {
        BillParticipant {
            id: Uuid::new_v4(),
            bill_id: "bill".to_string(),
            username: username.to_string(),
            item_ids: Vec::new(),
            owed_minor: owed,
            paid_minor: if status == ParticipantStatus::Paid { owed } else { 0 },
            status,
            charge_ref: None,
            failure_reason: None,
            paid_at: None,
        }
    }

    #[test]
    fn summary_before_settlement_is_not_started() {
        let parts = vec![participant("alice", 10_00, ParticipantStatus::Pending)];
        assert_eq!(
            SettlementSummary::from_parts(BillStatus::Pending, &parts),
            SettlementSummary::NotStarted
        );
    }

    #[test]
    fn summary_lists_outstanding_participants() {
        let parts = vec![
            participant("alice", 10_00, ParticipantStatus::Paid),
            participant("bob", 7_50, ParticipantStatus::Pending),
            participant("carol", 2_25, ParticipantStatus::Failed),
        ];
        assert_eq!(
            SettlementSummary::from_parts(BillStatus::Completed, &parts),
            SettlementSummary::Outstanding {
                participants: vec!["bob".to_string(), "carol".to_string()],
                amount_minor: 9_75,
            }
        );
    }

    #[test]
    fn summary_ignores_zero_obligations() {
        let parts = vec![
            participant("alice", 10_00, ParticipantStatus::Paid),
            participant("bob", 0, ParticipantStatus::Pending),
        ];
        assert_eq!(
            SettlementSummary::from_parts(BillStatus::Completed, &parts),
            SettlementSummary::Settled
        );
    }
}

//! Single-use virtual cards that pay a bill at the merchant.
//!
//! A card is `active` until its first approved authorization (`used`) or
//! until `expires_at` passes. The spending limit is the bill total.

use chrono::{DateTime, Duration, Utc};
use sea_orm::{ActiveValue, entity::prelude::*};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Currency, EngineError, gateways::IssuedCard, util::parse_uuid};

pub const CARD_TTL_MINUTES: i64 = 60;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CardStatus {
    Active,
    Used,
    Expired,
    Cancelled,
}

impl CardStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Used => "used",
            Self::Expired => "expired",
            Self::Cancelled => "cancelled",
        }
    }
}

impl TryFrom<&str> for CardStatus {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "active" => Ok(Self::Active),
            "used" => Ok(Self::Used),
            "expired" => Ok(Self::Expired),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(EngineError::Validation(format!(
                "invalid card status: {other}"
            ))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VirtualCard {
    pub id: Uuid,
    pub group_id: String,
    pub bill_id: String,
    pub username: String,
    /// Issuer reference; `None` for a stub card.
    pub card_ref: Option<String>,
    pub last4: String,
    pub brand: String,
    pub spending_limit_minor: i64,
    pub spent_minor: i64,
    pub currency: Currency,
    pub status: CardStatus,
    pub expires_at: DateTime<Utc>,
    pub used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl VirtualCard {
    pub fn new(
        group_id: &str,
        bill_id: &str,
        username: &str,
        issued: IssuedCard,
        spending_limit_minor: i64,
        currency: Currency,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            group_id: group_id.to_string(),
            bill_id: bill_id.to_string(),
            username: username.to_string(),
            card_ref: issued.reference,
            last4: issued.last4,
            brand: issued.brand,
            spending_limit_minor,
            spent_minor: 0,
            currency,
            status: CardStatus::Active,
            expires_at: now + Duration::minutes(CARD_TTL_MINUTES),
            used_at: None,
            created_at: now,
        }
    }

    /// Whether an authorization of `amount_minor` may go through at `now`.
    pub fn accepts(&self, amount_minor: i64, now: DateTime<Utc>) -> bool {
        self.status == CardStatus::Active
            && now <= self.expires_at
            && amount_minor > 0
            && amount_minor <= self.spending_limit_minor
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "virtual_cards")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub group_id: String,
    pub bill_id: String,
    pub username: String,
    #[sea_orm(unique)]
    pub card_ref: Option<String>,
    pub last4: String,
    pub brand: String,
    pub spending_limit_minor: i64,
    pub spent_minor: i64,
    pub currency: String,
    pub status: String,
    pub expires_at: DateTimeUtc,
    pub used_at: Option<DateTimeUtc>,
    pub created_at: DateTimeUtc,
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

impl From<&VirtualCard> for ActiveModel {
    fn from(card: &VirtualCard) -> Self {
        Self {
            id: ActiveValue::Set(card.id.to_string()),
            group_id: ActiveValue::Set(card.group_id.clone()),
            bill_id: ActiveValue::Set(card.bill_id.clone()),
            username: ActiveValue::Set(card.username.clone()),
            card_ref: ActiveValue::Set(card.card_ref.clone()),
            last4: ActiveValue::Set(card.last4.clone()),
            brand: ActiveValue::Set(card.brand.clone()),
            spending_limit_minor: ActiveValue::Set(card.spending_limit_minor),
            spent_minor: ActiveValue::Set(card.spent_minor),
            currency: ActiveValue::Set(card.currency.code().to_string()),
            status: ActiveValue::Set(card.status.as_str().to_string()),
            expires_at: ActiveValue::Set(card.expires_at),
            used_at: ActiveValue::Set(card.used_at),
            created_at: ActiveValue::Set(card.created_at),
        }
    }
}

impl TryFrom<Model> for VirtualCard {
    type Error = EngineError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        Ok(Self {
            id: parse_uuid(&model.id, "card")?,
            currency: Currency::try_from(model.currency.as_str())?,
            status: CardStatus::try_from(model.status.as_str())?,
            group_id: model.group_id,
            bill_id: model.bill_id,
            username: model.username,
            card_ref: model.card_ref,
            last4: model.last4,
            brand: model.brand,
            spending_limit_minor: model.spending_limit_minor,
            spent_minor: model.spent_minor,
            expires_at: model.expires_at,
            used_at: model.used_at,
            created_at: model.created_at,
        })
    }
}

//! Positions held by a group. Rows are appended by trade execution only; a
//! sell appends a row with negative shares.

use chrono::{DateTime, Utc};
use sea_orm::{ActiveValue, entity::prelude::*};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{EngineError, Shares, util::parse_uuid};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Investment {
    pub id: Uuid,
    pub group_id: String,
    pub vote_id: String,
    pub symbol: String,
    pub name: String,
    pub shares_micros: i64,
    /// Cents per whole share.
    pub avg_cost_minor: i64,
    pub current_price_minor: i64,
    pub created_at: DateTime<Utc>,
}

impl Investment {
    /// Builds a position from an executed trade. The average cost is derived
    /// from the traded amount; without shares it stays zero.
    pub fn from_trade(
        group_id: &str,
        vote_id: &str,
        symbol: &str,
        amount_minor: i64,
        shares_micros: i64,
    ) -> Self {
        let avg_cost_minor = if shares_micros == 0 {
            0
        } else {
            let cost = i128::from(amount_minor) * i128::from(Shares::SCALE)
                / i128::from(shares_micros.abs());
            i64::try_from(cost).unwrap_or(i64::MAX)
        };
        Self {
            id: Uuid::new_v4(),
            group_id: group_id.to_string(),
            vote_id: vote_id.to_string(),
            symbol: symbol.to_string(),
            name: symbol.to_string(),
            shares_micros,
            avg_cost_minor,
            current_price_minor: avg_cost_minor,
            created_at: Utc::now(),
        }
    }

    /// Market value at `current_price_minor`, in cents.
    pub fn total_value_minor(&self) -> i64 {
        scale_by_shares(self.current_price_minor, self.shares_micros)
    }

    pub fn cost_basis_minor(&self) -> i64 {
        scale_by_shares(self.avg_cost_minor, self.shares_micros)
    }

    pub fn total_return_minor(&self) -> i64 {
        self.total_value_minor() - self.cost_basis_minor()
    }
}

fn scale_by_shares(price_minor: i64, shares_micros: i64) -> i64 {
    let value = i128::from(price_minor) * i128::from(shares_micros) / i128::from(Shares::SCALE);
    i64::try_from(value).unwrap_or(if value < 0 { i64::MIN } else { i64::MAX })
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "investments")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub group_id: String,
    #[sea_orm(unique)]
    pub vote_id: String,
    pub symbol: String,
    pub name: String,
    pub shares_micros: i64,
    pub avg_cost_minor: i64,
    pub current_price_minor: i64,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl From<&Investment> for ActiveModel {
    fn from(investment: &Investment) -> Self {
        Self {
            id: ActiveValue::Set(investment.id.to_string()),
            group_id: ActiveValue::Set(investment.group_id.clone()),
            vote_id: ActiveValue::Set(investment.vote_id.clone()),
            symbol: ActiveValue::Set(investment.symbol.clone()),
            name: ActiveValue::Set(investment.name.clone()),
            shares_micros: ActiveValue::Set(investment.shares_micros),
            avg_cost_minor: ActiveValue::Set(investment.avg_cost_minor),
            current_price_minor: ActiveValue::Set(investment.current_price_minor),
            created_at: ActiveValue::Set(investment.created_at),
        }
    }
}

impl TryFrom<Model> for Investment {
    type Error = EngineError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        Ok(Self {
            id: parse_uuid(&model.id, "investment")?,
            group_id: model.group_id,
            vote_id: model.vote_id,
            symbol: model.symbol,
            name: model.name,
            shares_micros: model.shares_micros,
            avg_cost_minor: model.avg_cost_minor,
            current_price_minor: model.current_price_minor,
            created_at: model.created_at,
        })
    }
}

//! Receipt lines of a bill. Claims live in `bill_item_claims`.

use sea_orm::{ActiveValue, entity::prelude::*};
use serde::{Deserialize, Serialize};

use crate::{EngineError, split::LineItem};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillItem {
    pub item_id: u32,
    pub name: String,
    pub price_minor: i64,
    /// Participants sharing this line, by username.
    pub claimed_by: Vec<String>,
}

impl From<&BillItem> for LineItem {
    fn from(item: &BillItem) -> Self {
        LineItem::new(item.item_id, item.name.clone(), item.price_minor)
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "bill_items")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub bill_id: String,
    #[sea_orm(primary_key, auto_increment = false)]
    pub item_id: i64,
    pub position: i32,
    pub name: String,
    pub price_minor: i64,
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
    pub(crate) fn new(bill_id: &str, position: usize, item: &LineItem) -> Self {
        Self {
            bill_id: ActiveValue::Set(bill_id.to_string()),
            item_id: ActiveValue::Set(i64::from(item.id)),
            position: ActiveValue::Set(i32::try_from(position).unwrap_or(i32::MAX)),
            name: ActiveValue::Set(item.name.clone()),
            price_minor: ActiveValue::Set(item.price_minor),
        }
    }
}

impl BillItem {
    pub(crate) fn from_model(model: Model, claimed_by: Vec<String>) -> Result<Self, EngineError> {
        Ok(Self {
            item_id: u32::try_from(model.item_id)
                .map_err(|_| EngineError::InvalidId(format!("item {}", model.item_id)))?,
            name: model.name,
            price_minor: model.price_minor,
            claimed_by,
        })
    }
}

//! Which participants claimed which receipt line. An item shared by several
//! participants has one row per claimant.

use sea_orm::{ActiveValue, entity::prelude::*};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "bill_item_claims")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub bill_id: String,
    #[sea_orm(primary_key, auto_increment = false)]
    pub item_id: i64,
    #[sea_orm(primary_key, auto_increment = false)]
    pub username: String,
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
    pub(crate) fn new(bill_id: &str, item_id: u32, username: &str) -> Self {
        Self {
            bill_id: ActiveValue::Set(bill_id.to_string()),
            item_id: ActiveValue::Set(i64::from(item_id)),
            username: ActiveValue::Set(username.to_string()),
        }
    }
}

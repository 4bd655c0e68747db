//! One row per (vote, eligible member). `decision` is `NULL` until cast.

use sea_orm::entity::prelude::*;

use crate::{
    EngineError,
    votes::{Ballot, Decision},
};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "vote_ballots")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub vote_id: String,
    #[sea_orm(primary_key, auto_increment = false)]
    pub username: String,
    pub decision: Option<String>,
    pub cast_at: Option<DateTimeUtc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::votes::Entity",
        from = "Column::VoteId",
        to = "super::votes::Column::Id",
        on_update = "NoAction",
        on_delete = "Cascade"
    )]
    Votes,
}

impl Related<super::votes::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Votes.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl TryFrom<Model> for Ballot {
    type Error = EngineError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        Ok(Self {
            username: model.username,
            decision: model
                .decision
                .as_deref()
                .map(Decision::try_from)
                .transpose()?,
            cast_at: model.cast_at,
        })
    }
}

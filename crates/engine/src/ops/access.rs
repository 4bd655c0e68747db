use sea_orm::{DatabaseTransaction, QueryFilter, QueryOrder, prelude::*};

use crate::{
    EngineError, ResultEngine,
    group_members::{self, GroupMember, MemberStatus},
    groups::{self, Group},
    users,
};

use super::Engine;

impl Engine {
    pub(super) async fn require_user(
        &self,
        db: &DatabaseTransaction,
        username: &str,
    ) -> ResultEngine<users::Model> {
        users::Entity::find_by_id(username.to_string())
            .one(db)
            .await?
            .ok_or_else(|| EngineError::KeyNotFound("user not exists".to_string()))
    }

    pub(super) async fn require_group(
        &self,
        db: &DatabaseTransaction,
        group_id: &str,
    ) -> ResultEngine<Group> {
        groups::Entity::find_by_id(group_id.to_string())
            .one(db)
            .await?
            .ok_or_else(|| EngineError::KeyNotFound("group not exists".to_string()))?
            .try_into()
    }

    pub(super) async fn find_member(
        &self,
        db: &DatabaseTransaction,
        group_id: &str,
        username: &str,
    ) -> ResultEngine<Option<GroupMember>> {
        group_members::Entity::find_by_id((group_id.to_string(), username.to_string()))
            .one(db)
            .await?
            .map(GroupMember::try_from)
            .transpose()
    }

    /// Any membership that has not been removed can read the group.
    pub(super) async fn require_member(
        &self,
        db: &DatabaseTransaction,
        group_id: &str,
        username: &str,
    ) -> ResultEngine<GroupMember> {
        match self.find_member(db, group_id, username).await? {
            Some(member) if member.status != MemberStatus::Removed => Ok(member),
            _ => Err(EngineError::Forbidden("not a member of the group".to_string())),
        }
    }

    pub(super) async fn require_active_member(
        &self,
        db: &DatabaseTransaction,
        group_id: &str,
        username: &str,
    ) -> ResultEngine<GroupMember> {
        let member = self.require_member(db, group_id, username).await?;
        if !member.is_active() {
            return Err(EngineError::Forbidden(format!(
                "membership of {username} is {}",
                member.status.as_str()
            )));
        }
        Ok(member)
    }

    /// Active owner or admin.
    pub(super) async fn require_manager(
        &self,
        db: &DatabaseTransaction,
        group_id: &str,
        username: &str,
    ) -> ResultEngine<GroupMember> {
        let member = self.require_active_member(db, group_id, username).await?;
        if !member.role.can_manage() {
            return Err(EngineError::Forbidden(
                "owner or admin role required".to_string(),
            ));
        }
        Ok(member)
    }

    /// Active members ordered by username.
    pub(super) async fn active_members(
        &self,
        db: &DatabaseTransaction,
        group_id: &str,
    ) -> ResultEngine<Vec<group_members::Model>> {
        group_members::Entity::find()
            .filter(group_members::Column::GroupId.eq(group_id.to_string()))
            .filter(group_members::Column::Status.eq(MemberStatus::Active.as_str()))
            .order_by_asc(group_members::Column::Username)
            .all(db)
            .await
            .map_err(Into::into)
    }
}

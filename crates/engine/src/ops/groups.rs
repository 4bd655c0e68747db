use chrono::Utc;
use sea_orm::{
    ActiveValue, PaginatorTrait, QueryFilter, QueryOrder, TransactionTrait, prelude::*,
    sea_query::Expr,
};
use serde::{Deserialize, Serialize};

use crate::{
    EngineError, ResultEngine,
    commands::CreateGroupCmd,
    gateways::{Event, group_topic},
    group_members::{self, GroupMember, MemberRole, MemberStatus},
    groups::{self, Group, validate_threshold},
    notifications::{Notification, NotificationKind},
    util::{normalize_optional_text, normalize_required_name},
    votes::{self, InvestmentVote, VoteStatus},
};

use super::{Engine, notify::Outbox, with_tx};

/// A group as seen by one of its members.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupSummary {
    pub group: Group,
    pub role: MemberRole,
    pub status: MemberStatus,
    pub balance_minor: i64,
    pub active_members: u64,
}

impl Engine {
    /// Creates a group; the creator joins as active owner.
    pub async fn create_group(&self, cmd: CreateGroupCmd) -> ResultEngine<String> {
        let name = normalize_required_name(&cmd.name, "group name")?;
        let group = Group::new(
            name,
            normalize_optional_text(cmd.description.as_deref()),
            cmd.kind,
            cmd.strategy,
            cmd.vote_threshold_pct,
            &cmd.created_by,
        )?;
        let group_id = group.id.to_string();

        with_tx!(self, |db_tx| {
            self.require_user(&db_tx, &cmd.created_by).await?;
            groups::ActiveModel::from(&group).insert(&db_tx).await?;
            group_members::ActiveModel {
                group_id: ActiveValue::Set(group_id.clone()),
                username: ActiveValue::Set(cmd.created_by.clone()),
                role: ActiveValue::Set(MemberRole::Owner.as_str().to_string()),
                status: ActiveValue::Set(MemberStatus::Active.as_str().to_string()),
                balance_minor: ActiveValue::Set(0),
                invited_by: ActiveValue::Set(None),
                joined_at: ActiveValue::Set(Some(Utc::now())),
            }
            .insert(&db_tx)
            .await?;
            tracing::info!(group_id = %group_id, owner = %cmd.created_by, "group created");
            Ok(group_id)
        })
    }

    /// Groups the user belongs to (removed memberships excluded).
    pub async fn list_groups(&self, username: &str) -> ResultEngine<Vec<GroupSummary>> {
        with_tx!(self, |db_tx| {
            let memberships = group_members::Entity::find()
                .filter(group_members::Column::Username.eq(username.to_string()))
                .filter(group_members::Column::Status.ne(MemberStatus::Removed.as_str()))
                .all(&db_tx)
                .await?;

            let mut summaries = Vec::with_capacity(memberships.len());
            for membership in memberships {
                let member = GroupMember::try_from(membership)?;
                let group = self.require_group(&db_tx, &member.group_id).await?;
                let active_members = self.count_active(&db_tx, &member.group_id).await?;
                summaries.push(GroupSummary {
                    group,
                    role: member.role,
                    status: member.status,
                    balance_minor: member.balance_minor,
                    active_members,
                });
            }
            summaries.sort_by(|a, b| b.group.created_at.cmp(&a.group.created_at));
            Ok(summaries)
        })
    }

    pub async fn group(&self, group_id: &str, username: &str) -> ResultEngine<GroupSummary> {
        with_tx!(self, |db_tx| {
            let group = self.require_group(&db_tx, group_id).await?;
            let member = self.require_member(&db_tx, group_id, username).await?;
            let active_members = self.count_active(&db_tx, group_id).await?;
            Ok(GroupSummary {
                group,
                role: member.role,
                status: member.status,
                balance_minor: member.balance_minor,
                active_members,
            })
        })
    }

    pub async fn list_members(
        &self,
        group_id: &str,
        username: &str,
    ) -> ResultEngine<Vec<GroupMember>> {
        with_tx!(self, |db_tx| {
            self.require_group(&db_tx, group_id).await?;
            self.require_member(&db_tx, group_id, username).await?;
            let rows = group_members::Entity::find()
                .filter(group_members::Column::GroupId.eq(group_id.to_string()))
                .order_by_asc(group_members::Column::Username)
                .all(&db_tx)
                .await?;
            rows.into_iter()
                .map(GroupMember::try_from)
                .collect::<ResultEngine<Vec<_>>>()
        })
    }

    /// Invites a user (owner/admin only). A removed member can be invited
    /// again.
    pub async fn invite_member(
        &self,
        group_id: &str,
        invitee: &str,
        role: MemberRole,
        actor: &str,
    ) -> ResultEngine<()> {
        if role == MemberRole::Owner {
            return Err(EngineError::InvalidRole(
                "a group has exactly one owner".to_string(),
            ));
        }
        let mut outbox = Outbox::default();
        with_tx!(self, |db_tx| {
            let group = self.require_group(&db_tx, group_id).await?;
            self.require_manager(&db_tx, group_id, actor).await?;
            self.require_user(&db_tx, invitee).await?;

            let row = group_members::ActiveModel {
                group_id: ActiveValue::Set(group_id.to_string()),
                username: ActiveValue::Set(invitee.to_string()),
                role: ActiveValue::Set(role.as_str().to_string()),
                status: ActiveValue::Set(MemberStatus::Invited.as_str().to_string()),
                balance_minor: ActiveValue::NotSet,
                invited_by: ActiveValue::Set(Some(actor.to_string())),
                joined_at: ActiveValue::Set(None),
            };
            match self.find_member(&db_tx, group_id, invitee).await? {
                Some(existing) if existing.status == MemberStatus::Removed => {
                    row.update(&db_tx).await?;
                }
                Some(_) => {
                    return Err(EngineError::ExistingKey(invitee.to_string()));
                }
                None => {
                    let mut row = row;
                    row.balance_minor = ActiveValue::Set(0);
                    row.insert(&db_tx).await?;
                }
            }

            outbox
                .notify(
                    &db_tx,
                    Notification::new(
                        invitee,
                        NotificationKind::GroupInvite,
                        "Group invitation",
                        format!("{actor} invited you to join {}", group.name),
                        serde_json::json!({ "group_id": group_id, "invited_by": actor }),
                    ),
                )
                .await?;
            Ok(())
        })?;
        tracing::info!(%group_id, %invitee, %actor, "member invited");
        self.dispatch(outbox).await;
        Ok(())
    }

    /// Accepts a pending invitation (`invited -> active`).
    pub async fn accept_invite(&self, group_id: &str, username: &str) -> ResultEngine<()> {
        let mut outbox = Outbox::default();
        with_tx!(self, |db_tx| {
            self.require_group(&db_tx, group_id).await?;
            let res = group_members::Entity::update_many()
                .col_expr(
                    group_members::Column::Status,
                    Expr::value(MemberStatus::Active.as_str()),
                )
                .col_expr(group_members::Column::JoinedAt, Expr::value(Utc::now()))
                .filter(group_members::Column::GroupId.eq(group_id.to_string()))
                .filter(group_members::Column::Username.eq(username.to_string()))
                .filter(group_members::Column::Status.eq(MemberStatus::Invited.as_str()))
                .exec(&db_tx)
                .await?;
            if res.rows_affected == 0 {
                return Err(EngineError::InvalidState(
                    "no pending invitation".to_string(),
                ));
            }
            outbox.publish(
                group_topic(group_id),
                Event::MemberJoined {
                    group_id: group_id.to_string(),
                    username: username.to_string(),
                },
            );
            Ok(())
        })?;
        self.dispatch(outbox).await;
        Ok(())
    }

    /// Changes a member's status (owner/admin only). The owner's membership
    /// cannot be changed.
    ///
    /// A member who stops being active can no longer vote, so open votes of
    /// the group are re-checked and may be decided by this call.
    pub async fn set_member_status(
        &self,
        group_id: &str,
        target: &str,
        status: MemberStatus,
        actor: &str,
    ) -> ResultEngine<()> {
        let mut outbox = Outbox::default();
        with_tx!(self, |db_tx| {
            let group = self.require_group(&db_tx, group_id).await?;
            self.require_manager(&db_tx, group_id, actor).await?;
            let member = self
                .find_member(&db_tx, group_id, target)
                .await?
                .ok_or_else(|| EngineError::KeyNotFound("member not exists".to_string()))?;
            if member.role == MemberRole::Owner {
                return Err(EngineError::Forbidden(
                    "the owner's membership cannot be changed".to_string(),
                ));
            }
            let joined_at = match (member.joined_at, status) {
                (None, MemberStatus::Active) => Some(Utc::now()),
                (joined_at, _) => joined_at,
            };
            group_members::ActiveModel {
                group_id: ActiveValue::Unchanged(group_id.to_string()),
                username: ActiveValue::Unchanged(target.to_string()),
                status: ActiveValue::Set(status.as_str().to_string()),
                joined_at: ActiveValue::Set(joined_at),
                ..Default::default()
            }
            .update(&db_tx)
            .await?;
            tracing::info!(%group_id, %target, status = status.as_str(), "member status changed");

            if member.is_active() && status != MemberStatus::Active {
                let open = votes::Entity::find()
                    .filter(votes::Column::GroupId.eq(group_id.to_string()))
                    .filter(votes::Column::Status.eq(VoteStatus::Pending.as_str()))
                    .filter(votes::Column::ExpiresAt.gte(Utc::now()))
                    .order_by_asc(votes::Column::CreatedAt)
                    .all(&db_tx)
                    .await?;
                for model in open {
                    let vote = InvestmentVote::try_from(model)?;
                    self.complete_if_decided(&db_tx, &mut outbox, &vote, &group)
                        .await?;
                }
            }
            Ok(())
        })?;
        self.dispatch(outbox).await;
        Ok(())
    }

    pub async fn set_vote_threshold(
        &self,
        group_id: &str,
        pct: u8,
        actor: &str,
    ) -> ResultEngine<()> {
        validate_threshold(pct)?;
        with_tx!(self, |db_tx| {
            self.require_group(&db_tx, group_id).await?;
            self.require_manager(&db_tx, group_id, actor).await?;
            groups::ActiveModel {
                id: ActiveValue::Unchanged(group_id.to_string()),
                vote_threshold_pct: ActiveValue::Set(i32::from(pct)),
                ..Default::default()
            }
            .update(&db_tx)
            .await?;
            Ok(())
        })
    }

    async fn count_active(
        &self,
        db: &sea_orm::DatabaseTransaction,
        group_id: &str,
    ) -> ResultEngine<u64> {
        group_members::Entity::find()
            .filter(group_members::Column::GroupId.eq(group_id.to_string()))
            .filter(group_members::Column::Status.eq(MemberStatus::Active.as_str()))
            .count(db)
            .await
            .map_err(Into::into)
    }
}

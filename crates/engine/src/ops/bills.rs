use std::collections::HashMap;

use chrono::Utc;
use sea_orm::{
    DatabaseTransaction, QueryFilter, QueryOrder, TransactionTrait, prelude::*, sea_query::Expr,
};
use uuid::Uuid;

use crate::{
    EngineError, ResultEngine,
    bill_item_claims,
    bill_items::{self, BillItem},
    bill_participants::{self, BillParticipant},
    bills::{self, Bill, BillDetail, BillStatus, ReceiptSource, SettlementSummary},
    commands::CreateBillCmd,
    gateways::{Event, bill_topic, group_topic},
    jobs::Job,
    notifications::{Notification, NotificationKind},
    split::{LineItem, split_bill},
    util::normalize_optional_text,
};

use super::{Engine, notify::Outbox, with_tx};

/// Selects the bills of one group.
#[derive(Clone, Debug, Default)]
pub struct BillFilter {
    pub status: Option<BillStatus>,
    pub created_by: Option<String>,
}

impl BillFilter {
    #[must_use]
    pub fn status(mut self, status: BillStatus) -> Self {
        self.status = Some(status);
        self
    }

    #[must_use]
    pub fn created_by(mut self, username: impl Into<String>) -> Self {
        self.created_by = Some(username.into());
        self
    }
}

impl Engine {
    /// Creates a bill with its items and participant obligations.
    ///
    /// When a receipt image is attached the scanner's items are used; if
    /// scanning fails or finds nothing the caller's items are kept. Unless the
    /// bill is a draft it enters `pending` and settlement is scheduled.
    pub async fn create_bill(&self, cmd: CreateBillCmd) -> ResultEngine<String> {
        let (items, receipt_source) = self.resolve_items(&cmd).await;
        if items.is_empty() {
            return Err(EngineError::Validation("bill has no items".to_string()));
        }
        if cmd.claims.is_empty() {
            return Err(EngineError::Validation(
                "bill needs at least one participant".to_string(),
            ));
        }

        let plan = split_bill(
            &items,
            cmd.tax_minor,
            cmd.tip_minor,
            &cmd.claims,
            Some(&cmd.created_by),
        )?;
        if plan.total_minor <= 0 {
            return Err(EngineError::InvalidAmount(
                "bill total must be > 0".to_string(),
            ));
        }

        let bill_id = Uuid::new_v4();
        let status = if cmd.draft {
            BillStatus::Draft
        } else {
            BillStatus::Pending
        };
        let mut outbox = Outbox::default();

        with_tx!(self, |db_tx| {
            let group = self.require_group(&db_tx, &cmd.group_id).await?;
            self.require_active_member(&db_tx, &cmd.group_id, &cmd.created_by)
                .await?;
            for obligation in &plan.obligations {
                let eligible = self
                    .find_member(&db_tx, &cmd.group_id, &obligation.participant)
                    .await?
                    .is_some_and(|m| m.is_active());
                if !eligible {
                    return Err(EngineError::Validation(format!(
                        "{} is not an active member of the group",
                        obligation.participant
                    )));
                }
            }

            let bill = Bill {
                id: bill_id,
                group_id: cmd.group_id.clone(),
                created_by: cmd.created_by.clone(),
                merchant: normalize_optional_text(cmd.merchant.as_deref()),
                subtotal_minor: plan.subtotal_minor,
                tax_minor: plan.tax_minor,
                tip_minor: plan.tip_minor,
                total_minor: plan.total_minor,
                currency: group.currency,
                receipt_source,
                status,
                created_at: Utc::now(),
                settled_at: None,
            };
            bills::ActiveModel::from(&bill).insert(&db_tx).await?;

            let bill_key = bill_id.to_string();
            for (position, item) in items.iter().enumerate() {
                bill_items::ActiveModel::new(&bill_key, position, item)
                    .insert(&db_tx)
                    .await?;
            }
            for obligation in &plan.obligations {
                bill_participants::ActiveModel::pending(&bill_key, obligation)
                    .insert(&db_tx)
                    .await?;
                for item_id in &obligation.item_ids {
                    bill_item_claims::ActiveModel::new(&bill_key, *item_id, &obligation.participant)
                        .insert(&db_tx)
                        .await?;
                }
                if obligation.participant != cmd.created_by {
                    outbox
                        .notify(
                            &db_tx,
                            Notification::new(
                                &obligation.participant,
                                NotificationKind::BillCreated,
                                "New bill split",
                                format!(
                                    "{} added you to a bill: you owe {}",
                                    cmd.created_by,
                                    crate::Money::new(obligation.owed_minor)
                                ),
                                serde_json::json!({
                                    "bill_id": bill_key,
                                    "group_id": cmd.group_id,
                                    "owed_minor": obligation.owed_minor,
                                }),
                            ),
                        )
                        .await?;
                }
            }

            Ok(())
        })?;

        let bill_key = bill_id.to_string();
        tracing::info!(
            bill_id = %bill_key,
            group_id = %cmd.group_id,
            total_minor = plan.total_minor,
            participants = plan.obligations.len(),
            draft = cmd.draft,
            "bill created"
        );
        self.publish_bill_status(&mut outbox, &bill_key, &cmd.group_id, status);
        if !cmd.draft {
            outbox.enqueue(Job::SettleBill {
                bill_id: bill_key.clone(),
            });
        }
        self.dispatch(outbox).await;
        Ok(bill_key)
    }

    /// Moves a draft to `pending` and schedules settlement. Creator only.
    pub async fn submit_bill(&self, bill_id: &str, actor: &str) -> ResultEngine<()> {
        let mut outbox = Outbox::default();
        let bill = with_tx!(self, |db_tx| {
            let bill = self.require_bill(&db_tx, bill_id).await?;
            if bill.created_by != actor {
                return Err(EngineError::Forbidden(
                    "only the creator can submit a bill".to_string(),
                ));
            }
            self.transition_bill(&db_tx, bill_id, &[BillStatus::Draft], BillStatus::Pending)
                .await?;
            Ok(bill)
        })?;
        self.publish_bill_status(&mut outbox, bill_id, &bill.group_id, BillStatus::Pending);
        outbox.enqueue(Job::SettleBill {
            bill_id: bill_id.to_string(),
        });
        self.dispatch(outbox).await;
        Ok(())
    }

    /// Cancels a bill that has not finished settling. Creator, group owner or
    /// admin.
    pub async fn cancel_bill(&self, bill_id: &str, actor: &str) -> ResultEngine<()> {
        let mut outbox = Outbox::default();
        let bill = with_tx!(self, |db_tx| {
            let bill = self.require_bill(&db_tx, bill_id).await?;
            if bill.created_by != actor {
                self.require_manager(&db_tx, &bill.group_id, actor).await?;
            }
            self.transition_bill(
                &db_tx,
                bill_id,
                &[BillStatus::Draft, BillStatus::Pending, BillStatus::Processing],
                BillStatus::Cancelled,
            )
            .await?;
            Ok(bill)
        })?;
        tracing::info!(%bill_id, %actor, "bill cancelled");
        self.publish_bill_status(&mut outbox, bill_id, &bill.group_id, BillStatus::Cancelled);
        self.dispatch(outbox).await;
        Ok(())
    }

    /// Bill with items, participants and settlement summary. Group members
    /// only.
    pub async fn bill(&self, bill_id: &str, username: &str) -> ResultEngine<BillDetail> {
        with_tx!(self, |db_tx| {
            let detail = self.load_bill_detail(&db_tx, bill_id).await?;
            self.require_member(&db_tx, &detail.bill.group_id, username)
                .await?;
            Ok(detail)
        })
    }

    /// Bills of a group, newest first. Group members only.
    pub async fn list_bills(
        &self,
        group_id: &str,
        filter: BillFilter,
        username: &str,
    ) -> ResultEngine<Vec<Bill>> {
        with_tx!(self, |db_tx| {
            self.require_group(&db_tx, group_id).await?;
            self.require_member(&db_tx, group_id, username).await?;
            let mut query = bills::Entity::find()
                .filter(bills::Column::GroupId.eq(group_id.to_string()))
                .order_by_desc(bills::Column::CreatedAt);
            if let Some(status) = filter.status {
                query = query.filter(bills::Column::Status.eq(status.as_str()));
            }
            if let Some(created_by) = filter.created_by {
                query = query.filter(bills::Column::CreatedBy.eq(created_by));
            }
            query
                .all(&db_tx)
                .await?
                .into_iter()
                .map(Bill::try_from)
                .collect::<ResultEngine<Vec<_>>>()
        })
    }

    async fn resolve_items(&self, cmd: &CreateBillCmd) -> (Vec<LineItem>, ReceiptSource) {
        let Some(image) = &cmd.receipt_image else {
            return (cmd.items.clone(), ReceiptSource::Manual);
        };
        match self.scanner.extract_items(image).await {
            Ok(scanned) if !scanned.is_empty() => {
                let items = scanned
                    .into_iter()
                    .zip(1u32..)
                    .map(|(item, id)| LineItem::new(id, item.name, item.price_minor))
                    .collect();
                (items, ReceiptSource::Scanned)
            }
            Ok(_) => {
                tracing::warn!("receipt scan found no items, using submitted items");
                (cmd.items.clone(), ReceiptSource::Manual)
            }
            Err(err) => {
                tracing::warn!(error = %err, "receipt scan failed, using submitted items");
                (cmd.items.clone(), ReceiptSource::Manual)
            }
        }
    }

    pub(super) async fn require_bill(
        &self,
        db: &DatabaseTransaction,
        bill_id: &str,
    ) -> ResultEngine<Bill> {
        bills::Entity::find_by_id(bill_id.to_string())
            .one(db)
            .await?
            .ok_or_else(|| EngineError::KeyNotFound("bill not exists".to_string()))?
            .try_into()
    }

    pub(super) async fn load_bill_detail(
        &self,
        db: &DatabaseTransaction,
        bill_id: &str,
    ) -> ResultEngine<BillDetail> {
        let bill = self.require_bill(db, bill_id).await?;
        let mut claims: HashMap<i64, Vec<String>> = HashMap::new();
        let mut claimed_items: HashMap<String, Vec<u32>> = HashMap::new();
        for claim in bill_item_claims::Entity::find()
            .filter(bill_item_claims::Column::BillId.eq(bill_id.to_string()))
            .order_by_asc(bill_item_claims::Column::Username)
            .all(db)
            .await?
        {
            let item_id = u32::try_from(claim.item_id)
                .map_err(|_| EngineError::InvalidId(format!("item {}", claim.item_id)))?;
            claimed_items
                .entry(claim.username.clone())
                .or_default()
                .push(item_id);
            claims.entry(claim.item_id).or_default().push(claim.username);
        }

        let items = bill_items::Entity::find()
            .filter(bill_items::Column::BillId.eq(bill_id.to_string()))
            .order_by_asc(bill_items::Column::Position)
            .all(db)
            .await?
            .into_iter()
            .map(|model| {
                let claimed_by = claims.remove(&model.item_id).unwrap_or_default();
                BillItem::from_model(model, claimed_by)
            })
            .collect::<ResultEngine<Vec<_>>>()?;

        let participants = bill_participants::Entity::find()
            .filter(bill_participants::Column::BillId.eq(bill_id.to_string()))
            .order_by_asc(bill_participants::Column::Username)
            .all(db)
            .await?
            .into_iter()
            .map(|row| {
                let mut item_ids = claimed_items.remove(&row.username).unwrap_or_default();
                item_ids.sort_unstable();
                BillParticipant::from_model(row, item_ids)
            })
            .collect::<ResultEngine<Vec<_>>>()?;

        let settlement = SettlementSummary::from_parts(bill.status, &participants);
        Ok(BillDetail {
            bill,
            items,
            participants,
            settlement,
        })
    }

    /// Conditional status update; fails with `InvalidState` when the bill is
    /// not in one of `from`.
    pub(super) async fn transition_bill(
        &self,
        db: &DatabaseTransaction,
        bill_id: &str,
        from: &[BillStatus],
        to: BillStatus,
    ) -> ResultEngine<()> {
        if !self.try_transition_bill(db, bill_id, from, to).await? {
            return Err(EngineError::InvalidState(format!(
                "bill cannot move to {}",
                to.as_str()
            )));
        }
        Ok(())
    }

    /// Returns whether this call performed the transition.
    pub(super) async fn try_transition_bill(
        &self,
        db: &DatabaseTransaction,
        bill_id: &str,
        from: &[BillStatus],
        to: BillStatus,
    ) -> ResultEngine<bool> {
        let mut update = bills::Entity::update_many()
            .col_expr(bills::Column::Status, Expr::value(to.as_str()))
            .filter(bills::Column::Id.eq(bill_id.to_string()))
            .filter(bills::Column::Status.is_in(from.iter().map(|s| s.as_str())));
        if to == BillStatus::Completed {
            update = update.col_expr(bills::Column::SettledAt, Expr::value(Utc::now()));
        }
        let res = update.exec(db).await?;
        Ok(res.rows_affected == 1)
    }

    pub(super) fn publish_bill_status(
        &self,
        outbox: &mut Outbox,
        bill_id: &str,
        group_id: &str,
        status: BillStatus,
    ) {
        let event = Event::SplitUpdated {
            bill_id: bill_id.to_string(),
            group_id: group_id.to_string(),
            status: status.as_str().to_string(),
        };
        outbox.publish(bill_topic(bill_id), event.clone());
        outbox.publish(group_topic(group_id), event);
    }
}

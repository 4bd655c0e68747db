//! Driving bill obligations through the payment gateway.
//!
//! `settle_bill` charges every unpaid participant independently: one failed
//! charge never blocks its siblings, and a failed participant stays
//! `pending` and gets a `payment_failed` notification. Webhook events and
//! manual retries land on the same conditional participant updates, so each
//! obligation is paid and booked exactly once.

use std::collections::BTreeMap;

use chrono::Utc;
use sea_orm::{
    DatabaseTransaction, IntoSimpleExpr, QueryFilter, QueryOrder, TransactionTrait, prelude::*,
    sea_query::Expr,
};

use crate::{
    EngineError, ResultEngine,
    bill_participants::{self, ParticipantStatus},
    bills::{Bill, BillStatus},
    commands::{PaymentEvent, PaymentOutcome},
    gateways::{ChargeRequest, Event, GatewayError, bill_topic},
    groups,
    notifications::{Notification, NotificationKind},
    transactions::{Direction, Transaction, TransactionKind},
    users,
};

use super::{Engine, notify::Outbox, with_tx};

const CHARGEABLE: [ParticipantStatus; 3] = [
    ParticipantStatus::Pending,
    ParticipantStatus::Accepted,
    ParticipantStatus::Failed,
];

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SettlementOutcome {
    /// The bill was not `pending`/`processing`; nothing was done.
    Skipped { status: BillStatus },
    /// The settlement pass ran and the bill is `completed`.
    Completed { paid: usize, outstanding: usize },
    /// The bill left `processing` (was cancelled) while charges ran. Charges
    /// that already went through stay booked.
    Interrupted { status: BillStatus, paid: usize },
}

/// A participant selected for charging.
struct ChargeTarget {
    username: String,
    owed_minor: i64,
    customer_ref: Option<String>,
}

impl Engine {
    /// Runs the settlement pass of a bill. Safe to call repeatedly.
    pub async fn settle_bill(&self, bill_id: &str) -> ResultEngine<SettlementOutcome> {
        let claimed = with_tx!(self, |db_tx| {
            let bill = self.require_bill(&db_tx, bill_id).await?;
            let claimed = self
                .try_transition_bill(
                    &db_tx,
                    bill_id,
                    &[BillStatus::Pending, BillStatus::Processing],
                    BillStatus::Processing,
                )
                .await?;
            let status = bill.status;
            Ok(if claimed { Ok(bill) } else { Err(status) })
        })?;
        let bill = match claimed {
            Ok(bill) => bill,
            Err(status) => {
                tracing::debug!(
                    %bill_id,
                    status = status.as_str(),
                    "bill not settleable, skipping"
                );
                return Ok(SettlementOutcome::Skipped { status });
            }
        };

        let targets = with_tx!(self, |db_tx| {
            let rows = bill_participants::Entity::find()
                .filter(bill_participants::Column::BillId.eq(bill_id.to_string()))
                .filter(
                    bill_participants::Column::Status
                        .is_in(CHARGEABLE.iter().map(|s| s.as_str())),
                )
                .order_by_asc(bill_participants::Column::Username)
                .all(&db_tx)
                .await?;
            let mut targets = Vec::with_capacity(rows.len());
            for row in rows {
                let user = users::Entity::find_by_id(row.username.clone())
                    .one(&db_tx)
                    .await?;
                targets.push(ChargeTarget {
                    customer_ref: user
                        .filter(users::Model::has_payment_method)
                        .and_then(|u| u.payment_customer_ref),
                    username: row.username,
                    owed_minor: row.owed_minor,
                });
            }
            Ok(targets)
        })?;

        for target in &targets {
            if !self.still_processing(bill_id).await? {
                tracing::info!(%bill_id, "bill left processing, stop charging");
                break;
            }
            match self.settle_participant(&bill, target).await {
                Ok(()) => {}
                // Siblings are independent; the participant stays chargeable.
                Err(EngineError::Gateway(err)) => {
                    tracing::warn!(
                        %bill_id,
                        participant = %target.username,
                        error = %err,
                        "participant charge failed"
                    );
                    self.record_charge_failure(bill_id, &target.username, &err.to_string())
                        .await?;
                }
                Err(err) => {
                    tracing::error!(
                        %bill_id,
                        participant = %target.username,
                        error = %err,
                        "participant settlement failed"
                    );
                }
            }
        }

        let mut outbox = Outbox::default();
        let (completed, paid, outstanding) = with_tx!(self, |db_tx| {
            let completed = self
                .try_transition_bill(
                    &db_tx,
                    bill_id,
                    &[BillStatus::Processing],
                    BillStatus::Completed,
                )
                .await?;
            if completed {
                groups::Entity::update_many()
                    .col_expr(
                        groups::Column::TotalSplitMinor,
                        Expr::col(groups::Column::TotalSplitMinor).add(bill.total_minor),
                    )
                    .filter(groups::Column::Id.eq(bill.group_id.clone()))
                    .exec(&db_tx)
                    .await?;
                self.publish_bill_status(
                    &mut outbox,
                    bill_id,
                    &bill.group_id,
                    BillStatus::Completed,
                );
            }
            let participants = bill_participants::Entity::find()
                .filter(bill_participants::Column::BillId.eq(bill_id.to_string()))
                .all(&db_tx)
                .await?;
            let paid = participants
                .iter()
                .filter(|p| p.status == ParticipantStatus::Paid.as_str())
                .count();
            Ok((completed, paid, participants.len() - paid))
        })?;
        self.dispatch(outbox).await;

        if !completed {
            let status = with_tx!(self, |db_tx| {
                let bill = self.require_bill(&db_tx, bill_id).await?;
                Ok(bill.status)
            })?;
            tracing::warn!(%bill_id, status = status.as_str(), paid, "settlement interrupted");
            return Ok(SettlementOutcome::Interrupted { status, paid });
        }
        tracing::info!(%bill_id, paid, outstanding, "bill settled");
        Ok(SettlementOutcome::Completed { paid, outstanding })
    }

    async fn still_processing(&self, bill_id: &str) -> ResultEngine<bool> {
        with_tx!(self, |db_tx| {
            let bill = self.require_bill(&db_tx, bill_id).await?;
            Ok(bill.status == BillStatus::Processing)
        })
    }

    /// Applies an asynchronous charge result reported by the gateway.
    ///
    /// Success marks the participant paid (once); failure marks an unpaid
    /// participant `failed`. The bill status is left alone.
    pub async fn apply_payment_event(&self, event: PaymentEvent) -> ResultEngine<()> {
        match event.outcome {
            PaymentOutcome::Succeeded { charge_ref } => {
                let bill = with_tx!(self, |db_tx| {
                    let bill = self.require_bill(&db_tx, &event.bill_id).await?;
                    self.require_participant(&db_tx, &event.bill_id, &event.username)
                        .await?;
                    Ok(bill)
                })?;
                self.mark_participant_paid(&bill, &event.username, &charge_ref)
                    .await?;
            }
            PaymentOutcome::Failed { reason } => {
                let mut outbox = Outbox::default();
                with_tx!(self, |db_tx| {
                    self.require_bill(&db_tx, &event.bill_id).await?;
                    self.require_participant(&db_tx, &event.bill_id, &event.username)
                        .await?;
                    self.fail_participant(
                        &db_tx,
                        &mut outbox,
                        &event.bill_id,
                        &event.username,
                        &reason,
                    )
                    .await?;
                    Ok(())
                })?;
                self.dispatch(outbox).await;
            }
        }
        Ok(())
    }

    /// Charges a `pending`/`failed` participant again. Allowed for the
    /// participant and for the bill creator once settlement has started.
    pub async fn retry_participant_charge(
        &self,
        bill_id: &str,
        username: &str,
        actor: &str,
    ) -> ResultEngine<ParticipantStatus> {
        let (bill, target) = with_tx!(self, |db_tx| {
            let bill = self.require_bill(&db_tx, bill_id).await?;
            if actor != username && actor != bill.created_by {
                return Err(EngineError::Forbidden(
                    "only the participant or the bill creator can retry".to_string(),
                ));
            }
            if !matches!(bill.status, BillStatus::Processing | BillStatus::Completed) {
                return Err(EngineError::InvalidState(format!(
                    "bill is {}",
                    bill.status.as_str()
                )));
            }
            let participant = self.require_participant(&db_tx, bill_id, username).await?;
            let status = ParticipantStatus::try_from(participant.status.as_str())?;
            if !status.is_chargeable() {
                return Err(EngineError::InvalidState(format!(
                    "participant is {}",
                    status.as_str()
                )));
            }
            let user = self.require_user(&db_tx, username).await?;
            if !user.has_payment_method() {
                return Err(EngineError::Validation(
                    "no payment method linked".to_string(),
                ));
            }
            Ok((
                bill,
                ChargeTarget {
                    username: participant.username,
                    owed_minor: participant.owed_minor,
                    customer_ref: user.payment_customer_ref,
                },
            ))
        })?;

        if !self.payments.is_enabled() {
            return Err(GatewayError::NotConfigured.into());
        }
        let key = format!("{bill_id}:{username}:retry:{}", Utc::now().timestamp());
        match self.charge(&bill, &target, key).await {
            Ok(charge_ref) => {
                self.mark_participant_paid(&bill, username, &charge_ref)
                    .await?;
                Ok(ParticipantStatus::Paid)
            }
            Err(err) => {
                tracing::warn!(%bill_id, participant = %username, error = %err, "retry failed");
                let mut outbox = Outbox::default();
                with_tx!(self, |db_tx| {
                    self.fail_participant(&db_tx, &mut outbox, bill_id, username, &err.to_string())
                        .await
                })?;
                self.dispatch(outbox).await;
                Err(err.into())
            }
        }
    }

    async fn settle_participant(&self, bill: &Bill, target: &ChargeTarget) -> ResultEngine<()> {
        let bill_id = bill.id.to_string();
        if target.owed_minor == 0 {
            // Nothing to collect; close the obligation without a charge.
            return self.mark_participant_paid(bill, &target.username, "").await;
        }
        if !self.payments.is_enabled() || target.customer_ref.is_none() {
            tracing::info!(
                %bill_id,
                participant = %target.username,
                "no payment method or gateway, left pending"
            );
            return Ok(());
        }
        let key = format!("{bill_id}:{}", target.username);
        let charge_ref = self.charge(bill, target, key).await?;
        self.mark_participant_paid(bill, &target.username, &charge_ref)
            .await
            .inspect_err(|err| {
                tracing::error!(
                    %bill_id,
                    participant = %target.username,
                    %charge_ref,
                    error = %err,
                    "charge succeeded but could not be recorded"
                );
            })
    }

    async fn charge(
        &self,
        bill: &Bill,
        target: &ChargeTarget,
        idempotency_key: String,
    ) -> Result<String, GatewayError> {
        let customer_ref = target
            .customer_ref
            .clone()
            .ok_or_else(|| GatewayError::InvalidCustomer(target.username.clone()))?;
        let request = ChargeRequest {
            customer_ref,
            amount_minor: target.owed_minor,
            currency: bill.currency,
            idempotency_key,
            description: format!(
                "Split payment for {}",
                bill.merchant.as_deref().unwrap_or("a shared bill")
            ),
            metadata: BTreeMap::from([
                ("bill_id".to_string(), bill.id.to_string()),
                ("group_id".to_string(), bill.group_id.clone()),
                ("username".to_string(), target.username.clone()),
            ]),
        };
        self.payments
            .charge(&request)
            .await
            .map(|receipt| receipt.reference)
    }

    /// Marks a chargeable participant paid and books the ledger entries. A
    /// participant that is already paid is left untouched.
    async fn mark_participant_paid(
        &self,
        bill: &Bill,
        username: &str,
        charge_ref: &str,
    ) -> ResultEngine<()> {
        let bill_id = bill.id.to_string();
        let mut outbox = Outbox::default();
        with_tx!(self, |db_tx| {
            let participant = self.require_participant(&db_tx, &bill_id, username).await?;
            let res = bill_participants::Entity::update_many()
                .col_expr(
                    bill_participants::Column::Status,
                    Expr::value(ParticipantStatus::Paid.as_str()),
                )
                .col_expr(
                    bill_participants::Column::PaidMinor,
                    Expr::col(bill_participants::Column::OwedMinor).into_simple_expr(),
                )
                .col_expr(
                    bill_participants::Column::ChargeRef,
                    Expr::value((!charge_ref.is_empty()).then(|| charge_ref.to_string())),
                )
                .col_expr(bill_participants::Column::PaidAt, Expr::value(Utc::now()))
                .col_expr(
                    bill_participants::Column::FailureReason,
                    Expr::value(Option::<String>::None),
                )
                .filter(bill_participants::Column::Id.eq(participant.id.clone()))
                .filter(
                    bill_participants::Column::Status
                        .is_in(CHARGEABLE.iter().map(|s| s.as_str())),
                )
                .exec(&db_tx)
                .await?;
            if res.rows_affected == 0 {
                tracing::debug!(%bill_id, participant = %username, "already settled");
                return Ok(());
            }

            let amount = participant.owed_minor;
            if amount > 0 {
                let payment = Transaction::new(
                    username,
                    TransactionKind::SplitPayment,
                    Direction::Debit,
                    amount,
                    bill.currency,
                )?
                .group(bill.group_id.clone())
                .bill(bill_id.clone())
                .description(format!("Split payment to {}", bill.created_by));
                self.record_transaction(&db_tx, &payment).await?;

                if username != bill.created_by {
                    let receipt = Transaction::new(
                        &bill.created_by,
                        TransactionKind::SplitReceipt,
                        Direction::Credit,
                        amount,
                        bill.currency,
                    )?
                    .group(bill.group_id.clone())
                    .bill(bill_id.clone())
                    .description(format!("Split payment from {username}"));
                    self.record_transaction(&db_tx, &receipt).await?;
                }

                outbox
                    .notify(
                        &db_tx,
                        Notification::new(
                            username,
                            NotificationKind::PaymentSuccess,
                            "Payment successful",
                            format!("You paid {} for a shared bill", crate::Money::new(amount)),
                            serde_json::json!({ "bill_id": bill_id, "amount_minor": amount }),
                        ),
                    )
                    .await?;
            }
            outbox.publish(
                bill_topic(&bill_id),
                Event::PaymentUpdated {
                    bill_id: bill_id.clone(),
                    username: username.to_string(),
                    status: ParticipantStatus::Paid.as_str().to_string(),
                },
            );
            Ok(())
        })?;
        self.dispatch(outbox).await;
        Ok(())
    }

    /// Keeps the participant chargeable, remembers why the charge failed and
    /// tells the participant.
    async fn record_charge_failure(
        &self,
        bill_id: &str,
        username: &str,
        reason: &str,
    ) -> ResultEngine<()> {
        let mut outbox = Outbox::default();
        with_tx!(self, |db_tx| {
            let res = bill_participants::Entity::update_many()
                .col_expr(
                    bill_participants::Column::FailureReason,
                    Expr::value(reason.to_string()),
                )
                .filter(bill_participants::Column::BillId.eq(bill_id.to_string()))
                .filter(bill_participants::Column::Username.eq(username.to_string()))
                .filter(
                    bill_participants::Column::Status
                        .is_in(CHARGEABLE.iter().map(|s| s.as_str())),
                )
                .exec(&db_tx)
                .await?;
            if res.rows_affected == 0 {
                return Ok(());
            }
            outbox
                .notify(&db_tx, payment_failed(bill_id, username, reason))
                .await?;
            Ok(())
        })?;
        self.dispatch(outbox).await;
        Ok(())
    }

    async fn fail_participant(
        &self,
        db: &DatabaseTransaction,
        outbox: &mut Outbox,
        bill_id: &str,
        username: &str,
        reason: &str,
    ) -> ResultEngine<()> {
        let res = bill_participants::Entity::update_many()
            .col_expr(
                bill_participants::Column::Status,
                Expr::value(ParticipantStatus::Failed.as_str()),
            )
            .col_expr(
                bill_participants::Column::FailureReason,
                Expr::value(reason.to_string()),
            )
            .filter(bill_participants::Column::BillId.eq(bill_id.to_string()))
            .filter(bill_participants::Column::Username.eq(username.to_string()))
            .filter(bill_participants::Column::Status.is_in([
                ParticipantStatus::Pending.as_str(),
                ParticipantStatus::Accepted.as_str(),
                ParticipantStatus::Failed.as_str(),
            ]))
            .exec(db)
            .await?;
        if res.rows_affected == 0 {
            return Ok(());
        }
        outbox
            .notify(db, payment_failed(bill_id, username, reason))
            .await?;
        outbox.publish(
            bill_topic(bill_id),
            Event::PaymentUpdated {
                bill_id: bill_id.to_string(),
                username: username.to_string(),
                status: ParticipantStatus::Failed.as_str().to_string(),
            },
        );
        Ok(())
    }

    async fn require_participant(
        &self,
        db: &DatabaseTransaction,
        bill_id: &str,
        username: &str,
    ) -> ResultEngine<bill_participants::Model> {
        bill_participants::Entity::find()
            .filter(bill_participants::Column::BillId.eq(bill_id.to_string()))
            .filter(bill_participants::Column::Username.eq(username.to_string()))
            .one(db)
            .await?
            .ok_or_else(|| EngineError::KeyNotFound("participant not exists".to_string()))
    }
}

fn payment_failed(bill_id: &str, username: &str, reason: &str) -> Notification {
    Notification::new(
        username,
        NotificationKind::PaymentFailed,
        "Payment failed",
        format!("Your payment for a shared bill failed: {reason}"),
        serde_json::json!({ "bill_id": bill_id }),
    )
}

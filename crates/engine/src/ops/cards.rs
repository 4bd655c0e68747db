//! Virtual cards that pay a bill at the merchant.
//!
//! Issuing goes through the [`CardIssuer`](crate::gateways::CardIssuer).
//! Without an enabled issuer, or when issuing fails, a stub card is recorded
//! so the bill flow never blocks on the issuer.

use chrono::Utc;
use sea_orm::{QueryFilter, QueryOrder, TransactionTrait, prelude::*, sea_query::Expr};

use crate::{
    EngineError, ResultEngine,
    bills::BillStatus,
    commands::CardAuthorization,
    gateways::{CardRequest, IssuedCard},
    virtual_cards::{self, CardStatus, VirtualCard},
};

use super::{Engine, with_tx};

impl Engine {
    /// Issues a card for `bill_id` to `username`, limited to the bill total
    /// and valid for one hour. Active group members only.
    pub async fn create_virtual_card(
        &self,
        bill_id: &str,
        username: &str,
    ) -> ResultEngine<VirtualCard> {
        let bill = with_tx!(self, |db_tx| {
            let bill = self.require_bill(&db_tx, bill_id).await?;
            self.require_active_member(&db_tx, &bill.group_id, username)
                .await?;
            if matches!(bill.status, BillStatus::Cancelled | BillStatus::Failed) {
                return Err(EngineError::InvalidState(format!(
                    "bill is {}",
                    bill.status.as_str()
                )));
            }
            Ok(bill)
        })?;

        let issued = if self.cards.is_enabled() {
            let request = CardRequest {
                bill_id: bill_id.to_string(),
                group_id: bill.group_id.clone(),
                cardholder: username.to_string(),
                spending_limit_minor: bill.total_minor,
                currency: bill.currency,
            };
            match self.cards.issue(&request).await {
                Ok(issued) => issued,
                Err(err) => {
                    tracing::warn!(%bill_id, %username, error = %err, "card issuing failed, using stub card");
                    IssuedCard::stub()
                }
            }
        } else {
            IssuedCard::stub()
        };

        let card = VirtualCard::new(
            &bill.group_id,
            bill_id,
            username,
            issued,
            bill.total_minor,
            bill.currency,
            Utc::now(),
        );
        with_tx!(self, |db_tx| {
            virtual_cards::ActiveModel::from(&card)
                .insert(&db_tx)
                .await?;
            Ok(())
        })?;
        tracing::info!(
            %bill_id,
            %username,
            card_id = %card.id,
            last4 = %card.last4,
            limit_minor = card.spending_limit_minor,
            "virtual card created"
        );
        Ok(card)
    }

    /// Cards issued for a bill, oldest first. Group members only.
    pub async fn bill_cards(&self, bill_id: &str, username: &str) -> ResultEngine<Vec<VirtualCard>> {
        with_tx!(self, |db_tx| {
            let bill = self.require_bill(&db_tx, bill_id).await?;
            self.require_member(&db_tx, &bill.group_id, username)
                .await?;
            virtual_cards::Entity::find()
                .filter(virtual_cards::Column::BillId.eq(bill_id.to_string()))
                .order_by_asc(virtual_cards::Column::CreatedAt)
                .all(&db_tx)
                .await?
                .into_iter()
                .map(VirtualCard::try_from)
                .collect::<ResultEngine<Vec<_>>>()
        })
    }

    /// Decides an authorization raised by the issuer. Approves it when the
    /// card is active, unexpired and the amount fits the limit; the card is
    /// then marked `used`. Returns whether the authorization was approved.
    pub async fn authorize_card(&self, auth: CardAuthorization) -> ResultEngine<bool> {
        let now = Utc::now();
        let card = with_tx!(self, |db_tx| {
            let model = virtual_cards::Entity::find()
                .filter(virtual_cards::Column::CardRef.eq(auth.card_ref.clone()))
                .one(&db_tx)
                .await?;
            model.map(VirtualCard::try_from).transpose()
        })?;
        let Some(card) = card else {
            tracing::warn!(card_ref = %auth.card_ref, "authorization for unknown card");
            return Ok(false);
        };
        if !card.accepts(auth.amount_minor, now) {
            tracing::info!(
                card_id = %card.id,
                authorization = %auth.authorization_ref,
                amount_minor = auth.amount_minor,
                status = card.status.as_str(),
                "card authorization declined"
            );
            if card.status == CardStatus::Active && now > card.expires_at {
                self.mark_card_expired(&card).await?;
            }
            return Ok(false);
        }

        self.cards
            .approve_authorization(&auth.authorization_ref)
            .await?;
        let updated = with_tx!(self, |db_tx| {
            let res = virtual_cards::Entity::update_many()
                .col_expr(virtual_cards::Column::Status, Expr::value(CardStatus::Used.as_str()))
                .col_expr(virtual_cards::Column::SpentMinor, Expr::value(auth.amount_minor))
                .col_expr(virtual_cards::Column::UsedAt, Expr::value(now))
                .filter(virtual_cards::Column::Id.eq(card.id.to_string()))
                .filter(virtual_cards::Column::Status.eq(CardStatus::Active.as_str()))
                .exec(&db_tx)
                .await?;
            Ok(res.rows_affected > 0)
        })?;
        if !updated {
            tracing::warn!(card_id = %card.id, "card was used concurrently");
        }
        tracing::info!(
            card_id = %card.id,
            authorization = %auth.authorization_ref,
            amount_minor = auth.amount_minor,
            merchant = auth.merchant.as_deref().unwrap_or("-"),
            "card authorization approved"
        );
        Ok(true)
    }

    async fn mark_card_expired(&self, card: &VirtualCard) -> ResultEngine<()> {
        with_tx!(self, |db_tx| {
            virtual_cards::Entity::update_many()
                .col_expr(
                    virtual_cards::Column::Status,
                    Expr::value(CardStatus::Expired.as_str()),
                )
                .filter(virtual_cards::Column::Id.eq(card.id.to_string()))
                .filter(virtual_cards::Column::Status.eq(CardStatus::Active.as_str()))
                .exec(&db_tx)
                .await?;
            Ok(())
        })
    }
}

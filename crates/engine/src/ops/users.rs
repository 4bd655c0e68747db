use chrono::{Duration, Utc};
use sea_orm::{
    ActiveModelTrait, ActiveValue, DatabaseTransaction, JoinType, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, RelationTrait, TransactionTrait, prelude::*, sea_query::Expr,
};
use serde::{Deserialize, Serialize};

use crate::{
    EngineError, ResultEngine, bill_participants, bills,
    group_members::{self, MemberStatus},
    investments::{self, Investment},
    notifications::{self, Notification},
    transactions::{self, Transaction, TransactionKind, TransactionStatus},
    users,
    util::{normalize_optional_text, normalize_required_name},
};

use super::{Engine, with_tx};

const RECENT_TRANSACTIONS: u64 = 10;
const NOTIFICATIONS_PAGE: u64 = 100;

/// Per-user overview.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dashboard {
    /// Sum of completed split payments.
    pub total_paid_minor: i64,
    pub dividends_minor: i64,
    /// Bills the user takes part in, created in the last 30 days.
    pub bills_last_30_days: u64,
    /// Market value of every position held by the user's active groups.
    pub portfolio_value_minor: i64,
    pub recent_transactions: Vec<Transaction>,
}

impl Engine {
    pub async fn create_user(
        &self,
        username: &str,
        password: &str,
        display_name: Option<&str>,
    ) -> ResultEngine<()> {
        let username = normalize_required_name(username, "username")?;
        if password.is_empty() {
            return Err(EngineError::Validation(
                "password must not be empty".to_string(),
            ));
        }
        with_tx!(self, |db_tx| {
            if users::Entity::find_by_id(username.clone())
                .one(&db_tx)
                .await?
                .is_some()
            {
                return Err(EngineError::ExistingKey(username));
            }
            users::ActiveModel {
                username: ActiveValue::Set(username.clone()),
                password: ActiveValue::Set(password.to_string()),
                display_name: ActiveValue::Set(normalize_optional_text(display_name)),
                phone: ActiveValue::Set(None),
                payment_customer_ref: ActiveValue::Set(None),
                bank_access_token: ActiveValue::Set(None),
            }
            .insert(&db_tx)
            .await?;
            Ok(())
        })
    }

    /// Stores the payment gateway customer used to charge this user.
    pub async fn link_payment_method(
        &self,
        username: &str,
        customer_ref: &str,
    ) -> ResultEngine<()> {
        let customer_ref = customer_ref.trim();
        if customer_ref.is_empty() {
            return Err(EngineError::Validation(
                "customer reference must not be empty".to_string(),
            ));
        }
        with_tx!(self, |db_tx| {
            let user = self.require_user(&db_tx, username).await?;
            let mut user: users::ActiveModel = user.into();
            user.payment_customer_ref = ActiveValue::Set(Some(customer_ref.to_string()));
            user.update(&db_tx).await?;
            tracing::info!(%username, "payment method linked");
            Ok(())
        })
    }

    /// Exchanges a bank-link public token and stores the access token.
    ///
    /// The gateway call runs outside any DB transaction.
    pub async fn link_bank_account(&self, username: &str, public_token: &str) -> ResultEngine<()> {
        if public_token.trim().is_empty() {
            return Err(EngineError::Validation(
                "public token must not be empty".to_string(),
            ));
        }
        with_tx!(self, |db_tx| {
            self.require_user(&db_tx, username).await?;
            Ok(())
        })?;

        let access_token = self
            .bank_link
            .exchange(public_token.trim())
            .await
            .inspect_err(|err| tracing::warn!(%username, error = %err, "bank link failed"))?;

        with_tx!(self, |db_tx| {
            let user = self.require_user(&db_tx, username).await?;
            let mut user: users::ActiveModel = user.into();
            user.bank_access_token = ActiveValue::Set(Some(access_token));
            user.update(&db_tx).await?;
            tracing::info!(%username, "bank account linked");
            Ok(())
        })
    }

    /// Newest first.
    pub async fn list_notifications(
        &self,
        username: &str,
        unread_only: bool,
    ) -> ResultEngine<Vec<Notification>> {
        with_tx!(self, |db_tx| {
            self.require_user(&db_tx, username).await?;
            let mut query = notifications::Entity::find()
                .filter(notifications::Column::Username.eq(username.to_string()));
            if unread_only {
                query = query.filter(notifications::Column::Read.eq(false));
            }
            query
                .order_by_desc(notifications::Column::CreatedAt)
                .limit(NOTIFICATIONS_PAGE)
                .all(&db_tx)
                .await?
                .into_iter()
                .map(Notification::try_from)
                .collect::<ResultEngine<Vec<_>>>()
        })
    }

    /// Marks one of the user's notifications as read. Other users'
    /// notifications look missing.
    pub async fn mark_notification_read(
        &self,
        notification_id: &str,
        username: &str,
    ) -> ResultEngine<()> {
        with_tx!(self, |db_tx| {
            let res = notifications::Entity::update_many()
                .col_expr(notifications::Column::Read, Expr::value(true))
                .filter(notifications::Column::Id.eq(notification_id.to_string()))
                .filter(notifications::Column::Username.eq(username.to_string()))
                .exec(&db_tx)
                .await?;
            if res.rows_affected == 0 {
                return Err(EngineError::KeyNotFound(
                    "notification not exists".to_string(),
                ));
            }
            Ok(())
        })
    }

    pub async fn dashboard(&self, username: &str) -> ResultEngine<Dashboard> {
        with_tx!(self, |db_tx| {
            self.require_user(&db_tx, username).await?;

            let total_paid_minor =
                sum_completed(&db_tx, username, TransactionKind::SplitPayment).await?;
            let dividends_minor = sum_completed(&db_tx, username, TransactionKind::Dividend).await?;

            let cutoff = Utc::now() - Duration::days(30);
            let bills_last_30_days = bill_participants::Entity::find()
                .join(JoinType::InnerJoin, bill_participants::Relation::Bills.def())
                .filter(bill_participants::Column::Username.eq(username.to_string()))
                .filter(bills::Column::CreatedAt.gte(cutoff))
                .count(&db_tx)
                .await?;

            let group_ids: Vec<String> = group_members::Entity::find()
                .select_only()
                .column(group_members::Column::GroupId)
                .filter(group_members::Column::Username.eq(username.to_string()))
                .filter(group_members::Column::Status.eq(MemberStatus::Active.as_str()))
                .into_tuple()
                .all(&db_tx)
                .await?;
            let positions = investments::Entity::find()
                .filter(investments::Column::GroupId.is_in(group_ids))
                .all(&db_tx)
                .await?;
            let mut portfolio_value_minor = 0i64;
            for position in positions {
                let position = Investment::try_from(position)?;
                portfolio_value_minor =
                    portfolio_value_minor.saturating_add(position.total_value_minor());
            }

            let recent_transactions = transactions::Entity::find()
                .filter(transactions::Column::Username.eq(username.to_string()))
                .order_by_desc(transactions::Column::CreatedAt)
                .limit(RECENT_TRANSACTIONS)
                .all(&db_tx)
                .await?
                .into_iter()
                .map(Transaction::try_from)
                .collect::<ResultEngine<Vec<_>>>()?;

            Ok(Dashboard {
                total_paid_minor,
                dividends_minor,
                bills_last_30_days,
                portfolio_value_minor,
                recent_transactions,
            })
        })
    }
}

async fn sum_completed(
    db: &DatabaseTransaction,
    username: &str,
    kind: TransactionKind,
) -> ResultEngine<i64> {
    let total: Option<Option<i64>> = transactions::Entity::find()
        .select_only()
        .column_as(transactions::Column::AmountMinor.sum(), "total")
        .filter(transactions::Column::Username.eq(username.to_string()))
        .filter(transactions::Column::Kind.eq(kind.as_str()))
        .filter(transactions::Column::Status.eq(TransactionStatus::Completed.as_str()))
        .into_tuple()
        .one(db)
        .await?;
    Ok(total.flatten().unwrap_or(0))
}

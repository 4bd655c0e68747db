use sea_orm::{
    ActiveModelTrait, DatabaseTransaction, QueryFilter, QueryOrder, QuerySelect,
    TransactionTrait, prelude::*, sea_query::Expr,
};

use crate::{
    ResultEngine, group_members,
    transactions::{self, Transaction},
};

use super::{Engine, with_tx};

impl Engine {
    /// Appends a ledger entry and moves the member's running balance in the
    /// entry's group.
    pub(super) async fn record_transaction(
        &self,
        db: &DatabaseTransaction,
        tx: &Transaction,
    ) -> ResultEngine<()> {
        transactions::ActiveModel::from(tx).insert(db).await?;
        if let Some(group_id) = &tx.group_id {
            group_members::Entity::update_many()
                .col_expr(
                    group_members::Column::BalanceMinor,
                    Expr::col(group_members::Column::BalanceMinor).add(tx.signed_amount_minor()),
                )
                .filter(group_members::Column::GroupId.eq(group_id.clone()))
                .filter(group_members::Column::Username.eq(tx.username.clone()))
                .exec(db)
                .await?;
        }
        Ok(())
    }

    /// Most recent ledger entries of a user, newest first.
    pub async fn user_transactions(
        &self,
        username: &str,
        limit: u64,
    ) -> ResultEngine<Vec<Transaction>> {
        with_tx!(self, |db_tx| {
            self.require_user(&db_tx, username).await?;
            let rows = transactions::Entity::find()
                .filter(transactions::Column::Username.eq(username.to_string()))
                .order_by_desc(transactions::Column::CreatedAt)
                .limit(limit)
                .all(&db_tx)
                .await?;
            rows.into_iter()
                .map(Transaction::try_from)
                .collect::<ResultEngine<Vec<_>>>()
        })
    }

    /// Ledger entries scoped to one group, oldest first. Members only.
    pub async fn group_transactions(
        &self,
        group_id: &str,
        username: &str,
    ) -> ResultEngine<Vec<Transaction>> {
        with_tx!(self, |db_tx| {
            self.require_member(&db_tx, group_id, username).await?;
            let rows = transactions::Entity::find()
                .filter(transactions::Column::GroupId.eq(group_id.to_string()))
                .order_by_asc(transactions::Column::CreatedAt)
                .all(&db_tx)
                .await?;
            rows.into_iter()
                .map(Transaction::try_from)
                .collect::<ResultEngine<Vec<_>>>()
        })
    }
}

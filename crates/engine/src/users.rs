//! Users table.
//!
//! Users are keyed by `username`; memberships, bills and ledger entries all
//! reference it.

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "users")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub username: String,
    pub password: String,
    pub display_name: Option<String>,
    pub phone: Option<String>,
    /// Customer id at the payment gateway; `Some` means a payment method is
    /// linked.
    pub payment_customer_ref: Option<String>,
    pub bank_access_token: Option<String>,
}

impl Model {
    pub fn has_payment_method(&self) -> bool {
        self.payment_customer_ref
            .as_deref()
            .is_some_and(|r| !r.trim().is_empty())
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

//! Ledger entries.
//!
//! A `Transaction` is an immutable money movement for one user. Entries are
//! append-only; replaying a user's entries reconstructs their balance
//! history.

use chrono::{DateTime, Utc};
use sea_orm::{ActiveValue, entity::prelude::*};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Currency, EngineError, ResultEngine, util::parse_uuid};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    SplitPayment,
    SplitReceipt,
    InvestmentBuy,
    InvestmentSell,
    Dividend,
    Interest,
    Deposit,
    Withdrawal,
    Transfer,
    Fee,
    Refund,
}

impl TransactionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SplitPayment => "split_payment",
            Self::SplitReceipt => "split_receipt",
            Self::InvestmentBuy => "investment_buy",
            Self::InvestmentSell => "investment_sell",
            Self::Dividend => "dividend",
            Self::Interest => "interest",
            Self::Deposit => "deposit",
            Self::Withdrawal => "withdrawal",
            Self::Transfer => "transfer",
            Self::Fee => "fee",
            Self::Refund => "refund",
        }
    }
}

impl TryFrom<&str> for TransactionKind {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "split_payment" => Ok(Self::SplitPayment),
            "split_receipt" => Ok(Self::SplitReceipt),
            "investment_buy" => Ok(Self::InvestmentBuy),
            "investment_sell" => Ok(Self::InvestmentSell),
            "dividend" => Ok(Self::Dividend),
            "interest" => Ok(Self::Interest),
            "deposit" => Ok(Self::Deposit),
            "withdrawal" => Ok(Self::Withdrawal),
            "transfer" => Ok(Self::Transfer),
            "fee" => Ok(Self::Fee),
            "refund" => Ok(Self::Refund),
            other => Err(EngineError::Validation(format!(
                "invalid transaction kind: {other}"
            ))),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Debit,
    Credit,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Debit => "debit",
            Self::Credit => "credit",
        }
    }

    /// Applies the direction to a positive amount: credits add, debits
    /// subtract.
    pub fn signed(self, amount_minor: i64) -> i64 {
        match self {
            Self::Debit => -amount_minor,
            Self::Credit => amount_minor,
        }
    }
}

impl TryFrom<&str> for Direction {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "debit" => Ok(Self::Debit),
            "credit" => Ok(Self::Credit),
            other => Err(EngineError::Validation(format!(
                "invalid direction: {other}"
            ))),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Reversed,
}

impl TransactionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Reversed => "reversed",
        }
    }
}

impl TryFrom<&str> for TransactionStatus {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "reversed" => Ok(Self::Reversed),
            other => Err(EngineError::Validation(format!(
                "invalid transaction status: {other}"
            ))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    pub username: String,
    pub group_id: Option<String>,
    pub bill_id: Option<String>,
    pub investment_id: Option<String>,
    pub vote_id: Option<String>,
    pub kind: TransactionKind,
    pub direction: Direction,
    pub amount_minor: i64,
    pub currency: Currency,
    pub status: TransactionStatus,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    pub fn new(
        username: &str,
        kind: TransactionKind,
        direction: Direction,
        amount_minor: i64,
        currency: Currency,
    ) -> ResultEngine<Self> {
        if amount_minor <= 0 {
            return Err(EngineError::InvalidAmount(
                "amount_minor must be > 0".to_string(),
            ));
        }
        Ok(Self {
            id: Uuid::new_v4(),
            username: username.to_string(),
            group_id: None,
            bill_id: None,
            investment_id: None,
            vote_id: None,
            kind,
            direction,
            amount_minor,
            currency,
            status: TransactionStatus::Completed,
            description: None,
            created_at: Utc::now(),
        })
    }

    #[must_use]
    pub fn group(mut self, group_id: impl Into<String>) -> Self {
        self.group_id = Some(group_id.into());
        self
    }

    #[must_use]
    pub fn bill(mut self, bill_id: impl Into<String>) -> Self {
        self.bill_id = Some(bill_id.into());
        self
    }

    #[must_use]
    pub fn investment(mut self, investment_id: impl Into<String>) -> Self {
        self.investment_id = Some(investment_id.into());
        self
    }

    #[must_use]
    pub fn vote(mut self, vote_id: impl Into<String>) -> Self {
        self.vote_id = Some(vote_id.into());
        self
    }

    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn signed_amount_minor(&self) -> i64 {
        self.direction.signed(self.amount_minor)
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "transactions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub username: String,
    pub group_id: Option<String>,
    pub bill_id: Option<String>,
    pub investment_id: Option<String>,
    pub vote_id: Option<String>,
    pub kind: String,
    pub direction: String,
    pub amount_minor: i64,
    pub currency: String,
    pub status: String,
    pub description: Option<String>,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl From<&Transaction> for ActiveModel {
    fn from(tx: &Transaction) -> Self {
        Self {
            id: ActiveValue::Set(tx.id.to_string()),
            username: ActiveValue::Set(tx.username.clone()),
            group_id: ActiveValue::Set(tx.group_id.clone()),
            bill_id: ActiveValue::Set(tx.bill_id.clone()),
            investment_id: ActiveValue::Set(tx.investment_id.clone()),
            vote_id: ActiveValue::Set(tx.vote_id.clone()),
            kind: ActiveValue::Set(tx.kind.as_str().to_string()),
            direction: ActiveValue::Set(tx.direction.as_str().to_string()),
            amount_minor: ActiveValue::Set(tx.amount_minor),
            currency: ActiveValue::Set(tx.currency.code().to_string()),
            status: ActiveValue::Set(tx.status.as_str().to_string()),
            description: ActiveValue::Set(tx.description.clone()),
            created_at: ActiveValue::Set(tx.created_at),
        }
    }
}

impl TryFrom<Model> for Transaction {
    type Error = EngineError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        Ok(Self {
            id: parse_uuid(&model.id, "transaction")?,
            username: model.username,
            group_id: model.group_id,
            bill_id: model.bill_id,
            investment_id: model.investment_id,
            vote_id: model.vote_id,
            kind: TransactionKind::try_from(model.kind.as_str())?,
            direction: Direction::try_from(model.direction.as_str())?,
            amount_minor: model.amount_minor,
            currency: Currency::try_from(model.currency.as_str()).unwrap_or_default(),
            status: TransactionStatus::try_from(model.status.as_str())?,
            description: model.description,
            created_at: model.created_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[should_panic(expected = "InvalidAmount(\"amount_minor must be > 0\")")]
    fn zero_amount_is_rejected() {
        Transaction::new(
            "alice",
            TransactionKind::Deposit,
            Direction::Credit,
            0,
            Currency::Usd,
        )
        .unwrap();
    }

    #[test]
    fn debit_is_negative() {
        let tx = Transaction::new(
            "alice",
            TransactionKind::SplitPayment,
            Direction::Debit,
            12_50,
            Currency::Usd,
        )
        .unwrap()
        .bill("b1");
        assert_eq!(tx.signed_amount_minor(), -12_50);
        assert_eq!(tx.bill_id.as_deref(), Some("b1"));
        assert_eq!(tx.status, TransactionStatus::Completed);
    }
}

//! External collaborators.
//!
//! Payments, card issuing, bank linking, out-of-band notification delivery,
//! receipt OCR and realtime broadcast are all reached through the traits below. The
//! engine holds them as `Arc<dyn ...>` and every trait ships with a variant
//! that does nothing, so a deployment can run with any subset configured.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{Currency, notifications::Notification};

/// Failures reported by an external collaborator.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum GatewayError {
    #[error("charge declined: {0}")]
    Declined(String),
    #[error("gateway unreachable: {0}")]
    Network(String),
    #[error("invalid customer: {0}")]
    InvalidCustomer(String),
    #[error("gateway not configured")]
    NotConfigured,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChargeRequest {
    pub customer_ref: String,
    pub amount_minor: i64,
    pub currency: Currency,
    /// Stable per (bill, participant): a redelivered settlement job must not
    /// charge twice.
    pub idempotency_key: String,
    pub description: String,
    pub metadata: BTreeMap<String, String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChargeReceipt {
    pub reference: String,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn charge(&self, request: &ChargeRequest) -> Result<ChargeReceipt, GatewayError>;

    /// When false the settlement workflow skips charging and leaves
    /// participants pending.
    fn is_enabled(&self) -> bool {
        true
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct DisabledPayments;

#[async_trait]
impl PaymentGateway for DisabledPayments {
    async fn charge(&self, _request: &ChargeRequest) -> Result<ChargeReceipt, GatewayError> {
        Err(GatewayError::NotConfigured)
    }

    fn is_enabled(&self) -> bool {
        false
    }
}

/// Approves every charge, except customers whose reference starts with
/// `decline`. The charge reference is derived from the idempotency key, so
/// retries return the same reference.
#[derive(Clone, Copy, Debug, Default)]
pub struct SimulatedPayments;

#[async_trait]
impl PaymentGateway for SimulatedPayments {
    async fn charge(&self, request: &ChargeRequest) -> Result<ChargeReceipt, GatewayError> {
        if request.customer_ref.trim().is_empty() {
            return Err(GatewayError::InvalidCustomer(
                "empty customer reference".to_string(),
            ));
        }
        if request.customer_ref.starts_with("decline") {
            return Err(GatewayError::Declined(format!(
                "card of {} declined",
                request.customer_ref
            )));
        }
        tracing::debug!(
            key = %request.idempotency_key,
            amount_minor = request.amount_minor,
            "simulated charge"
        );
        Ok(ChargeReceipt {
            reference: format!("sim_ch_{}", request.idempotency_key.replace(':', "_")),
        })
    }
}

/// A single-use virtual card to pay a bill at the merchant.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CardRequest {
    pub bill_id: String,
    pub group_id: String,
    pub cardholder: String,
    /// Per-authorization limit, in cents.
    pub spending_limit_minor: i64,
    pub currency: Currency,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IssuedCard {
    /// Issuer reference; `None` for a stub card.
    pub reference: Option<String>,
    pub last4: String,
    pub brand: String,
}

impl IssuedCard {
    /// Placeholder recorded when no issuer is configured or issuing failed.
    pub fn stub() -> Self {
        Self {
            reference: None,
            last4: "0000".to_string(),
            brand: "virtual".to_string(),
        }
    }
}

#[async_trait]
pub trait CardIssuer: Send + Sync {
    async fn issue(&self, request: &CardRequest) -> Result<IssuedCard, GatewayError>;

    /// Approves a pending authorization made with an issued card.
    async fn approve_authorization(&self, authorization_ref: &str) -> Result<(), GatewayError>;

    /// When false the engine records a stub card without calling `issue`.
    fn is_enabled(&self) -> bool {
        true
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct DisabledCardIssuer;

#[async_trait]
impl CardIssuer for DisabledCardIssuer {
    async fn issue(&self, _request: &CardRequest) -> Result<IssuedCard, GatewayError> {
        Err(GatewayError::NotConfigured)
    }

    async fn approve_authorization(&self, _authorization_ref: &str) -> Result<(), GatewayError> {
        Err(GatewayError::NotConfigured)
    }

    fn is_enabled(&self) -> bool {
        false
    }
}

/// Issues cards with a reference derived from bill and cardholder, so a
/// repeated request yields the same card.
#[derive(Clone, Copy, Debug, Default)]
pub struct SimulatedCardIssuer;

#[async_trait]
impl CardIssuer for SimulatedCardIssuer {
    async fn issue(&self, request: &CardRequest) -> Result<IssuedCard, GatewayError> {
        if request.spending_limit_minor <= 0 {
            return Err(GatewayError::Declined(
                "spending limit must be positive".to_string(),
            ));
        }
        tracing::debug!(
            bill_id = %request.bill_id,
            cardholder = %request.cardholder,
            limit_minor = request.spending_limit_minor,
            "simulated card"
        );
        Ok(IssuedCard {
            reference: Some(format!("sim_card_{}_{}", request.bill_id, request.cardholder)),
            last4: "4242".to_string(),
            brand: "visa".to_string(),
        })
    }

    async fn approve_authorization(&self, authorization_ref: &str) -> Result<(), GatewayError> {
        tracing::debug!(%authorization_ref, "simulated authorization approval");
        Ok(())
    }
}

#[async_trait]
pub trait BankLinkGateway: Send + Sync {
    /// Exchanges a short-lived public token for a long-lived access token.
    async fn exchange(&self, public_token: &str) -> Result<String, GatewayError>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct DisabledBankLink;

#[async_trait]
impl BankLinkGateway for DisabledBankLink {
    async fn exchange(&self, _public_token: &str) -> Result<String, GatewayError> {
        Err(GatewayError::NotConfigured)
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SimulatedBankLink;

#[async_trait]
impl BankLinkGateway for SimulatedBankLink {
    async fn exchange(&self, public_token: &str) -> Result<String, GatewayError> {
        let token = public_token.trim();
        if token.is_empty() {
            return Err(GatewayError::InvalidCustomer("empty public token".to_string()));
        }
        Ok(format!("access-sim-{token}"))
    }
}

/// Out-of-band delivery (push, SMS). The notification row is already
/// persisted when this runs; failures are only logged.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn deliver(&self, notification: &Notification) -> Result<(), GatewayError>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn deliver(&self, notification: &Notification) -> Result<(), GatewayError> {
        tracing::info!(
            user = %notification.username,
            kind = notification.kind.as_str(),
            title = %notification.title,
            "notification"
        );
        Ok(())
    }
}

/// A line extracted from a receipt image.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScannedItem {
    pub name: String,
    pub price_minor: i64,
}

#[async_trait]
pub trait ReceiptScanner: Send + Sync {
    async fn extract_items(&self, image: &[u8]) -> Result<Vec<ScannedItem>, GatewayError>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct NoScanner;

#[async_trait]
impl ReceiptScanner for NoScanner {
    async fn extract_items(&self, _image: &[u8]) -> Result<Vec<ScannedItem>, GatewayError> {
        Err(GatewayError::NotConfigured)
    }
}

/// Realtime event pushed to subscribers of a topic.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum Event {
    NewVote {
        vote_id: String,
        group_id: String,
        proposed_by: String,
        action: String,
        symbol: String,
        amount_minor: i64,
    },
    VoteResult {
        vote_id: String,
        group_id: String,
        status: String,
    },
    TradeExecuted {
        vote_id: String,
        group_id: String,
        investment_id: Option<String>,
    },
    SplitUpdated {
        bill_id: String,
        group_id: String,
        status: String,
    },
    PaymentUpdated {
        bill_id: String,
        username: String,
        status: String,
    },
    MemberJoined {
        group_id: String,
        username: String,
    },
    Notification {
        id: String,
        kind: String,
        title: String,
        message: String,
    },
}

pub fn user_topic(username: &str) -> String {
    format!("user:{username}")
}

pub fn group_topic(group_id: &str) -> String {
    format!("group:{group_id}")
}

pub fn bill_topic(bill_id: &str) -> String {
    format!("bill:{bill_id}")
}

/// Best-effort pub/sub. Publishing never fails the caller.
pub trait Broadcast: Send + Sync {
    fn publish(&self, topic: &str, event: &Event);
}

#[derive(Clone, Copy, Debug, Default)]
pub struct NoBroadcast;

impl Broadcast for NoBroadcast {
    fn publish(&self, _topic: &str, _event: &Event) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(customer: &str) -> ChargeRequest {
        ChargeRequest {
            customer_ref: customer.to_string(),
            amount_minor: 1_00,
            currency: Currency::Usd,
            idempotency_key: "bill:alice".to_string(),
            description: "test".to_string(),
            metadata: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn simulated_payments_are_idempotent_per_key() {
        let first = SimulatedPayments.charge(&request("cus_1")).await.unwrap();
        let second = SimulatedPayments.charge(&request("cus_1")).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.reference, "sim_ch_bill_alice");
    }

    #[tokio::test]
    async fn simulated_payments_decline_marked_customers() {
        let err = SimulatedPayments
            .charge(&request("decline_me"))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Declined(_)));
    }

    #[tokio::test]
    async fn disabled_payments_report_not_configured() {
        assert!(!DisabledPayments.is_enabled());
        let err = DisabledPayments.charge(&request("cus_1")).await.unwrap_err();
        assert_eq!(err, GatewayError::NotConfigured);
    }

    fn card_request(limit_minor: i64) -> CardRequest {
        CardRequest {
            bill_id: "b1".to_string(),
            group_id: "g1".to_string(),
            cardholder: "alice".to_string(),
            spending_limit_minor: limit_minor,
            currency: Currency::Usd,
        }
    }

    #[tokio::test]
    async fn simulated_cards_are_stable_per_bill_and_holder() {
        let first = SimulatedCardIssuer.issue(&card_request(10_00)).await.unwrap();
        let second = SimulatedCardIssuer.issue(&card_request(10_00)).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.reference.as_deref(), Some("sim_card_b1_alice"));
        assert!(SimulatedCardIssuer.issue(&card_request(0)).await.is_err());
    }

    #[tokio::test]
    async fn disabled_issuer_reports_not_configured() {
        assert!(!DisabledCardIssuer.is_enabled());
        let err = DisabledCardIssuer
            .issue(&card_request(10_00))
            .await
            .unwrap_err();
        assert_eq!(err, GatewayError::NotConfigured);
        assert_eq!(IssuedCard::stub().last4, "0000");
    }

    #[test]
    fn events_serialize_with_kebab_tag() {
        let event = Event::SplitUpdated {
            bill_id: "b1".to_string(),
            group_id: "g1".to_string(),
            status: "completed".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "split-updated");
        assert_eq!(json["bill_id"], "b1");
    }
}

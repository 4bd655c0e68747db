use serde::{Deserialize, Serialize};

pub mod group {
    use super::*;

    #[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(rename_all = "snake_case")]
    pub enum GroupKind {
        Friends,
        Family,
        Roommates,
        Colleagues,
        InvestmentClub,
        Custom,
    }

    #[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(rename_all = "snake_case")]
    pub enum InvestmentStrategy {
        Conservative,
        Moderate,
        Aggressive,
        Custom,
    }

    /// Role of a user in a group.
    ///
    /// - `owner`: created the group; cannot be invited or changed.
    /// - `admin`: can invite, change member status and the vote threshold.
    /// - `member`: can split bills and vote.
    /// - `viewer`: read-only.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(rename_all = "snake_case")]
    pub enum MemberRole {
        Owner,
        Admin,
        Member,
        Viewer,
    }

    #[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(rename_all = "snake_case")]
    pub enum MemberStatus {
        Active,
        Invited,
        Pending,
        Suspended,
        Removed,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct GroupNew {
        pub name: String,
        pub description: Option<String>,
        pub kind: Option<GroupKind>,
        pub strategy: Option<InvestmentStrategy>,
        /// Percentage of the electorate that must vote `yes` (1..=100).
        pub vote_threshold_pct: Option<u8>,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct GroupCreated {
        pub id: String,
    }

    /// Request body for inviting a user.
    #[derive(Debug, Serialize, Deserialize)]
    pub struct MemberInvite {
        pub username: String,
        pub role: MemberRole,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct MemberStatusUpdate {
        pub status: MemberStatus,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct ThresholdUpdate {
        pub vote_threshold_pct: u8,
    }
}

pub mod bill {
    use super::*;

    #[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(rename_all = "snake_case")]
    pub enum BillStatus {
        Draft,
        Pending,
        Processing,
        Completed,
        Failed,
        Cancelled,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct LineItemNew {
        /// Unique within the bill; claims refer to it.
        pub id: u32,
        pub name: String,
        pub price_minor: i64,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct ClaimNew {
        pub username: String,
        pub item_ids: Vec<u32>,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct BillNew {
        pub group_id: String,
        pub merchant: Option<String>,
        #[serde(default)]
        pub items: Vec<LineItemNew>,
        #[serde(default)]
        pub tax_minor: i64,
        #[serde(default)]
        pub tip_minor: i64,
        pub claims: Vec<ClaimNew>,
        /// Base64 encoded receipt image. When it scans, its items replace
        /// `items`.
        pub receipt_image: Option<String>,
        /// Store without starting settlement.
        #[serde(default)]
        pub draft: bool,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct BillCreated {
        pub id: String,
    }

    #[derive(Debug, Default, Serialize, Deserialize)]
    pub struct BillListQuery {
        pub status: Option<BillStatus>,
        pub created_by: Option<String>,
    }

    /// Result of a manual charge retry.
    #[derive(Debug, Serialize, Deserialize)]
    pub struct RetryResult {
        pub status: String,
    }
}

pub mod investment {
    use super::*;

    #[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(rename_all = "snake_case")]
    pub enum TradeAction {
        Buy,
        Sell,
        Hold,
        Rebalance,
    }

    #[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(rename_all = "snake_case")]
    pub enum Decision {
        Yes,
        No,
        Abstain,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct ProposalNew {
        pub group_id: String,
        pub action: TradeAction,
        pub symbol: String,
        pub amount_minor: i64,
        /// Micro-shares (6 decimals).
        pub shares_micros: Option<i64>,
        pub reasoning: Option<String>,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct ProposalCreated {
        pub vote_id: String,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct VoteCast {
        pub vote_id: String,
        pub decision: Decision,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct VoteCastResult {
        pub status: String,
    }
}

pub mod user {
    use super::*;

    #[derive(Debug, Serialize, Deserialize)]
    pub struct PaymentMethodLink {
        pub customer_ref: String,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct BankExchange {
        pub public_token: String,
    }

    #[derive(Debug, Default, Serialize, Deserialize)]
    pub struct NotificationQuery {
        #[serde(default)]
        pub unread_only: bool,
    }

    #[derive(Debug, Default, Serialize, Deserialize)]
    pub struct TransactionQuery {
        pub limit: Option<u64>,
    }
}

pub mod webhook {
    use super::*;

    #[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(rename_all = "snake_case")]
    pub enum ChargeStatus {
        Succeeded,
        Failed,
    }

    /// Charge result posted by the payment gateway.
    #[derive(Debug, Serialize, Deserialize)]
    pub struct PaymentWebhook {
        pub bill_id: String,
        pub username: String,
        pub status: ChargeStatus,
        pub charge_ref: Option<String>,
        pub reason: Option<String>,
    }

    /// Event posted by the card issuer.
    #[derive(Debug, Serialize, Deserialize)]
    #[serde(tag = "type", content = "data")]
    pub enum IssuingWebhook {
        #[serde(rename = "issuing_card.created")]
        CardCreated { card_ref: String },
        #[serde(rename = "issuing_authorization.created")]
        AuthorizationCreated {
            authorization_ref: String,
            card_ref: String,
            amount_minor: i64,
            merchant: Option<String>,
        },
    }

    #[derive(Debug, Default, Serialize, Deserialize)]
    pub struct IssuingAck {
        /// Set for authorization events only.
        pub approved: Option<bool>,
    }
}

pub mod ws {
    use super::*;

    /// Messages a WebSocket client may send.
    #[derive(Debug, Serialize, Deserialize)]
    #[serde(tag = "type", rename_all = "snake_case")]
    pub enum ClientMessage {
        /// Subscribe to the realtime events of a bill.
        JoinBill { bill_id: String },
        /// Relay an in-progress split edit to the other clients of the bill.
        UpdateSplit {
            bill_id: String,
            payload: serde_json::Value,
        },
    }
}

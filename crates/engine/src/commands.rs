//! Command structs for engine operations.
//!
//! These types group parameters for write operations (group creation, bill
//! creation, investment proposals, gateway events), keeping call sites
//! readable and avoiding long argument lists.

use crate::{
    groups::{GroupKind, InvestmentStrategy},
    split::{Claim, LineItem},
    votes::TradeAction,
};

/// Create a group; the creator becomes its owner.
#[derive(Clone, Debug)]
pub struct CreateGroupCmd {
    pub name: String,
    pub description: Option<String>,
    pub kind: GroupKind,
    pub strategy: InvestmentStrategy,
    pub vote_threshold_pct: Option<u8>,
    pub created_by: String,
}

impl CreateGroupCmd {
    #[must_use]
    pub fn new(name: impl Into<String>, created_by: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            kind: GroupKind::default(),
            strategy: InvestmentStrategy::default(),
            vote_threshold_pct: None,
            created_by: created_by.into(),
        }
    }

    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    #[must_use]
    pub fn kind(mut self, kind: GroupKind) -> Self {
        self.kind = kind;
        self
    }

    #[must_use]
    pub fn strategy(mut self, strategy: InvestmentStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    #[must_use]
    pub fn vote_threshold_pct(mut self, pct: u8) -> Self {
        self.vote_threshold_pct = Some(pct);
        self
    }
}

/// Create a bill and its per-participant obligations.
#[derive(Clone, Debug)]
pub struct CreateBillCmd {
    pub group_id: String,
    pub created_by: String,
    pub merchant: Option<String>,
    pub items: Vec<LineItem>,
    pub tax_minor: i64,
    pub tip_minor: i64,
    pub claims: Vec<Claim>,
    /// Receipt image; when present the scanner's items replace `items`
    /// unless scanning fails.
    pub receipt_image: Option<Vec<u8>>,
    /// Drafts are stored without starting settlement.
    pub draft: bool,
}

impl CreateBillCmd {
    #[must_use]
    pub fn new(group_id: impl Into<String>, created_by: impl Into<String>) -> Self {
        Self {
            group_id: group_id.into(),
            created_by: created_by.into(),
            merchant: None,
            items: Vec::new(),
            tax_minor: 0,
            tip_minor: 0,
            claims: Vec::new(),
            receipt_image: None,
            draft: false,
        }
    }

    #[must_use]
    pub fn merchant(mut self, merchant: impl Into<String>) -> Self {
        self.merchant = Some(merchant.into());
        self
    }

    #[must_use]
    pub fn item(mut self, id: u32, name: impl Into<String>, price_minor: i64) -> Self {
        self.items.push(LineItem::new(id, name, price_minor));
        self
    }

    #[must_use]
    pub fn items(mut self, items: Vec<LineItem>) -> Self {
        self.items = items;
        self
    }

    #[must_use]
    pub fn tax(mut self, tax_minor: i64) -> Self {
        self.tax_minor = tax_minor;
        self
    }

    #[must_use]
    pub fn tip(mut self, tip_minor: i64) -> Self {
        self.tip_minor = tip_minor;
        self
    }

    #[must_use]
    pub fn claim(mut self, participant: impl Into<String>, item_ids: Vec<u32>) -> Self {
        self.claims.push(Claim::new(participant, item_ids));
        self
    }

    #[must_use]
    pub fn claims(mut self, claims: Vec<Claim>) -> Self {
        self.claims = claims;
        self
    }

    #[must_use]
    pub fn receipt_image(mut self, image: Vec<u8>) -> Self {
        self.receipt_image = Some(image);
        self
    }

    #[must_use]
    pub fn draft(mut self, draft: bool) -> Self {
        self.draft = draft;
        self
    }
}

/// Propose a pooled trade to the group.
#[derive(Clone, Debug)]
pub struct ProposeInvestmentCmd {
    pub group_id: String,
    pub proposed_by: String,
    pub action: TradeAction,
    pub symbol: String,
    pub amount_minor: i64,
    pub shares_micros: i64,
    pub reasoning: Option<String>,
}

impl ProposeInvestmentCmd {
    #[must_use]
    pub fn new(
        group_id: impl Into<String>,
        proposed_by: impl Into<String>,
        action: TradeAction,
        symbol: impl Into<String>,
        amount_minor: i64,
    ) -> Self {
        Self {
            group_id: group_id.into(),
            proposed_by: proposed_by.into(),
            action,
            symbol: symbol.into(),
            amount_minor,
            shares_micros: 0,
            reasoning: None,
        }
    }

    #[must_use]
    pub fn shares(mut self, shares_micros: i64) -> Self {
        self.shares_micros = shares_micros;
        self
    }

    #[must_use]
    pub fn reasoning(mut self, reasoning: impl Into<String>) -> Self {
        self.reasoning = Some(reasoning.into());
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PaymentOutcome {
    Succeeded { charge_ref: String },
    Failed { reason: String },
}

/// Authorization request the card issuer raised for a virtual card.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CardAuthorization {
    pub authorization_ref: String,
    pub card_ref: String,
    pub amount_minor: i64,
    pub merchant: Option<String>,
}

/// Asynchronous charge result reported by the payment gateway.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PaymentEvent {
    pub bill_id: String,
    pub username: String,
    pub outcome: PaymentOutcome,
}

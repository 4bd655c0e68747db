//! Core of Splitpot: shared bills, group investment votes and the ledger
//! behind them.
//!
//! Every public operation lives on [`Engine`] and runs in its own database
//! transaction. Side effects on collaborators (payment gateway, notifier,
//! realtime broadcast, job queue) only happen after the commit.

pub use bill_items::BillItem;
pub use bill_participants::{BillParticipant, ParticipantStatus};
pub use bills::{Bill, BillDetail, BillStatus, ReceiptSource, SettlementSummary};
pub use commands::{
    CardAuthorization, CreateBillCmd, CreateGroupCmd, PaymentEvent, PaymentOutcome,
    ProposeInvestmentCmd,
};
pub use currency::Currency;
pub use error::EngineError;
pub use group_members::{GroupMember, MemberRole, MemberStatus};
pub use groups::{Group, GroupKind, InvestmentStrategy};
pub use investments::Investment;
pub use money::{Money, Shares};
pub use notifications::{Notification, NotificationKind};
pub use ops::{
    BillFilter, DEFAULT_VOTE_TTL_HOURS, Dashboard, Engine, EngineBuilder, ExecutionOutcome,
    GroupSummary, SettlementOutcome,
};
pub use split::{Claim, LineItem, Obligation, SplitPlan, split_bill, split_evenly};
pub use transactions::{Direction, Transaction, TransactionKind, TransactionStatus};
pub use virtual_cards::{CardStatus, VirtualCard};
pub use votes::{Ballot, Decision, InvestmentVote, Tally, TradeAction, VoteDetail, VoteStatus};

pub mod gateways;
pub mod jobs;
pub mod users;

mod bill_item_claims;
mod bill_items;
mod bill_participants;
mod bills;
mod commands;
mod currency;
mod error;
mod group_members;
mod groups;
mod investments;
mod money;
mod notifications;
mod ops;
mod split;
mod transactions;
mod util;
mod virtual_cards;
mod vote_ballots;
mod votes;

type ResultEngine<T> = Result<T, EngineError>;

use std::{fmt, sync::Arc};

use chrono::Duration;
use sea_orm::{
    DatabaseConnection, QueryFilter, QueryOrder, QuerySelect, TransactionTrait, prelude::*,
};

use crate::{
    ResultEngine,
    bills::BillStatus,
    gateways::{
        BankLinkGateway, Broadcast, CardIssuer, DisabledBankLink, DisabledCardIssuer,
        DisabledPayments, LogNotifier, NoBroadcast, NoScanner, Notifier, PaymentGateway,
        ReceiptScanner,
    },
    jobs::{Job, JobSender},
    votes::VoteStatus,
};

mod access;
mod bills;
mod cards;
mod execution;
mod groups;
mod ledger;
mod notify;
mod settlement;
mod users;
mod votes;

pub use bills::BillFilter;
pub use execution::ExecutionOutcome;
pub use groups::GroupSummary;
pub use settlement::SettlementOutcome;
pub use users::Dashboard;

pub const DEFAULT_VOTE_TTL_HOURS: i64 = 24;

/// Run a block inside a DB transaction, committing on success and rolling back on error.
macro_rules! with_tx {
    ($self:expr, |$tx:ident| $body:expr) => {{
        let $tx = $self.database.begin().await?;
        let result: $crate::ResultEngine<_> = $body;
        match result {
            Ok(value) => {
                $tx.commit().await?;
                Ok(value)
            }
            Err(err) => Err(err),
        }
    }};
}

pub(crate) use with_tx;

pub struct Engine {
    database: DatabaseConnection,
    payments: Arc<dyn PaymentGateway>,
    cards: Arc<dyn CardIssuer>,
    bank_link: Arc<dyn BankLinkGateway>,
    notifier: Arc<dyn Notifier>,
    scanner: Arc<dyn ReceiptScanner>,
    broadcast: Arc<dyn Broadcast>,
    jobs: Option<JobSender>,
    vote_ttl: Duration,
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("database", &self.database)
            .field("payments_enabled", &self.payments.is_enabled())
            .field("cards_enabled", &self.cards.is_enabled())
            .field("jobs", &self.jobs.is_some())
            .field("vote_ttl", &self.vote_ttl)
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Return a builder for `Engine`. Help to build the struct.
    pub fn builder() -> EngineBuilder {
        EngineBuilder::default()
    }

    pub fn database(&self) -> &DatabaseConnection {
        &self.database
    }

    /// Jobs whose work was interrupted: bills still waiting for or in
    /// settlement and approved votes that were never executed.
    pub async fn unfinished_jobs(&self) -> ResultEngine<Vec<Job>> {
        with_tx!(self, |db_tx| {
            let bill_ids: Vec<String> = crate::bills::Entity::find()
                .select_only()
                .column(crate::bills::Column::Id)
                .filter(crate::bills::Column::Status.is_in([
                    BillStatus::Pending.as_str(),
                    BillStatus::Processing.as_str(),
                ]))
                .order_by_asc(crate::bills::Column::CreatedAt)
                .into_tuple()
                .all(&db_tx)
                .await?;
            let vote_ids: Vec<String> = crate::votes::Entity::find()
                .select_only()
                .column(crate::votes::Column::Id)
                .filter(crate::votes::Column::Status.eq(VoteStatus::Approved.as_str()))
                .order_by_asc(crate::votes::Column::DecidedAt)
                .into_tuple()
                .all(&db_tx)
                .await?;
            Ok(bill_ids
                .into_iter()
                .map(|bill_id| Job::SettleBill { bill_id })
                .chain(vote_ids.into_iter().map(|vote_id| Job::ExecuteTrade { vote_id }))
                .collect())
        })
    }
}

/// The builder for `Engine`.
///
/// Every collaborator defaults to its disabled variant.
#[derive(Default)]
pub struct EngineBuilder {
    database: DatabaseConnection,
    payments: Option<Arc<dyn PaymentGateway>>,
    cards: Option<Arc<dyn CardIssuer>>,
    bank_link: Option<Arc<dyn BankLinkGateway>>,
    notifier: Option<Arc<dyn Notifier>>,
    scanner: Option<Arc<dyn ReceiptScanner>>,
    broadcast: Option<Arc<dyn Broadcast>>,
    jobs: Option<JobSender>,
    vote_ttl: Option<Duration>,
}

impl EngineBuilder {
    /// Pass the required database
    pub fn database(mut self, db: DatabaseConnection) -> EngineBuilder {
        self.database = db;
        self
    }

    pub fn payments(mut self, payments: Arc<dyn PaymentGateway>) -> EngineBuilder {
        self.payments = Some(payments);
        self
    }

    pub fn card_issuer(mut self, cards: Arc<dyn CardIssuer>) -> EngineBuilder {
        self.cards = Some(cards);
        self
    }

    pub fn bank_link(mut self, bank_link: Arc<dyn BankLinkGateway>) -> EngineBuilder {
        self.bank_link = Some(bank_link);
        self
    }

    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> EngineBuilder {
        self.notifier = Some(notifier);
        self
    }

    pub fn scanner(mut self, scanner: Arc<dyn ReceiptScanner>) -> EngineBuilder {
        self.scanner = Some(scanner);
        self
    }

    pub fn broadcast(mut self, broadcast: Arc<dyn Broadcast>) -> EngineBuilder {
        self.broadcast = Some(broadcast);
        self
    }

    /// Queue used for settlement and trade execution. Without one, those
    /// steps only run when called directly.
    pub fn jobs(mut self, jobs: JobSender) -> EngineBuilder {
        self.jobs = Some(jobs);
        self
    }

    /// How long a proposal stays open for voting.
    pub fn vote_ttl(mut self, ttl: Duration) -> EngineBuilder {
        self.vote_ttl = Some(ttl);
        self
    }

    /// Construct `Engine`
    pub async fn build(self) -> ResultEngine<Engine> {
        Ok(Engine {
            database: self.database,
            payments: self.payments.unwrap_or_else(|| Arc::new(DisabledPayments)),
            cards: self.cards.unwrap_or_else(|| Arc::new(DisabledCardIssuer)),
            bank_link: self.bank_link.unwrap_or_else(|| Arc::new(DisabledBankLink)),
            notifier: self.notifier.unwrap_or_else(|| Arc::new(LogNotifier)),
            scanner: self.scanner.unwrap_or_else(|| Arc::new(NoScanner)),
            broadcast: self.broadcast.unwrap_or_else(|| Arc::new(NoBroadcast)),
            jobs: self.jobs,
            vote_ttl: self
                .vote_ttl
                .unwrap_or_else(|| Duration::hours(DEFAULT_VOTE_TTL_HOURS)),
        })
    }
}

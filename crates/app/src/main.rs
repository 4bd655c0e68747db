use std::{sync::Arc, time::Duration};

use clap::Parser;
use engine::{
    Engine,
    gateways::{
        BankLinkGateway, CardIssuer, DisabledBankLink, DisabledCardIssuer, DisabledPayments,
        NoScanner, PaymentGateway, ReceiptScanner, SimulatedBankLink, SimulatedCardIssuer,
        SimulatedPayments,
    },
    jobs::{self, Worker},
};
use migration::{Migrator, MigratorTrait};
use server::{Hub, HttpReceiptScanner, ServerState};
use settings::{Database, GatewayMode};

mod settings;

#[derive(Parser, Debug)]
#[command(name = "splitpot", about = "Shared bills and group investing server")]
struct Args {
    /// Settings file, without extension
    #[arg(short, long, env = "SPLITPOT_CONFIG", default_value = "settings")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let args = Args::parse();
    let settings = settings::Settings::new(&args.config)?;
    let mut tasks = tokio::task::JoinSet::new();

    tracing_subscriber::fmt()
        .with_env_filter(format!(
            "splitpot={level},server={level},engine={level}",
            level = settings.app.level
        ))
        .init();

    let Some(server) = settings.server else {
        tracing::warn!("no [server] section configured, nothing to run");
        return Ok(());
    };
    tracing::info!("Found server settings...");
    let db = parse_database(&server.database).await?;

    let payments: Arc<dyn PaymentGateway> = match settings.payments.mode {
        GatewayMode::Disabled => Arc::new(DisabledPayments),
        GatewayMode::Simulated => Arc::new(SimulatedPayments),
    };
    let cards: Arc<dyn CardIssuer> = match settings.card_issuing.mode {
        GatewayMode::Disabled => Arc::new(DisabledCardIssuer),
        GatewayMode::Simulated => Arc::new(SimulatedCardIssuer),
    };
    let bank_link: Arc<dyn BankLinkGateway> = match settings.bank_link.mode {
        GatewayMode::Disabled => Arc::new(DisabledBankLink),
        GatewayMode::Simulated => Arc::new(SimulatedBankLink),
    };
    let scanner: Arc<dyn ReceiptScanner> = match &settings.ocr {
        Some(ocr) => Arc::new(HttpReceiptScanner::new(&ocr.url)?),
        None => Arc::new(NoScanner),
    };

    let hub = Hub::default();
    let (job_sender, job_receiver) = jobs::queue(settings.worker.queue_size);
    let engine = Arc::new(
        Engine::builder()
            .database(db.clone())
            .payments(payments)
            .card_issuer(cards)
            .bank_link(bank_link)
            .scanner(scanner)
            .broadcast(Arc::new(hub.clone()))
            .jobs(job_sender)
            .vote_ttl(chrono::Duration::hours(settings.voting.ttl_hours))
            .build()
            .await?,
    );

    tasks.spawn(Worker::new(Arc::clone(&engine), job_receiver).run());
    tasks.spawn(sweep_expired_votes(
        Arc::clone(&engine),
        Duration::from_secs(settings.voting.sweep_interval_secs.max(1)),
    ));

    let state = ServerState::new(engine, db, hub).webhook_secret(settings.webhook.secret);
    let bind = server.bind.unwrap_or_else(|| "127.0.0.1".to_string());
    let addr = format!("{}:{}", bind, server.port);
    tasks.spawn(async move { server::run(state, &addr).await });

    while tasks.join_next().await.is_some() {
        tasks.shutdown().await;
    }

    Ok(())
}

async fn sweep_expired_votes(engine: Arc<Engine>, every: Duration) {
    let mut interval = tokio::time::interval(every);
    loop {
        interval.tick().await;
        match engine.expire_votes(chrono::Utc::now()).await {
            Ok(0) => {}
            Ok(expired) => tracing::info!(expired, "expired overdue votes"),
            Err(err) => tracing::warn!("vote expiry sweep failed: {err}"),
        }
    }
}

async fn parse_database(
    config: &settings::Database,
) -> Result<sea_orm::DatabaseConnection, Box<dyn std::error::Error + Send + Sync>> {
    let url = match config {
        Database::Memory => String::from("sqlite::memory:"),
        Database::Sqlite(path) => format!("sqlite:{}?mode=rwc", path),
    };

    let database = sea_orm::Database::connect(url).await?;
    Migrator::up(&database, None).await?;
    Ok(database)
}

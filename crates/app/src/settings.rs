//! Handles settings for the application. Configuration is written in
//! `settings.toml`; every key can be overridden from the environment with the
//! `SPLITPOT__` prefix, e.g. `SPLITPOT__SERVER__PORT=8080`.
use config::{
    Config, ConfigError, Environment, File,
    builder::{ConfigBuilder, DefaultState},
};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct App {
    pub level: String,
}

impl Default for App {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Database {
    Memory,
    Sqlite(String),
}

#[derive(Debug, Deserialize)]
pub struct Server {
    pub bind: Option<String>,
    pub port: u16,
    pub database: Database,
}

/// Which implementation of an external gateway to wire in.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum GatewayMode {
    #[default]
    Disabled,
    Simulated,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Gateway {
    pub mode: GatewayMode,
}

#[derive(Debug, Deserialize)]
pub struct Ocr {
    pub url: String,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Voting {
    pub ttl_hours: i64,
    pub sweep_interval_secs: u64,
}

impl Default for Voting {
    fn default() -> Self {
        Self {
            ttl_hours: engine::DEFAULT_VOTE_TTL_HOURS,
            sweep_interval_secs: 60,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Worker {
    pub queue_size: usize,
}

impl Default for Worker {
    fn default() -> Self {
        Self {
            queue_size: engine::jobs::DEFAULT_QUEUE_SIZE,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Webhook {
    pub secret: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub app: App,
    pub server: Option<Server>,
    #[serde(default)]
    pub payments: Gateway,
    #[serde(default)]
    pub card_issuing: Gateway,
    #[serde(default)]
    pub bank_link: Gateway,
    pub ocr: Option<Ocr>,
    #[serde(default)]
    pub voting: Voting,
    #[serde(default)]
    pub worker: Worker,
    #[serde(default)]
    pub webhook: Webhook,
}

impl Settings {
    pub fn new(path: &str) -> Result<Self, ConfigError> {
        Self::build(Config::builder().add_source(File::with_name(path).required(false)))
    }

    #[cfg(test)]
    fn from_toml(toml: &str) -> Result<Self, ConfigError> {
        Self::build(Config::builder().add_source(File::from_str(toml, config::FileFormat::Toml)))
    }

    fn build(builder: ConfigBuilder<DefaultState>) -> Result<Self, ConfigError> {
        builder
            .add_source(Environment::with_prefix("SPLITPOT").separator("__"))
            .build()?
            .try_deserialize()
    }
}

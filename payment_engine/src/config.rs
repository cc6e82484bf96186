use std::{env, fmt::Display, str::FromStr};

use log::*;
use tokio::time::Duration;

use crate::{
    pe_api::outbox_processor::OutboxConfig,
    provider::{BreakerConfig, ResilienceConfig},
};

const DEFAULT_DATABASE_URL: &str = "sqlite://data/payments.db";
const DEFAULT_MAX_DB_CONNECTIONS: u32 = 25;

/// Engine-wide configuration, read from the environment with logged fallbacks to defaults.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    pub database_url: String,
    pub max_db_connections: u32,
    /// How long a stored idempotent response keeps blocking re-execution of its key.
    pub idempotency_retention: chrono::Duration,
    pub outbox: OutboxConfig,
    pub resilience: ResilienceConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            max_db_connections: DEFAULT_MAX_DB_CONNECTIONS,
            idempotency_retention: chrono::Duration::days(1),
            outbox: OutboxConfig::default(),
            resilience: ResilienceConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn from_env_or_default() -> Self {
        let database_url = env::var("PE_DATABASE_URL").unwrap_or_else(|_| {
            info!("🪛️ PE_DATABASE_URL is not set. Using the default.");
            DEFAULT_DATABASE_URL.to_string()
        });
        let outbox = OutboxConfig {
            interval: Duration::from_secs(parse_var("PE_OUTBOX_INTERVAL_SECS", 10)),
            batch_size: parse_var("PE_OUTBOX_BATCH_SIZE", 20),
        };
        let resilience = ResilienceConfig {
            attempt_timeout: Duration::from_millis(parse_var("PE_PROVIDER_TIMEOUT_MS", 2000)),
            max_retries: parse_var("PE_PROVIDER_RETRIES", 2),
            retry_backoff: Duration::from_millis(parse_var("PE_PROVIDER_RETRY_BACKOFF_MS", 100)),
            breaker: BreakerConfig {
                break_duration: Duration::from_secs(parse_var("PE_PROVIDER_BREAK_SECS", 30)),
                ..BreakerConfig::default()
            },
        };
        Self {
            database_url,
            max_db_connections: parse_var("PE_MAX_DB_CONNECTIONS", DEFAULT_MAX_DB_CONNECTIONS),
            idempotency_retention: chrono::Duration::hours(parse_var("PE_IDEMPOTENCY_RETENTION_HOURS", 24)),
            outbox,
            resilience,
        }
    }
}

fn parse_var<T>(var: &str, default: T) -> T
where
    T: FromStr + Display,
{
    match env::var(var) {
        Ok(s) => s.parse().unwrap_or_else(|_| {
            error!("🪛️ {s} is not a valid value for {var}. Using the default, {default}, instead.");
            default
        }),
        Err(_) => default,
    }
}

//! Configuration loaded from the environment.

use std::env;
use std::time::Duration;

use anyhow::{Context, Result};
use dotenvy::dotenv;
use serde::Deserialize;

#[derive(Deserialize, Clone, Debug)]
pub struct LedgerConfig {
    pub service_name: String,
    pub log_level: String,
    pub database: DatabaseConfig,
    pub engine: EngineConfig,
}

#[derive(Deserialize, Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Deserialize, Clone, Debug)]
pub struct EngineConfig {
    /// Bound on waiting for an account lock before surfacing `Busy`.
    pub lock_wait_ms: u64,
    /// Fresh reference identifiers drawn before giving up on a collision.
    pub max_reference_attempts: u32,
}

impl EngineConfig {
    pub fn lock_wait(&self) -> Duration {
        Duration::from_millis(self.lock_wait_ms)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            lock_wait_ms: 5_000,
            max_reference_attempts: 3,
        }
    }
}

impl LedgerConfig {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        let url = env::var("LEDGER_DATABASE_URL").context("LEDGER_DATABASE_URL must be set")?;
        let max_connections = env::var("LEDGER_DB_MAX_CONNECTIONS")
            .unwrap_or_else(|_| "10".to_string())
            .parse()
            .context("LEDGER_DB_MAX_CONNECTIONS must be a number")?;
        let min_connections = env::var("LEDGER_DB_MIN_CONNECTIONS")
            .unwrap_or_else(|_| "1".to_string())
            .parse()
            .context("LEDGER_DB_MIN_CONNECTIONS must be a number")?;

        let lock_wait_ms = env::var("LEDGER_LOCK_WAIT_MS")
            .unwrap_or_else(|_| "5000".to_string())
            .parse()
            .context("LEDGER_LOCK_WAIT_MS must be a number")?;
        let max_reference_attempts = env::var("LEDGER_REFERENCE_ATTEMPTS")
            .unwrap_or_else(|_| "3".to_string())
            .parse()
            .context("LEDGER_REFERENCE_ATTEMPTS must be a number")?;

        let log_level = env::var("LEDGER_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            service_name: "ledger-engine".to_string(),
            log_level,
            database: DatabaseConfig {
                url,
                max_connections,
                min_connections,
            },
            engine: EngineConfig {
                lock_wait_ms,
                max_reference_attempts,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_defaults_are_bounded() {
        let config = EngineConfig::default();
        assert_eq!(config.lock_wait(), Duration::from_secs(5));
        assert!(config.max_reference_attempts >= 1);
    }
}

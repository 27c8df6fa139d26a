use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::env;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    /// How often the deadline sweeper runs, in seconds
    pub sweep_interval_secs: u64,
    /// Maximum slots processed per sweeper scan per tick
    pub sweep_batch_size: i64,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        Ok(Self {
            database_url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            sweep_interval_secs: env::var("SWEEP_INTERVAL_SECS")
                .unwrap_or_else(|_| "60".to_string())
                .parse()
                .context("SWEEP_INTERVAL_SECS must be a valid number")?,
            sweep_batch_size: env::var("SWEEP_BATCH_SIZE")
                .unwrap_or_else(|_| "100".to_string())
                .parse()
                .context("SWEEP_BATCH_SIZE must be a valid number")?,
        })
    }
}

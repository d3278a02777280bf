use anyhow::{Context, Result};
use crafting_core::config::MarketApiConfig;
use std::env;
use tracing::warn;

pub const DEFAULT_REFRESH_INTERVAL_MINS: u32 = 20;

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub http_port: u16,
    /// Minutes between scheduled cycles, aligned to the top of the hour.
    pub refresh_interval_mins: u32,
    pub refresh_on_startup: bool,
    pub market: MarketApiConfig,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            database_url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            http_port: env::var("HTTP_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(8080),
            refresh_interval_mins: aligned_interval_mins(
                env::var("REFRESH_INTERVAL_MINS")
                    .ok()
                    .and_then(|v| v.parse().ok()),
            ),
            refresh_on_startup: env::var("REFRESH_ON_STARTUP")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(false),
            market: MarketApiConfig::from_env(),
        })
    }
}

/// The interval must divide an hour so ticks land on the same minutes every hour.
pub fn aligned_interval_mins(requested: Option<u32>) -> u32 {
    match requested {
        None => DEFAULT_REFRESH_INTERVAL_MINS,
        Some(mins) if mins > 0 && 60 % mins == 0 => mins,
        Some(mins) => {
            warn!(
                "REFRESH_INTERVAL_MINS={} does not divide 60, using {}",
                mins, DEFAULT_REFRESH_INTERVAL_MINS
            );
            DEFAULT_REFRESH_INTERVAL_MINS
        }
    }
}

//! Application configuration loaded from environment variables.

use std::str::FromStr;

use common::{Rate, UserId};
use domain::FeeSchedule;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

impl LogFormat {
    fn parse(value: &str) -> Self {
        if value.eq_ignore_ascii_case("json") {
            LogFormat::Json
        } else {
            LogFormat::Text
        }
    }
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`: bind address (default: `"0.0.0.0"`)
/// - `PORT`: listen port (default: `3000`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `LOG_FORMAT`: `text` or `json` (default: `text`)
/// - `DATABASE_URL`: PostgreSQL connection string; unset runs on the in-memory store
/// - `DATABASE_MAX_CONNECTIONS`: pool size (default: `5`)
/// - `PLATFORM_FEE_BPS`: platform share of an order's net total in basis points (default: `1000`)
/// - `DRIVER_COMMISSION_BPS`: platform share of the delivery fee in basis points (default: `1000`)
/// - `PLATFORM_ACCOUNT_ID`: UUID of the platform wallet owner (optional)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub platform_fee_bps: u32,
    pub driver_commission_bps: u32,
    pub platform_account: Option<UserId>,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    ///
    /// Unparseable numeric values, and rates above 10000 bps (100%), fall
    /// back to their defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: parsed(&lookup, "PORT").unwrap_or(defaults.port),
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: lookup("LOG_FORMAT")
                .map(|v| LogFormat::parse(&v))
                .unwrap_or(defaults.log_format),
            database_url: lookup("DATABASE_URL").filter(|v| !v.trim().is_empty()),
            database_max_connections: parsed(&lookup, "DATABASE_MAX_CONNECTIONS")
                .unwrap_or(defaults.database_max_connections),
            platform_fee_bps: parsed_bps(&lookup, "PLATFORM_FEE_BPS")
                .unwrap_or(defaults.platform_fee_bps),
            driver_commission_bps: parsed_bps(&lookup, "DRIVER_COMMISSION_BPS")
                .unwrap_or(defaults.driver_commission_bps),
            platform_account: parsed(&lookup, "PLATFORM_ACCOUNT_ID"),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Fee configuration handed to the domain services.
    pub fn fee_schedule(&self) -> FeeSchedule {
        FeeSchedule {
            platform_fee_rate: Rate::from_bps(self.platform_fee_bps),
            driver_commission_rate: Rate::from_bps(self.driver_commission_bps),
            platform_account: self.platform_account,
        }
    }
}

fn parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    lookup(key).and_then(|v| v.trim().parse().ok())
}

fn parsed_bps(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<u32> {
    parsed(lookup, key).filter(|bps| Rate::try_from_bps(*bps).is_some())
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            database_url: None,
            database_max_connections: 5,
            platform_fee_bps: 1000,
            driver_commission_bps: 1000,
            platform_account: None,
        }
    }
}

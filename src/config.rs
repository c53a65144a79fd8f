use crate::domain::Coin;
use crate::engine::EngineConfig;
use crate::execution::PaperConfig;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone)]
pub struct Config {
    pub hyperliquid_api_url: String,
    pub account_address: Option<String>,
    pub instruments: Vec<Coin>,
    pub paper_mode: bool,
    pub tick_interval_ms: u64,
    pub book_poll_interval_ms: u64,
    pub price_tolerance: Decimal,
    pub shutdown_cancel_retries: u32,
    pub shutdown_budget_ms: u64,
    pub terminal_retention_ms: i64,
    pub pending_fill_capacity: usize,
    pub paper_starting_balance: Decimal,
    pub paper_leverage: u32,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnv(String),
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_map(std::env::vars().collect())
    }

    pub fn from_env_map(env_map: HashMap<String, String>) -> Result<Self, ConfigError> {
        let hyperliquid_api_url = env_map
            .get("HYPERLIQUID_API_URL")
            .cloned()
            .unwrap_or_else(|| crate::datasource::hyperliquid::DEFAULT_API_URL.to_string());

        let paper_mode = match env_map
            .get("PAPER_MODE")
            .map(|s| s.trim().to_ascii_lowercase())
            .as_deref()
            .unwrap_or("true")
        {
            "true" | "1" | "yes" => true,
            "false" | "0" | "no" => false,
            other => {
                return Err(ConfigError::InvalidValue(
                    "PAPER_MODE".to_string(),
                    format!("must be true or false, got {}", other),
                ))
            }
        };

        let account_address = env_map
            .get("ACCOUNT_ADDRESS")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        if !paper_mode && account_address.is_none() {
            return Err(ConfigError::MissingEnv("ACCOUNT_ADDRESS".to_string()));
        }

        let instruments: Vec<Coin> = env_map
            .get("INSTRUMENTS")
            .map(|s| s.as_str())
            .unwrap_or("BTC")
            .split(',')
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(Coin::new)
            .collect();
        if instruments.is_empty() {
            return Err(ConfigError::InvalidValue(
                "INSTRUMENTS".to_string(),
                "must name at least one instrument".to_string(),
            ));
        }

        let tick_interval_ms: u64 = parse_or(&env_map, "TICK_INTERVAL_MS", "1000", "a valid u64")?;
        if tick_interval_ms == 0 {
            return Err(ConfigError::InvalidValue(
                "TICK_INTERVAL_MS".to_string(),
                "must be positive".to_string(),
            ));
        }
        let book_poll_interval_ms: u64 =
            parse_or(&env_map, "BOOK_POLL_INTERVAL_MS", "500", "a valid u64")?;
        if book_poll_interval_ms == 0 {
            return Err(ConfigError::InvalidValue(
                "BOOK_POLL_INTERVAL_MS".to_string(),
                "must be positive".to_string(),
            ));
        }

        let price_tolerance: Decimal = parse_or(&env_map, "PRICE_TOLERANCE", "0", "a decimal")?;
        if price_tolerance.is_sign_negative() {
            return Err(ConfigError::InvalidValue(
                "PRICE_TOLERANCE".to_string(),
                "must not be negative".to_string(),
            ));
        }

        let paper_starting_balance: Decimal =
            parse_or(&env_map, "PAPER_STARTING_BALANCE", "10000", "a decimal")?;
        let paper_leverage: u32 = parse_or(&env_map, "PAPER_LEVERAGE", "20", "a valid u32")?;
        if paper_leverage == 0 {
            return Err(ConfigError::InvalidValue(
                "PAPER_LEVERAGE".to_string(),
                "must be at least 1".to_string(),
            ));
        }

        Ok(Config {
            hyperliquid_api_url,
            account_address,
            instruments,
            paper_mode,
            tick_interval_ms,
            book_poll_interval_ms,
            price_tolerance,
            shutdown_cancel_retries: parse_or(&env_map, "SHUTDOWN_CANCEL_RETRIES", "3", "a valid u32")?,
            shutdown_budget_ms: parse_or(&env_map, "SHUTDOWN_BUDGET_MS", "5000", "a valid u64")?,
            terminal_retention_ms: parse_or(&env_map, "TERMINAL_RETENTION_MS", "300000", "a valid i64")?,
            pending_fill_capacity: parse_or(&env_map, "PENDING_FILL_CAPACITY", "4096", "a valid usize")?,
            paper_starting_balance,
            paper_leverage,
        })
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            tick_interval: Duration::from_millis(self.tick_interval_ms),
            price_tolerance: self.price_tolerance,
            shutdown_cancel_retries: self.shutdown_cancel_retries,
            shutdown_budget: Duration::from_millis(self.shutdown_budget_ms),
            terminal_retention_ms: self.terminal_retention_ms,
        }
    }

    pub fn paper_config(&self) -> PaperConfig {
        PaperConfig {
            starting_balance: self.paper_starting_balance,
            leverage: self.paper_leverage,
        }
    }

    pub fn book_poll_interval(&self) -> Duration {
        Duration::from_millis(self.book_poll_interval_ms)
    }
}

fn parse_or<T: FromStr>(
    env_map: &HashMap<String, String>,
    key: &str,
    default: &str,
    expected: &str,
) -> Result<T, ConfigError> {
    env_map
        .get(key)
        .map(|s| s.trim())
        .unwrap_or(default)
        .parse::<T>()
        .map_err(|_| ConfigError::InvalidValue(key.to_string(), format!("must be {}", expected)))
}

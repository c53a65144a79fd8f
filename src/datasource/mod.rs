//! Read-side venue queries: book snapshots and account state.

use crate::domain::{AccountState, BookSnapshot, Coin};
use async_trait::async_trait;
use std::fmt;

pub mod hyperliquid;
pub mod mock;

pub use hyperliquid::HyperliquidInfoSource;
pub use mock::MockInfoSource;

/// Venue info queries used by the live backend and the REST book feed.
///
/// Implementations handle retry/backoff and rate limiting themselves.
#[async_trait]
pub trait InfoSource: Send + Sync + fmt::Debug {
    /// Full L2 book for `coin`.
    async fn fetch_l2_book(&self, coin: &Coin) -> Result<BookSnapshot, DataSourceError>;

    /// Margin summary and positions for `user`.
    async fn fetch_account_state(&self, user: &str) -> Result<AccountState, DataSourceError>;
}

/// Error type for data source operations.
#[derive(Debug, Clone)]
pub enum DataSourceError {
    /// Network error (e.g., connection timeout, DNS failure)
    NetworkError(String),
    /// HTTP error (e.g., 429 rate limit, 5xx server error)
    HttpError { status: u16, message: String },
    /// Parsing error (invalid JSON, malformed or crossed book)
    ParseError(String),
    /// Rate limit exceeded
    RateLimited,
    Other(String),
}

impl fmt::Display for DataSourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataSourceError::NetworkError(msg) => write!(f, "Network error: {}", msg),
            DataSourceError::HttpError { status, message } => {
                write!(f, "HTTP error {}: {}", status, message)
            }
            DataSourceError::ParseError(msg) => write!(f, "Parse error: {}", msg),
            DataSourceError::RateLimited => write!(f, "Rate limited"),
            DataSourceError::Other(msg) => write!(f, "Error: {}", msg),
        }
    }
}

impl std::error::Error for DataSourceError {}

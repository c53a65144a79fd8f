//! Execution backends: one contract, a live and a simulated implementation.

use crate::domain::{AccountState, ClientOrderId, Coin, ExchangeOrderId, Order};
use async_trait::async_trait;
use thiserror::Error;

pub mod live;
pub mod paper;

pub use live::{CancelReply, LiveBackend, OrderRequest, OrderStatusReply, OrderTransport, TransportError};
pub use paper::{PaperBackend, PaperConfig};

/// Which variant is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendMode {
    Live,
    Paper,
}

impl std::fmt::Display for BackendMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendMode::Live => write!(f, "LIVE"),
            BackendMode::Paper => write!(f, "PAPER"),
        }
    }
}

/// Placement acknowledgement. Both variants answer with this exact shape so
/// the ledger is driven identically regardless of backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceAck {
    /// Accepted and resting on the book.
    Resting { exchange_id: ExchangeOrderId },
    /// Matched on arrival; fills follow on the fill path.
    Filled { exchange_id: ExchangeOrderId },
}

impl PlaceAck {
    pub fn exchange_id(&self) -> ExchangeOrderId {
        match self {
            PlaceAck::Resting { exchange_id } | PlaceAck::Filled { exchange_id } => *exchange_id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CancelAck {
    pub client_id: ClientOrderId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CancelAllAck {
    pub cancelled: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutionError {
    /// The venue refused the action. Recoverable.
    #[error("rejected by backend: {0}")]
    BackendRejected(String),
    /// I/O failure. Not retried inside the action; the next tick re-diffs.
    #[error("transient network error: {0}")]
    TransientNetwork(String),
    #[error("account state unavailable: {0}")]
    AccountUnavailable(String),
}

impl ExecutionError {
    pub fn is_transient(&self) -> bool {
        matches!(self, ExecutionError::TransientNetwork(_))
    }
}

#[async_trait]
pub trait ExecutionBackend: Send + Sync {
    fn mode(&self) -> BackendMode;

    async fn place(&self, order: &Order) -> Result<PlaceAck, ExecutionError>;

    async fn cancel(
        &self,
        coin: &Coin,
        client_id: ClientOrderId,
    ) -> Result<CancelAck, ExecutionError>;

    async fn cancel_all(&self, coin: &Coin) -> Result<CancelAllAck, ExecutionError>;

    async fn fetch_account_state(&self) -> Result<AccountState, ExecutionError>;
}

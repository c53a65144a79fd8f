//! Live execution over a signed-exchange transport.
//!
//! The transport (request signing, nonce management, the HTTP/WebSocket
//! client) lives outside this crate; `LiveBackend` only translates between
//! its replies and the backend contract.

use super::{BackendMode, CancelAck, CancelAllAck, ExecutionBackend, ExecutionError, PlaceAck};
use crate::datasource::InfoSource;
use crate::domain::{AccountState, ClientOrderId, Coin, ExchangeOrderId, Order, TimeInForce};
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// One limit order as the exchange expects it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderRequest {
    pub coin: Coin,
    pub is_buy: bool,
    pub px: Decimal,
    pub sz: Decimal,
    pub tif: TimeInForce,
    pub reduce_only: bool,
    pub cloid: ClientOrderId,
}

impl From<&Order> for OrderRequest {
    fn from(order: &Order) -> Self {
        Self {
            coin: order.coin.clone(),
            is_buy: order.side.is_buy(),
            px: order.px,
            sz: order.remaining_sz(),
            tif: order.tif,
            reduce_only: order.reduce_only,
            cloid: order.client_id,
        }
    }
}

/// Per-order status in the exchange's order response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderStatusReply {
    Resting { oid: u64 },
    Filled { oid: u64, total_sz: Decimal, avg_px: Decimal },
    Error(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CancelReply {
    Success,
    Error(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    Network(String),
    Http { status: u16, message: String },
    RateLimited,
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::Network(msg) => write!(f, "network: {}", msg),
            TransportError::Http { status, message } => write!(f, "HTTP {}: {}", status, message),
            TransportError::RateLimited => write!(f, "rate limited"),
        }
    }
}

impl From<TransportError> for ExecutionError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Http { status, message } if (400..500).contains(&status) && status != 429 => {
                ExecutionError::BackendRejected(format!("HTTP {}: {}", status, message))
            }
            other => ExecutionError::TransientNetwork(other.to_string()),
        }
    }
}

/// Signed exchange actions.
#[async_trait]
pub trait OrderTransport: Send + Sync {
    async fn place_order(&self, request: &OrderRequest) -> Result<OrderStatusReply, TransportError>;

    async fn cancel_by_cloid(
        &self,
        coin: &Coin,
        cloid: ClientOrderId,
    ) -> Result<CancelReply, TransportError>;

    /// Exchange ids of every open order on `coin` for our account.
    async fn open_order_ids(&self, coin: &Coin) -> Result<Vec<ExchangeOrderId>, TransportError>;

    async fn cancel_by_oid(
        &self,
        coin: &Coin,
        oid: ExchangeOrderId,
    ) -> Result<CancelReply, TransportError>;
}

pub struct LiveBackend {
    transport: Arc<dyn OrderTransport>,
    info: Arc<dyn InfoSource>,
    account_address: String,
}

impl LiveBackend {
    pub fn new(
        transport: Arc<dyn OrderTransport>,
        info: Arc<dyn InfoSource>,
        account_address: String,
    ) -> Self {
        Self {
            transport,
            info,
            account_address,
        }
    }
}

#[async_trait]
impl ExecutionBackend for LiveBackend {
    fn mode(&self) -> BackendMode {
        BackendMode::Live
    }

    async fn place(&self, order: &Order) -> Result<PlaceAck, ExecutionError> {
        let request = OrderRequest::from(order);
        match self.transport.place_order(&request).await? {
            OrderStatusReply::Resting { oid } => Ok(PlaceAck::Resting {
                exchange_id: ExchangeOrderId::new(oid),
            }),
            OrderStatusReply::Filled { oid, total_sz, avg_px } => {
                debug!(
                    "Order {} filled on arrival: {} @ {}",
                    order.client_id, total_sz, avg_px
                );
                Ok(PlaceAck::Filled {
                    exchange_id: ExchangeOrderId::new(oid),
                })
            }
            OrderStatusReply::Error(reason) => Err(ExecutionError::BackendRejected(reason)),
        }
    }

    async fn cancel(
        &self,
        coin: &Coin,
        client_id: ClientOrderId,
    ) -> Result<CancelAck, ExecutionError> {
        match self.transport.cancel_by_cloid(coin, client_id).await? {
            CancelReply::Success => Ok(CancelAck { client_id }),
            CancelReply::Error(reason) => Err(ExecutionError::BackendRejected(reason)),
        }
    }

    async fn cancel_all(&self, coin: &Coin) -> Result<CancelAllAck, ExecutionError> {
        let oids = self.transport.open_order_ids(coin).await?;
        let mut cancelled = 0;
        for oid in oids {
            match self.transport.cancel_by_oid(coin, oid).await {
                Ok(CancelReply::Success) => cancelled += 1,
                Ok(CancelReply::Error(reason)) => {
                    warn!("cancel_all: oid {} on {} rejected: {}", oid, coin, reason)
                }
                Err(e) => warn!("cancel_all: oid {} on {} failed: {}", oid, coin, e),
            }
        }
        Ok(CancelAllAck { cancelled })
    }

    async fn fetch_account_state(&self) -> Result<AccountState, ExecutionError> {
        self.info
            .fetch_account_state(&self.account_address)
            .await
            .map_err(|e| ExecutionError::AccountUnavailable(e.to_string()))
    }
}

//! Dispatches reconcile actions to the backend and records the outcome.

use super::reconcile::ReconcilePlan;
use crate::domain::{Coin, DesiredOrder, Order, OrderStatus};
use crate::error::EngineError;
use crate::execution::{ExecutionBackend, ExecutionError, PlaceAck};
use crate::ledger::{LedgerError, OrderLedger};
use std::sync::Arc;
use tracing::{debug, warn};

/// Counts for one batch of actions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecutionSummary {
    pub cancels_sent: usize,
    pub cancels_failed: usize,
    pub places_sent: usize,
    pub places_failed: usize,
}

impl ExecutionSummary {
    pub fn merge(&mut self, other: ExecutionSummary) {
        self.cancels_sent += other.cancels_sent;
        self.cancels_failed += other.cancels_failed;
        self.places_sent += other.places_sent;
        self.places_failed += other.places_failed;
    }
}

pub struct ActionExecutor {
    ledger: Arc<OrderLedger>,
    backend: Arc<dyn ExecutionBackend>,
}

impl ActionExecutor {
    pub fn new(ledger: Arc<OrderLedger>, backend: Arc<dyn ExecutionBackend>) -> Self {
        Self { ledger, backend }
    }

    /// Cancels first, then places. A failed action never stops the batch;
    /// only a ledger invariant violation does.
    pub async fn execute(&self, coin: &Coin, plan: &ReconcilePlan) -> Result<ExecutionSummary, EngineError> {
        let mut summary = ExecutionSummary::default();
        for order in &plan.cancels {
            summary.cancels_sent += 1;
            if !self.cancel(order).await? {
                summary.cancels_failed += 1;
            }
        }
        for desired in &plan.places {
            summary.places_sent += 1;
            if self.place(coin, desired).await?.is_none() {
                summary.places_failed += 1;
            }
        }
        Ok(summary)
    }

    /// Place one order. `None` when the backend refused it or the call
    /// failed; the order is then recorded as `Rejected`.
    pub async fn place(&self, coin: &Coin, desired: &DesiredOrder) -> Result<Option<PlaceAck>, EngineError> {
        let client_id = self.ledger.next_client_id();
        let order = Order::new(
            client_id,
            coin.clone(),
            desired.side,
            desired.px,
            desired.sz,
            desired.tif,
            desired.reduce_only,
        );
        self.ledger.record_new(order.clone())?;

        match self.backend.place(&order).await {
            Ok(ack) => {
                let replayed = self.ledger.confirm_open(client_id, ack.exchange_id())?;
                debug!(
                    "Placed {} {} {} {} @ {} -> oid {} ({} buffered fill(s))",
                    client_id,
                    coin,
                    order.side,
                    order.sz,
                    order.px,
                    ack.exchange_id(),
                    replayed.len()
                );
                Ok(Some(ack))
            }
            Err(e) => {
                let reason = match &e {
                    ExecutionError::BackendRejected(reason) => reason.clone(),
                    other => other.to_string(),
                };
                warn!(
                    "Place {} {} {} {} @ {} failed: {}",
                    client_id, coin, order.side, order.sz, order.px, e
                );
                self.ledger
                    .mark_terminal(client_id, OrderStatus::Rejected, &reason)?;
                Ok(None)
            }
        }
    }

    /// Cancel one order. `true` once the order is terminal in the ledger.
    ///
    /// A rejected cancel leaves the ledger untouched: the order most likely
    /// filled and the fill feed will say so.
    pub async fn cancel(&self, order: &Order) -> Result<bool, EngineError> {
        match self.backend.cancel(&order.coin, order.client_id).await {
            Ok(_) => match self.ledger.mark_terminal(
                order.client_id,
                OrderStatus::Cancelled,
                "cancel acknowledged",
            ) {
                Ok(()) => Ok(true),
                // A push or fill got there first.
                Err(LedgerError::InvalidTransition { from, .. }) => {
                    debug!("Cancel ack for {} already {}", order.client_id, from);
                    Ok(true)
                }
                Err(e) => Err(e.into()),
            },
            Err(e) => {
                warn!(
                    "Cancel {} on {} (oid {:?}) failed: {}",
                    order.client_id, order.coin, order.exchange_id, e
                );
                Ok(false)
            }
        }
    }

    /// Venue-wide cancel for `coin`; returns the number cancelled there.
    pub async fn cancel_all(&self, coin: &Coin) -> Result<usize, ExecutionError> {
        self.backend.cancel_all(coin).await.map(|ack| ack.cancelled)
    }
}

//! Authoritative record of every order this process placed.
//!
//! Exchange ids and fills arrive on feeds that are causally independent of
//! the placement acknowledgement. The ledger therefore buffers fills whose
//! exchange id is not mapped yet and replays them on confirmation, and it
//! de-duplicates by fill id so a redelivered fill is applied once.
//!
//! State is sharded per instrument. Two small indexes (client id to
//! instrument, and the exchange ids claimed so far) are shared; they are only
//! ever locked while an instrument slot is held or on their own, never the
//! other way round.

mod pending;

use crate::domain::{
    ClientOrderId, Coin, ExchangeOrderId, ExchangeOrderStatus, Fill, Order, OrderStatus,
    OrderUpdate, TimeMs,
};
use crate::shard::InstrumentShards;
use parking_lot::{Mutex, RwLock};
use pending::{PendingFills, Queued};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

/// Per instrument.
pub const DEFAULT_PENDING_FILL_CAPACITY: usize = 4096;

/// Ledger invariant violations. These indicate a logic bug in the caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("duplicate client order id {0}")]
    DuplicateClientId(ClientOrderId),
    #[error("unknown or non-pending order {0}")]
    UnknownOrder(ClientOrderId),
    #[error("invalid transition for {client_id}: {from} -> {to}")]
    InvalidTransition {
        client_id: ClientOrderId,
        from: OrderStatus,
        to: OrderStatus,
    },
    #[error("exchange id {exchange_id} already mapped to {existing}")]
    ExchangeIdInUse {
        exchange_id: ExchangeOrderId,
        existing: ClientOrderId,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FillOutcome {
    /// Applied to a known order (the fill carries its resolved client id).
    Applied(Fill),
    /// Exchange id not confirmed yet; held until `confirm_open` runs.
    Buffered,
    /// Fill id already seen.
    Duplicate,
    /// Exchange id not confirmed and the instrument's pending buffer is
    /// already full of fills for it; the fill was not kept.
    Dropped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    Applied(OrderStatus),
    /// No matching order, or nothing to change.
    Ignored,
}

type ExchangeIdClaims = Mutex<HashMap<ExchangeOrderId, ClientOrderId>>;

/// One instrument's orders, fills and pre-confirmation buffer.
struct LedgerState {
    /// Client ids are monotonic, so iteration is oldest first.
    orders: BTreeMap<ClientOrderId, Order>,
    by_exchange_id: HashMap<ExchangeOrderId, ClientOrderId>,
    /// fill id -> owning order, for de-duplication and pruning.
    applied_fills: HashMap<String, ClientOrderId>,
    fills: HashMap<ClientOrderId, Vec<Fill>>,
    pending: PendingFills,
}

impl LedgerState {
    fn new(pending_capacity: usize) -> Self {
        Self {
            orders: BTreeMap::new(),
            by_exchange_id: HashMap::new(),
            applied_fills: HashMap::new(),
            fills: HashMap::new(),
            pending: PendingFills::new(pending_capacity),
        }
    }

    fn confirm(
        &mut self,
        claims: &ExchangeIdClaims,
        client_id: ClientOrderId,
        exchange_id: ExchangeOrderId,
    ) -> Result<Vec<Fill>, LedgerError> {
        {
            let mut claimed = claims.lock();
            match claimed.get(&exchange_id) {
                // Already confirmed by an order-state push that beat the ack.
                Some(existing) if *existing == client_id => return Ok(Vec::new()),
                Some(existing) => {
                    return Err(LedgerError::ExchangeIdInUse {
                        exchange_id,
                        existing: *existing,
                    })
                }
                None => {}
            }
            let pending = self
                .orders
                .get(&client_id)
                .map(|o| o.status == OrderStatus::Pending)
                .unwrap_or(false);
            if !pending {
                return Err(LedgerError::UnknownOrder(client_id));
            }
            claimed.insert(exchange_id, client_id);
        }

        if let Some(order) = self.orders.get_mut(&client_id) {
            order.exchange_id = Some(exchange_id);
            order.status = OrderStatus::Open;
            order.updated_at = TimeMs::now();
        }
        self.by_exchange_id.insert(exchange_id, client_id);

        let mut replayed = Vec::new();
        for fill in self.pending.take(exchange_id) {
            if self.applied_fills.contains_key(&fill.fill_id) {
                continue;
            }
            replayed.push(self.apply_resolved(client_id, fill));
        }
        if !replayed.is_empty() {
            info!(
                "Replayed {} buffered fill(s) for {} (oid {})",
                replayed.len(),
                client_id,
                exchange_id
            );
        }
        Ok(replayed)
    }

    fn apply_fill(&mut self, fill: Fill) -> FillOutcome {
        if self.applied_fills.contains_key(&fill.fill_id) || self.pending.contains(&fill.fill_id) {
            debug!("Duplicate fill {} ignored", fill.fill_id);
            return FillOutcome::Duplicate;
        }
        if let Some(client_id) = self.by_exchange_id.get(&fill.exchange_id).copied() {
            return FillOutcome::Applied(self.apply_resolved(client_id, fill));
        }

        let fill_id = fill.fill_id.clone();
        let exchange_id = fill.exchange_id;
        match self.pending.push(fill) {
            Queued::Duplicate => return FillOutcome::Duplicate,
            Queued::Full => {
                warn!(
                    "Pending fill buffer full of fills for unconfirmed oid {}; dropped {}",
                    exchange_id, fill_id
                );
                return FillOutcome::Dropped;
            }
            Queued::Evicted(oldest, dropped) => warn!(
                "Pending fill buffer full; dropped {} fill(s) for unconfirmed oid {}",
                dropped.len(),
                oldest
            ),
            Queued::Queued => {}
        }
        debug!("Buffered fill {} for unconfirmed oid {}", fill_id, exchange_id);
        FillOutcome::Buffered
    }

    fn apply_resolved(&mut self, client_id: ClientOrderId, mut fill: Fill) -> Fill {
        fill.client_id = Some(client_id);
        if let Some(order) = self.orders.get_mut(&client_id) {
            order.filled_sz += fill.sz;
            order.updated_at = fill.time;
            if order.is_terminal() {
                warn!(
                    "Fill {} on {} order {} ({}); recorded without status change",
                    fill.fill_id, order.status, client_id, order.coin
                );
            } else if order.filled_sz >= order.sz {
                order.status = OrderStatus::Filled;
            } else {
                order.status = OrderStatus::PartiallyFilled;
            }
        }
        self.applied_fills.insert(fill.fill_id.clone(), client_id);
        self.fills.entry(client_id).or_default().push(fill.clone());
        fill
    }

    fn apply_update(
        &mut self,
        claims: &ExchangeIdClaims,
        update: &OrderUpdate,
    ) -> Result<(UpdateOutcome, Vec<Fill>), LedgerError> {
        let mut replayed = Vec::new();
        let client_id = match self.by_exchange_id.get(&update.exchange_id).copied() {
            Some(client_id) => client_id,
            None => {
                let pending_cloid = update.client_id.filter(|cloid| {
                    self.orders
                        .get(cloid)
                        .map(|o| o.status == OrderStatus::Pending)
                        .unwrap_or(false)
                });
                match pending_cloid {
                    Some(client_id) => {
                        replayed = self.confirm(claims, client_id, update.exchange_id)?;
                        client_id
                    }
                    None => {
                        debug!("Order update for unknown oid {} ignored", update.exchange_id);
                        return Ok((UpdateOutcome::Ignored, replayed));
                    }
                }
            }
        };

        let target = match update.status {
            ExchangeOrderStatus::Open => None,
            ExchangeOrderStatus::Filled => Some(OrderStatus::Filled),
            ExchangeOrderStatus::Canceled => Some(OrderStatus::Cancelled),
            ExchangeOrderStatus::Rejected => Some(OrderStatus::Rejected),
        };

        let outcome = match (target, self.orders.get_mut(&client_id)) {
            (Some(to), Some(order)) if order.status.can_transition_to(to) => {
                order.status = to;
                order.updated_at = update.time;
                UpdateOutcome::Applied(to)
            }
            (None, Some(order)) if !replayed.is_empty() || order.status == OrderStatus::Open => {
                UpdateOutcome::Applied(order.status)
            }
            _ => UpdateOutcome::Ignored,
        };
        Ok((outcome, replayed))
    }

    fn set_terminal(&mut self, client_id: ClientOrderId, to: OrderStatus) -> Result<(), LedgerError> {
        let order = self
            .orders
            .get_mut(&client_id)
            .ok_or(LedgerError::UnknownOrder(client_id))?;
        if !order.status.can_transition_to(to) {
            return Err(LedgerError::InvalidTransition {
                client_id,
                from: order.status,
                to,
            });
        }
        order.status = to;
        order.updated_at = TimeMs::now();
        Ok(())
    }
}

pub struct OrderLedger {
    shards: InstrumentShards<LedgerState>,
    /// Instrument of every tracked client id.
    coins: RwLock<HashMap<ClientOrderId, Coin>>,
    /// Exchange ids mapped on any instrument, so the mapping stays injective.
    exchange_ids: ExchangeIdClaims,
    pending_capacity: usize,
    /// High bits: session seed; low bits: per-process counter.
    session: u64,
    counter: AtomicU64,
    fill_notifier: Option<UnboundedSender<Fill>>,
}

impl OrderLedger {
    pub fn new() -> Self {
        Self::with_pending_capacity(DEFAULT_PENDING_FILL_CAPACITY)
    }

    /// `capacity` bounds each instrument's buffer of unconfirmed fills.
    pub fn with_pending_capacity(capacity: usize) -> Self {
        Self {
            shards: InstrumentShards::new(),
            coins: RwLock::new(HashMap::new()),
            exchange_ids: Mutex::new(HashMap::new()),
            pending_capacity: capacity,
            session: TimeMs::now().as_ms() as u64,
            counter: AtomicU64::new(0),
            fill_notifier: None,
        }
    }

    /// Forward every applied fill (including replayed ones) to `tx`.
    pub fn with_fill_notifier(mut self, tx: UnboundedSender<Fill>) -> Self {
        self.fill_notifier = Some(tx);
        self
    }

    fn slot(&self, coin: &Coin) -> Arc<Mutex<LedgerState>> {
        self.shards
            .get_or_insert_with(coin, || LedgerState::new(self.pending_capacity))
    }

    fn slot_of(&self, client_id: ClientOrderId) -> Option<Arc<Mutex<LedgerState>>> {
        let coin = self.coins.read().get(&client_id).cloned()?;
        self.shards.get(&coin)
    }

    /// Next client order id. Monotonic and never reused within a session;
    /// the session seed keeps ids distinct across restarts.
    pub fn next_client_id(&self) -> ClientOrderId {
        let n = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        ClientOrderId::new(((self.session as u128) << 64) | n as u128)
    }

    /// Register an order before it is sent anywhere.
    pub fn record_new(&self, order: Order) -> Result<(), LedgerError> {
        let client_id = order.client_id;
        let slot = self.slot(&order.coin);
        let mut state = slot.lock();
        {
            let mut coins = self.coins.write();
            if coins.contains_key(&client_id) {
                return Err(LedgerError::DuplicateClientId(client_id));
            }
            if order.status != OrderStatus::Pending {
                return Err(LedgerError::InvalidTransition {
                    client_id,
                    from: order.status,
                    to: OrderStatus::Pending,
                });
            }
            coins.insert(client_id, order.coin.clone());
        }
        state.orders.insert(client_id, order);
        Ok(())
    }

    /// `Pending -> Open`, mapping `exchange_id` to `client_id`.
    ///
    /// Any fills buffered for `exchange_id` are applied before returning and
    /// are returned in the order they were applied.
    pub fn confirm_open(
        &self,
        client_id: ClientOrderId,
        exchange_id: ExchangeOrderId,
    ) -> Result<Vec<Fill>, LedgerError> {
        let slot = self
            .slot_of(client_id)
            .ok_or(LedgerError::UnknownOrder(client_id))?;
        let replayed = slot
            .lock()
            .confirm(&self.exchange_ids, client_id, exchange_id)?;
        self.notify(&replayed);
        Ok(replayed)
    }

    /// Routed by the fill's instrument.
    pub fn apply_fill(&self, fill: Fill) -> FillOutcome {
        let slot = self.slot(&fill.coin);
        let outcome = slot.lock().apply_fill(fill);
        if let FillOutcome::Applied(fill) = &outcome {
            self.notify(std::slice::from_ref(fill));
        }
        outcome
    }

    /// Apply an order-state push, routed by its instrument.
    ///
    /// When the exchange id is not mapped yet but the push names one of our
    /// pending client ids, the push itself confirms the order.
    pub fn apply_order_update(&self, update: &OrderUpdate) -> Result<UpdateOutcome, LedgerError> {
        let Some(slot) = self.shards.get(&update.coin) else {
            debug!(
                "Order update for oid {} on untracked {} ignored",
                update.exchange_id, update.coin
            );
            return Ok(UpdateOutcome::Ignored);
        };
        let (outcome, replayed) = slot.lock().apply_update(&self.exchange_ids, update)?;
        self.notify(&replayed);
        Ok(outcome)
    }

    /// Move an order to `Cancelled` or `Rejected`.
    pub fn mark_terminal(
        &self,
        client_id: ClientOrderId,
        status: OrderStatus,
        reason: &str,
    ) -> Result<(), LedgerError> {
        let slot = self
            .slot_of(client_id)
            .ok_or(LedgerError::UnknownOrder(client_id))?;
        let mut state = slot.lock();
        if !matches!(status, OrderStatus::Cancelled | OrderStatus::Rejected) {
            let from = state
                .orders
                .get(&client_id)
                .map(|o| o.status)
                .ok_or(LedgerError::UnknownOrder(client_id))?;
            return Err(LedgerError::InvalidTransition {
                client_id,
                from,
                to: status,
            });
        }
        state.set_terminal(client_id, status)?;
        debug!("Order {} -> {} ({})", client_id, status, reason);
        Ok(())
    }

    /// Orders working on the book (`Open` / `PartiallyFilled`) for `coin`,
    /// oldest first.
    pub fn open_orders(&self, coin: &Coin) -> Vec<Order> {
        let Some(slot) = self.shards.get(coin) else {
            return Vec::new();
        };
        let state = slot.lock();
        state
            .orders
            .values()
            .filter(|o| o.status.is_live())
            .cloned()
            .collect()
    }

    pub fn get(&self, client_id: ClientOrderId) -> Option<Order> {
        let slot = self.slot_of(client_id)?;
        let order = slot.lock().orders.get(&client_id).cloned();
        order
    }

    pub fn get_by_exchange_id(&self, exchange_id: ExchangeOrderId) -> Option<Order> {
        let client_id = *self.exchange_ids.lock().get(&exchange_id)?;
        self.get(client_id)
    }

    pub fn fills_for(&self, client_id: ClientOrderId) -> Vec<Fill> {
        let Some(slot) = self.slot_of(client_id) else {
            return Vec::new();
        };
        let fills = slot.lock().fills.get(&client_id).cloned().unwrap_or_default();
        fills
    }

    /// Number of fills, across all instruments, waiting for their exchange
    /// id to be confirmed.
    pub fn pending_fill_count(&self) -> usize {
        self.shards
            .entries()
            .iter()
            .map(|(_, slot)| slot.lock().pending.len())
            .sum()
    }

    /// Drop terminal orders last touched more than `max_age_ms` before `now`.
    pub fn prune_terminal(&self, max_age_ms: i64, now: TimeMs) -> usize {
        let cutoff = now.as_ms().saturating_sub(max_age_ms);
        let mut pruned = 0;

        for (_, slot) in self.shards.entries() {
            let mut state = slot.lock();
            let stale: Vec<ClientOrderId> = state
                .orders
                .values()
                .filter(|o| o.is_terminal() && o.updated_at.as_ms() < cutoff)
                .map(|o| o.client_id)
                .collect();
            if stale.is_empty() {
                continue;
            }

            let mut released = Vec::new();
            for client_id in &stale {
                let removed = state.orders.remove(client_id);
                if let Some(exchange_id) = removed.and_then(|o| o.exchange_id) {
                    state.by_exchange_id.remove(&exchange_id);
                    released.push(exchange_id);
                }
                let fills = state.fills.remove(client_id).unwrap_or_default();
                for fill in fills {
                    state.applied_fills.remove(&fill.fill_id);
                }
            }

            let mut coins = self.coins.write();
            for client_id in &stale {
                coins.remove(client_id);
            }
            drop(coins);
            let mut claimed = self.exchange_ids.lock();
            for exchange_id in &released {
                claimed.remove(exchange_id);
            }
            pruned += stale.len();
        }
        pruned
    }

    fn notify(&self, fills: &[Fill]) {
        if let Some(tx) = &self.fill_notifier {
            for fill in fills {
                // Receiver gone means nobody is listening for on_fill any more.
                let _ = tx.send(fill.clone());
            }
        }
    }
}

impl Default for OrderLedger {
    fn default() -> Self {
        Self::new()
    }
}

//! Test doubles shared by the scenario tests.
#![allow(dead_code)]

use async_trait::async_trait;
use hyperquote::execution::{BackendMode, CancelAck, CancelAllAck, PlaceAck};
use hyperquote::{
    AccountState, BookSnapshot, ClientOrderId, Coin, ExchangeOrderId, ExecutionBackend,
    ExecutionError, Fill, Order, PriceLevel, Side, Strategy, StrategyDecision, TimeMs,
};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

pub fn d(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

pub fn book(coin: &str, bid: (&str, &str), ask: (&str, &str), time_ms: i64) -> BookSnapshot {
    BookSnapshot::new(
        Coin::new(coin),
        vec![PriceLevel::new(d(bid.0), d(bid.1), 1)],
        vec![PriceLevel::new(d(ask.0), d(ask.1), 1)],
        TimeMs::new(time_ms),
    )
    .unwrap()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Place {
        client_id: ClientOrderId,
        coin: Coin,
        side: Side,
        px: Decimal,
        sz: Decimal,
    },
    Cancel {
        coin: Coin,
        client_id: ClientOrderId,
    },
    CancelAll(Coin),
}

/// Backend that acknowledges everything as resting and records each call.
#[derive(Default)]
pub struct RecordingBackend {
    actions: Mutex<Vec<Action>>,
    next_oid: AtomicU64,
    pub reject_places: AtomicBool,
    pub fail_cancels: AtomicBool,
    pub fail_cancel_all: AtomicBool,
    /// Cancels never complete.
    pub hang_cancels: AtomicBool,
    pub account_unavailable: AtomicBool,
    /// Every placement is acknowledged with the same exchange id.
    pub repeat_exchange_id: AtomicBool,
}

impl RecordingBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn actions(&self) -> Vec<Action> {
        self.actions.lock().clone()
    }

    pub fn clear(&self) {
        self.actions.lock().clear();
    }

    pub fn cancels(&self) -> Vec<ClientOrderId> {
        self.actions()
            .into_iter()
            .filter_map(|a| match a {
                Action::Cancel { client_id, .. } => Some(client_id),
                _ => None,
            })
            .collect()
    }

    pub fn places(&self) -> usize {
        self.actions()
            .iter()
            .filter(|a| matches!(a, Action::Place { .. }))
            .count()
    }
}

#[async_trait]
impl ExecutionBackend for RecordingBackend {
    fn mode(&self) -> BackendMode {
        BackendMode::Paper
    }

    async fn place(&self, order: &Order) -> Result<PlaceAck, ExecutionError> {
        self.actions.lock().push(Action::Place {
            client_id: order.client_id,
            coin: order.coin.clone(),
            side: order.side,
            px: order.px,
            sz: order.sz,
        });
        if self.reject_places.load(Ordering::SeqCst) {
            return Err(ExecutionError::BackendRejected("Insufficient margin".to_string()));
        }
        let oid = if self.repeat_exchange_id.load(Ordering::SeqCst) {
            1
        } else {
            self.next_oid.fetch_add(1, Ordering::SeqCst) + 1
        };
        Ok(PlaceAck::Resting {
            exchange_id: ExchangeOrderId::new(oid),
        })
    }

    async fn cancel(
        &self,
        coin: &Coin,
        client_id: ClientOrderId,
    ) -> Result<CancelAck, ExecutionError> {
        self.actions.lock().push(Action::Cancel {
            coin: coin.clone(),
            client_id,
        });
        if self.hang_cancels.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.fail_cancels.load(Ordering::SeqCst) {
            return Err(ExecutionError::TransientNetwork("connection reset".to_string()));
        }
        Ok(CancelAck { client_id })
    }

    async fn cancel_all(&self, coin: &Coin) -> Result<CancelAllAck, ExecutionError> {
        self.actions.lock().push(Action::CancelAll(coin.clone()));
        if self.fail_cancel_all.load(Ordering::SeqCst) {
            return Err(ExecutionError::TransientNetwork("connection reset".to_string()));
        }
        Ok(CancelAllAck { cancelled: 0 })
    }

    async fn fetch_account_state(&self) -> Result<AccountState, ExecutionError> {
        if self.account_unavailable.load(Ordering::SeqCst) {
            return Err(ExecutionError::AccountUnavailable("timeout".to_string()));
        }
        Ok(AccountState::default())
    }
}

/// What a [`ScriptedStrategy`] saw, readable after the engine owns it.
#[derive(Default)]
pub struct StrategyLog {
    pub ticks: Mutex<Vec<(Coin, bool, usize)>>,
    pub fills: Mutex<Vec<Fill>>,
    pub started: AtomicU64,
    pub stopped: AtomicU64,
}

/// Returns the same decision for an instrument on every tick.
pub struct ScriptedStrategy {
    pub decisions: Arc<Mutex<HashMap<Coin, StrategyDecision>>>,
    pub log: Arc<StrategyLog>,
}

impl ScriptedStrategy {
    pub fn new() -> Self {
        Self {
            decisions: Arc::new(Mutex::new(HashMap::new())),
            log: Arc::new(StrategyLog::default()),
        }
    }
}

impl Strategy for ScriptedStrategy {
    fn on_tick(
        &mut self,
        coin: &Coin,
        book: Option<&BookSnapshot>,
        _account: &AccountState,
        open_orders: &[Order],
    ) -> Option<StrategyDecision> {
        self.log
            .ticks
            .lock()
            .push((coin.clone(), book.is_some(), open_orders.len()));
        self.decisions.lock().get(coin).cloned()
    }

    fn on_fill(&mut self, fill: &Fill) {
        self.log.fills.lock().push(fill.clone());
    }

    fn on_start(&mut self, _instruments: &[Coin]) {
        self.log.started.fetch_add(1, Ordering::SeqCst);
    }

    fn on_stop(&mut self) {
        self.log.stopped.fetch_add(1, Ordering::SeqCst);
    }
}

//! The tick loop: read state, ask the strategy, reconcile, repeat.
//!
//! Nothing is carried between ticks except the ledger and the store, so a
//! failed action is corrected by the next tick's diff.

pub mod executor;
pub mod reconcile;

pub use executor::{ActionExecutor, ExecutionSummary};
pub use reconcile::{plan, ReconcilePlan};

use crate::domain::{ClientOrderId, Coin, Fill, Order, OrderStatus, TimeMs};
use crate::error::EngineError;
use crate::execution::ExecutionBackend;
use crate::ledger::{LedgerError, OrderLedger};
use crate::market::SnapshotStore;
use crate::strategy::Strategy;
use futures::future::join_all;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub tick_interval: Duration,
    pub price_tolerance: Decimal,
    /// Per-order cancel rounds per instrument during shutdown.
    pub shutdown_cancel_retries: u32,
    /// Wall-clock budget per instrument during shutdown.
    pub shutdown_budget: Duration,
    pub terminal_retention_ms: i64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(1000),
            price_tolerance: Decimal::ZERO,
            shutdown_cancel_retries: 3,
            shutdown_budget: Duration::from_millis(5000),
            terminal_retention_ms: 300_000,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    /// False when the account fetch failed and no strategy ran.
    pub account_available: bool,
    pub decisions: usize,
    pub actions: ExecutionSummary,
    pub fills_delivered: usize,
    pub pruned: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstrumentShutdown {
    pub coin: Coin,
    pub cancel_attempts: usize,
    pub cancelled: usize,
    /// Orders the venue-wide sweep reported cancelled.
    pub swept: usize,
    /// Still live in the ledger when the budget ran out.
    pub leftovers: Vec<ClientOrderId>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    pub instruments: Vec<InstrumentShutdown>,
}

impl ShutdownReport {
    pub fn cancel_attempts(&self) -> usize {
        self.instruments.iter().map(|i| i.cancel_attempts).sum()
    }

    pub fn leftovers(&self) -> Vec<ClientOrderId> {
        self.instruments
            .iter()
            .flat_map(|i| i.leftovers.iter().copied())
            .collect()
    }
}

pub struct Engine {
    config: EngineConfig,
    instruments: Vec<Coin>,
    store: Arc<SnapshotStore>,
    ledger: Arc<OrderLedger>,
    backend: Arc<dyn ExecutionBackend>,
    executor: ActionExecutor,
    strategy: Box<dyn Strategy>,
    fills: Option<mpsc::UnboundedReceiver<Fill>>,
    started: bool,
    stopped: bool,
}

impl Engine {
    pub fn new(
        config: EngineConfig,
        instruments: Vec<Coin>,
        store: Arc<SnapshotStore>,
        ledger: Arc<OrderLedger>,
        backend: Arc<dyn ExecutionBackend>,
        strategy: Box<dyn Strategy>,
    ) -> Self {
        let executor = ActionExecutor::new(ledger.clone(), backend.clone());
        Self {
            config,
            instruments,
            store,
            ledger,
            backend,
            executor,
            strategy,
            fills: None,
            started: false,
            stopped: false,
        }
    }

    /// Deliver fills applied by the ledger to the strategy's `on_fill`.
    /// `rx` is the receiving end of the ledger's fill notifier.
    pub fn with_fill_events(mut self, rx: mpsc::UnboundedReceiver<Fill>) -> Self {
        self.fills = Some(rx);
        self
    }

    /// Run `on_start` if it has not run yet.
    pub fn start(&mut self) {
        if !self.started {
            self.started = true;
            info!(
                "Starting {} strategy on {} backend for {:?}",
                self.strategy.name(),
                self.backend.mode(),
                self.instruments
            );
            self.strategy.on_start(&self.instruments);
        }
    }

    /// One reconciliation pass over every instrument.
    ///
    /// Only a ledger invariant violation is returned as an error.
    pub async fn tick(&mut self) -> Result<TickReport, EngineError> {
        self.start();
        let mut report = TickReport {
            fills_delivered: self.deliver_fills(),
            ..Default::default()
        };

        let account = match self.backend.fetch_account_state().await {
            Ok(account) => account,
            Err(e) => {
                warn!("Account unavailable, skipping strategy this tick: {}", e);
                return Ok(report);
            }
        };
        report.account_available = true;

        for coin in &self.instruments {
            let book = self.store.get(coin);
            let open_orders = self.ledger.open_orders(coin);
            let Some(decision) =
                self.strategy
                    .on_tick(coin, book.as_deref(), &account, &open_orders)
            else {
                continue;
            };
            if &decision.coin != coin {
                warn!(
                    "Ignoring decision for {} returned while ticking {}",
                    decision.coin, coin
                );
                continue;
            }
            report.decisions += 1;

            let plan = reconcile::plan(&decision, &open_orders, self.config.price_tolerance);
            if plan.is_empty() {
                continue;
            }
            debug!(
                "{}: {} cancel(s), {} place(s)",
                coin,
                plan.cancels.len(),
                plan.places.len()
            );
            let summary = self.executor.execute(coin, &plan).await?;
            report.actions.merge(summary);
        }

        report.pruned = self
            .ledger
            .prune_terminal(self.config.terminal_retention_ms, TimeMs::now());
        Ok(report)
    }

    /// Tick on a fixed interval until `shutdown` flips to `true` or a fatal
    /// error occurs, then shut down. Shutdown runs in both cases.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> Result<ShutdownReport, EngineError> {
        self.start();
        let mut ticker = tokio::time::interval(self.config.tick_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        let mut fatal = None;
        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Shutdown requested");
                        break;
                    }
                    continue;
                }
            }
            if *shutdown.borrow() {
                info!("Shutdown requested");
                break;
            }
            if let Err(e) = self.tick().await {
                error!("Stopping engine: {}", e);
                fatal = Some(e);
                break;
            }
        }

        let report = self.shutdown().await;
        match fatal {
            Some(e) => Err(e),
            None => Ok(report),
        }
    }

    /// Cancel everything the ledger believes is open, then run `on_stop`.
    ///
    /// Per instrument: up to `shutdown_cancel_retries` rounds of per-order
    /// cancels, then one venue-wide sweep, all inside `shutdown_budget`.
    /// Orders still live afterwards are logged. Always returns.
    pub async fn shutdown(&mut self) -> ShutdownReport {
        if self.stopped {
            return ShutdownReport::default();
        }
        self.stopped = true;
        self.deliver_fills();

        let report = {
            let this = &*self;
            ShutdownReport {
                instruments: join_all(this.instruments.iter().map(|coin| this.shutdown_instrument(coin)))
                    .await,
            }
        };

        for leftover in report.leftovers() {
            error!("Order {} may still be working after shutdown", leftover);
        }
        info!(
            "Shutdown: {} cancel attempt(s), {} leftover(s)",
            report.cancel_attempts(),
            report.leftovers().len()
        );
        self.strategy.on_stop();
        report
    }

    async fn shutdown_instrument(&self, coin: &Coin) -> InstrumentShutdown {
        let deadline = Instant::now() + self.config.shutdown_budget;
        let mut result = InstrumentShutdown {
            coin: coin.clone(),
            cancel_attempts: 0,
            cancelled: 0,
            swept: 0,
            leftovers: Vec::new(),
        };

        for round in 0..self.config.shutdown_cancel_retries.max(1) {
            let open = self.ledger.open_orders(coin);
            if open.is_empty() {
                break;
            }
            result.cancel_attempts += open.len();
            let cancels = join_all(open.iter().map(|order| self.executor.cancel(order)));
            match tokio::time::timeout_at(deadline, cancels).await {
                Ok(outcomes) => {
                    for outcome in outcomes {
                        match outcome {
                            Ok(true) => result.cancelled += 1,
                            Ok(false) => {}
                            Err(e) => error!("Shutdown cancel on {}: {}", coin, e),
                        }
                    }
                }
                Err(_) => {
                    warn!("{}: shutdown budget spent in cancel round {}", coin, round + 1);
                    break;
                }
            }
        }

        // Sweep anything the venue still holds, including orders this
        // process lost track of.
        match tokio::time::timeout_at(deadline, self.executor.cancel_all(coin)).await {
            Ok(Ok(swept)) => {
                result.swept = swept;
                for order in self.ledger.open_orders(coin) {
                    self.mark_swept(&order);
                }
            }
            Ok(Err(e)) => warn!("{}: cancel_all sweep failed: {}", coin, e),
            Err(_) => warn!("{}: shutdown budget spent before cancel_all sweep", coin),
        }

        result.leftovers = self
            .ledger
            .open_orders(coin)
            .into_iter()
            .map(|o| o.client_id)
            .collect();
        result
    }

    fn mark_swept(&self, order: &Order) {
        match self
            .ledger
            .mark_terminal(order.client_id, OrderStatus::Cancelled, "cancel_all sweep")
        {
            Ok(()) | Err(LedgerError::InvalidTransition { .. }) => {}
            Err(e) => error!("Sweep of {}: {}", order.client_id, e),
        }
    }

    fn deliver_fills(&mut self) -> usize {
        let Some(rx) = self.fills.as_mut() else {
            return 0;
        };
        let mut delivered = 0;
        while let Ok(fill) = rx.try_recv() {
            self.strategy.on_fill(&fill);
            delivered += 1;
        }
        delivered
    }
}

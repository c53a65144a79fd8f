use super::Strategy;
use crate::domain::{AccountState, BookSnapshot, Coin, Fill, Order, StrategyDecision};
use tracing::{debug, info};

/// Observes books, fills and positions without ever trading.
#[derive(Debug, Default)]
pub struct MonitorStrategy {
    ticks: u64,
    fills_seen: u64,
}

impl MonitorStrategy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fills_seen(&self) -> u64 {
        self.fills_seen
    }
}

impl Strategy for MonitorStrategy {
    fn on_tick(
        &mut self,
        coin: &Coin,
        book: Option<&BookSnapshot>,
        account: &AccountState,
        open_orders: &[Order],
    ) -> Option<StrategyDecision> {
        self.ticks += 1;
        match book {
            Some(book) => debug!(
                "{} mid {:?} spread {:?} bps, position {}, {} open order(s)",
                coin,
                book.mid_price(),
                book.spread_bps(),
                account.position_size(coin),
                open_orders.len()
            ),
            None => debug!("{}: no book yet", coin),
        }
        None
    }

    fn on_fill(&mut self, fill: &Fill) {
        self.fills_seen += 1;
        info!("Fill {} {} {} @ {}", fill.coin, fill.side, fill.sz, fill.px);
    }

    fn on_start(&mut self, instruments: &[Coin]) {
        info!("Monitoring {} instrument(s)", instruments.len());
    }

    fn on_stop(&mut self) {
        info!(
            "Monitor stopped after {} tick(s), {} fill(s)",
            self.ticks, self.fills_seen
        );
    }

    fn name(&self) -> &str {
        "monitor"
    }
}

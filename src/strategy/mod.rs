//! Decision-making capability driven by the engine.

use crate::domain::{AccountState, BookSnapshot, Coin, Fill, Order, StrategyDecision};

pub mod monitor;

pub use monitor::MonitorStrategy;

/// A strategy declares the orders it wants working; the engine reconciles.
///
/// `on_start` runs once before the first tick and `on_stop` once during
/// shutdown, after open orders have been cancelled.
pub trait Strategy: Send {
    /// `None` means no action for this instrument this tick.
    fn on_tick(
        &mut self,
        coin: &Coin,
        book: Option<&BookSnapshot>,
        account: &AccountState,
        open_orders: &[Order],
    ) -> Option<StrategyDecision>;

    fn on_fill(&mut self, _fill: &Fill) {}

    fn on_start(&mut self, _instruments: &[Coin]) {}

    fn on_stop(&mut self) {}

    fn name(&self) -> &str {
        "strategy"
    }
}

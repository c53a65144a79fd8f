//! Simulated balance and positions for paper trading.

use crate::domain::{AccountState, Coin, Position, Side};
use rust_decimal::Decimal;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PaperPosition {
    szi: Decimal,
    entry_px: Decimal,
}

#[derive(Debug, Clone)]
pub struct PaperAccount {
    /// Starting balance plus realized pnl minus fees.
    balance: Decimal,
    leverage: u32,
    positions: HashMap<Coin, PaperPosition>,
}

impl PaperAccount {
    pub fn new(starting_balance: Decimal, leverage: u32) -> Self {
        Self {
            balance: starting_balance,
            leverage: leverage.max(1),
            positions: HashMap::new(),
        }
    }

    pub fn balance(&self) -> Decimal {
        self.balance
    }

    pub fn position_size(&self, coin: &Coin) -> Decimal {
        self.positions
            .get(coin)
            .map(|p| p.szi)
            .unwrap_or(Decimal::ZERO)
    }

    /// Apply an execution and return the realized pnl it produced.
    ///
    /// Adding to a position moves the average entry; reducing realizes pnl
    /// against it; crossing through zero realizes the closed part and opens
    /// the rest at the fill price.
    pub fn apply_fill(&mut self, coin: &Coin, side: Side, px: Decimal, sz: Decimal, fee: Decimal) -> Decimal {
        let delta = match side {
            Side::Bid => sz,
            Side::Ask => -sz,
        };
        let current = self.positions.get(coin).copied().unwrap_or(PaperPosition {
            szi: Decimal::ZERO,
            entry_px: Decimal::ZERO,
        });
        let new_szi = current.szi + delta;

        let mut realized = Decimal::ZERO;
        let entry_px = if current.szi.is_zero()
            || current.szi.is_sign_positive() == delta.is_sign_positive()
        {
            let notional = current.entry_px * current.szi.abs() + px * sz;
            notional / new_szi.abs()
        } else {
            let closed = current.szi.abs().min(sz);
            let direction = if current.szi.is_sign_positive() {
                Decimal::ONE
            } else {
                -Decimal::ONE
            };
            realized = (px - current.entry_px) * closed * direction;
            if sz > current.szi.abs() {
                px
            } else {
                current.entry_px
            }
        };

        if new_szi.is_zero() {
            self.positions.remove(coin);
        } else {
            self.positions.insert(
                coin.clone(),
                PaperPosition {
                    szi: new_szi,
                    entry_px,
                },
            );
        }
        self.balance += realized - fee;
        realized
    }

    /// Account view marked at `mark(coin)`, falling back to entry when no
    /// mark is available.
    pub fn snapshot(&self, mark: impl Fn(&Coin) -> Option<Decimal>) -> AccountState {
        let leverage = Decimal::from(self.leverage);
        let mut state = AccountState::default();
        let mut unrealized_total = Decimal::ZERO;

        for (coin, pos) in &self.positions {
            let mark_px = mark(coin).unwrap_or(pos.entry_px);
            let unrealized_pnl = (mark_px - pos.entry_px) * pos.szi;
            let margin_used = pos.szi.abs() * mark_px / leverage;
            unrealized_total += unrealized_pnl;
            state.total_margin_used += margin_used;
            state.positions.insert(
                coin.clone(),
                Position {
                    coin: coin.clone(),
                    szi: pos.szi,
                    entry_px: pos.entry_px,
                    unrealized_pnl,
                    leverage: self.leverage,
                    liquidation_px: None,
                    margin_used,
                },
            );
        }

        state.account_value = self.balance + unrealized_total;
        state.withdrawable = (state.account_value - state.total_margin_used).max(Decimal::ZERO);
        state
    }
}

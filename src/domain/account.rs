//! Read-only account view refreshed once per tick.

use crate::domain::Coin;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Current position in a single instrument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub coin: Coin,
    /// Signed size: positive = long, negative = short.
    pub szi: Decimal,
    pub entry_px: Decimal,
    pub unrealized_pnl: Decimal,
    pub leverage: u32,
    pub liquidation_px: Option<Decimal>,
    pub margin_used: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AccountState {
    pub account_value: Decimal,
    pub total_margin_used: Decimal,
    pub withdrawable: Decimal,
    pub positions: HashMap<Coin, Position>,
}

impl AccountState {
    pub fn position(&self, coin: &Coin) -> Option<&Position> {
        self.positions.get(coin)
    }

    /// Signed position size, zero when flat.
    pub fn position_size(&self, coin: &Coin) -> Decimal {
        self.position(coin).map(|p| p.szi).unwrap_or(Decimal::ZERO)
    }
}

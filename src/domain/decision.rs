//! What a strategy asks for: a target order set, not imperative commands.

use crate::domain::{Coin, Side, TimeInForce};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A single order the strategy wants resting. Carries no identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesiredOrder {
    pub side: Side,
    pub px: Decimal,
    pub sz: Decimal,
    #[serde(default)]
    pub tif: TimeInForce,
    #[serde(default)]
    pub reduce_only: bool,
}

impl DesiredOrder {
    /// A plain GTC limit order.
    pub fn limit(side: Side, px: Decimal, sz: Decimal) -> Self {
        Self {
            side,
            px,
            sz,
            tif: TimeInForce::Gtc,
            reduce_only: false,
        }
    }

    pub fn with_tif(mut self, tif: TimeInForce) -> Self {
        self.tif = tif;
        self
    }

    pub fn reduce_only(mut self) -> Self {
        self.reduce_only = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategyDecision {
    pub coin: Coin,
    pub desired: Vec<DesiredOrder>,
    /// Cancel every open order before placing; the default policy.
    pub cancel_all_first: bool,
}

impl StrategyDecision {
    pub fn new(coin: Coin, desired: Vec<DesiredOrder>) -> Self {
        Self {
            coin,
            desired,
            cancel_all_first: true,
        }
    }

    /// Keep orders that already match and only touch the difference.
    pub fn diffed(mut self) -> Self {
        self.cancel_all_first = false;
        self
    }
}

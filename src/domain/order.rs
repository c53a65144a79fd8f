//! Order lifecycle types.

use crate::domain::{ClientOrderId, Coin, ExchangeOrderId, Side, TimeMs};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Limit order time-in-force.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TimeInForce {
    /// Good til cancelled.
    #[default]
    Gtc,
    /// Immediate or cancel.
    Ioc,
    /// Add liquidity only (post-only).
    Alo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Open,
    PartiallyFilled,
    Filled,
    Cancelled,
    Rejected,
}

impl OrderStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Filled | OrderStatus::Cancelled | OrderStatus::Rejected
        )
    }

    /// Open or partially filled: the order is working on the book.
    pub fn is_live(&self) -> bool {
        matches!(self, OrderStatus::Open | OrderStatus::PartiallyFilled)
    }

    /// Lifecycle: `Pending -> Open -> {PartiallyFilled -> Filled | Cancelled | Rejected}`.
    ///
    /// A pending order may also be rejected or cancelled before it is ever
    /// acknowledged. Terminal states are absorbing.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        match (self, next) {
            (Pending, Open | Rejected | Cancelled) => true,
            (Open, PartiallyFilled | Filled | Cancelled | Rejected) => true,
            (PartiallyFilled, PartiallyFilled | Filled | Cancelled) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Open => "open",
            OrderStatus::PartiallyFilled => "partially_filled",
            OrderStatus::Filled => "filled",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Rejected => "rejected",
        };
        write!(f, "{}", s)
    }
}

/// An order this process placed, tracked over its whole lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub client_id: ClientOrderId,
    pub exchange_id: Option<ExchangeOrderId>,
    pub coin: Coin,
    pub side: Side,
    pub px: Decimal,
    pub sz: Decimal,
    pub filled_sz: Decimal,
    pub tif: TimeInForce,
    pub reduce_only: bool,
    pub status: OrderStatus,
    pub created_at: TimeMs,
    pub updated_at: TimeMs,
}

impl Order {
    /// A fresh `Pending` order with nothing filled.
    pub fn new(
        client_id: ClientOrderId,
        coin: Coin,
        side: Side,
        px: Decimal,
        sz: Decimal,
        tif: TimeInForce,
        reduce_only: bool,
    ) -> Self {
        let now = TimeMs::now();
        Self {
            client_id,
            exchange_id: None,
            coin,
            side,
            px,
            sz,
            filled_sz: Decimal::ZERO,
            tif,
            reduce_only,
            status: OrderStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn remaining_sz(&self) -> Decimal {
        (self.sz - self.filled_sz).max(Decimal::ZERO)
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

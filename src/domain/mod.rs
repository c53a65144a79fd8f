//! Domain types shared by every component of the engine.
//!
//! This module provides:
//! - Identifiers and primitives: TimeMs, Coin, Side, ClientOrderId, ExchangeOrderId
//! - The immutable L2 book view
//! - Order, Fill and order-update types tracked by the ledger
//! - Account/position snapshots and strategy decisions

pub mod account;
pub mod book;
pub mod decision;
pub mod fill;
pub mod order;
pub mod primitives;

pub use account::{AccountState, Position};
pub use book::{BookError, BookSnapshot, PriceLevel};
pub use decision::{DesiredOrder, StrategyDecision};
pub use fill::{ExchangeOrderStatus, Fill, OrderUpdate};
pub use order::{Order, OrderStatus, TimeInForce};
pub use primitives::{ClientOrderId, Coin, ExchangeOrderId, Side, TimeMs};

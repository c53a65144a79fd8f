//! Desired-state diffing. Pure: no I/O, no ledger access.

use crate::domain::{DesiredOrder, Order, StrategyDecision};
use rust_decimal::Decimal;

/// Actions that move the open order set toward a decision.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcilePlan {
    pub cancels: Vec<Order>,
    pub places: Vec<DesiredOrder>,
}

impl ReconcilePlan {
    pub fn is_empty(&self) -> bool {
        self.cancels.is_empty() && self.places.is_empty()
    }
}

/// Diff `decision` against `open_orders`.
///
/// With `cancel_all_first`, every open order is cancelled and every desired
/// order placed. Otherwise each open order is paired with at most one desired
/// order of the same side, a price within `price_tolerance` and a size equal
/// to the open order's remaining size; paired orders are left alone, the rest
/// are cancelled or placed.
pub fn plan(decision: &StrategyDecision, open_orders: &[Order], price_tolerance: Decimal) -> ReconcilePlan {
    if decision.cancel_all_first {
        return ReconcilePlan {
            cancels: open_orders.to_vec(),
            places: decision.desired.clone(),
        };
    }

    let mut unmatched: Vec<Option<&DesiredOrder>> = decision.desired.iter().map(Some).collect();
    let mut cancels = Vec::new();

    for order in open_orders {
        let slot = unmatched.iter_mut().find(|slot| {
            slot.map(|desired| matches(order, desired, price_tolerance))
                .unwrap_or(false)
        });
        match slot {
            Some(slot) => *slot = None,
            None => cancels.push(order.clone()),
        }
    }

    ReconcilePlan {
        cancels,
        places: unmatched.into_iter().flatten().cloned().collect(),
    }
}

fn matches(order: &Order, desired: &DesiredOrder, price_tolerance: Decimal) -> bool {
    order.side == desired.side
        && (order.px - desired.px).abs() <= price_tolerance
        && order.remaining_sz() == desired.sz
}

//! Fill events and order-state pushes coming back from an execution venue.

use crate::domain::{ClientOrderId, Coin, ExchangeOrderId, Side, TimeMs};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A single execution against one of our orders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fill {
    /// Stable unique identifier used for de-duplication.
    pub fill_id: String,
    /// Exchange-assigned order reference carried by the fill feed.
    pub exchange_id: ExchangeOrderId,
    /// Resolved by the ledger once the exchange id is mapped.
    pub client_id: Option<ClientOrderId>,
    pub coin: Coin,
    pub side: Side,
    pub px: Decimal,
    pub sz: Decimal,
    pub fee: Decimal,
    /// Realized pnl delta produced by this fill.
    pub closed_pnl: Decimal,
    pub time: TimeMs,
}

impl Fill {
    /// Create a new Fill, deriving its identifier from `tid` when present.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        exchange_id: ExchangeOrderId,
        coin: Coin,
        side: Side,
        px: Decimal,
        sz: Decimal,
        fee: Decimal,
        closed_pnl: Decimal,
        time: TimeMs,
        tid: Option<u64>,
    ) -> Self {
        let fill_id = Self::compute_fill_id(exchange_id, &coin, side, px, sz, time, tid);
        Fill {
            fill_id,
            exchange_id,
            client_id: None,
            coin,
            side,
            px,
            sz,
            fee,
            closed_pnl,
            time,
        }
    }

    /// Generate a stable unique id for this fill.
    ///
    /// Priority: `tid` (if present) > hash of deterministic fields.
    pub fn compute_fill_id(
        exchange_id: ExchangeOrderId,
        coin: &Coin,
        side: Side,
        px: Decimal,
        sz: Decimal,
        time: TimeMs,
        tid: Option<u64>,
    ) -> String {
        if let Some(tid) = tid {
            return format!("tid:{}", tid);
        }

        use sha2::{Digest, Sha256};

        let mut hasher = Sha256::new();
        hasher.update(exchange_id.as_u64().to_le_bytes());
        hasher.update(coin.as_str());
        hasher.update(time.as_ms().to_le_bytes());
        hasher.update(if side == Side::Bid { b"B" } else { b"A" });
        hasher.update(px.normalize().to_string());
        hasher.update(sz.normalize().to_string());
        let hash = hasher.finalize();
        format!("hash:{}", hex::encode(&hash[..16]))
    }
}

/// Order status as reported by the venue's order-update stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExchangeOrderStatus {
    Open,
    Filled,
    Canceled,
    Rejected,
}

impl ExchangeOrderStatus {
    /// Map the exchange's status strings; cancellation variants such as
    /// `marginCanceled` all collapse into `Canceled`.
    pub fn parse(status: &str) -> Option<Self> {
        match status {
            "open" => Some(ExchangeOrderStatus::Open),
            "filled" => Some(ExchangeOrderStatus::Filled),
            "rejected" => Some(ExchangeOrderStatus::Rejected),
            s if s == "canceled" || s.ends_with("Canceled") => Some(ExchangeOrderStatus::Canceled),
            _ => None,
        }
    }
}

/// An order-state push.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderUpdate {
    pub exchange_id: ExchangeOrderId,
    pub client_id: Option<ClientOrderId>,
    pub coin: Coin,
    pub status: ExchangeOrderStatus,
    pub time: TimeMs,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn make_fill(tid: Option<u64>) -> Fill {
        Fill::new(
            ExchangeOrderId::new(7),
            Coin::new("BTC"),
            Side::Bid,
            dec!(50000),
            dec!(0.1),
            dec!(0),
            dec!(0),
            TimeMs::new(1000),
            tid,
        )
    }

    #[test]
    fn test_fill_id_prefers_tid() {
        assert_eq!(make_fill(Some(99)).fill_id, "tid:99");
    }

    #[test]
    fn test_fill_id_hash_is_stable() {
        let a = make_fill(None);
        let b = make_fill(None);
        assert!(a.fill_id.starts_with("hash:"));
        assert_eq!(a.fill_id, b.fill_id);
    }

    #[test]
    fn test_fill_id_hash_ignores_trailing_zeros() {
        let a = make_fill(None);
        let b = Fill::new(
            ExchangeOrderId::new(7),
            Coin::new("BTC"),
            Side::Bid,
            dec!(50000.00),
            dec!(0.10),
            dec!(0),
            dec!(0),
            TimeMs::new(1000),
            None,
        );
        assert_eq!(a.fill_id, b.fill_id);
    }

    #[test]
    fn test_exchange_status_parse() {
        assert_eq!(
            ExchangeOrderStatus::parse("canceled"),
            Some(ExchangeOrderStatus::Canceled)
        );
        assert_eq!(
            ExchangeOrderStatus::parse("marginCanceled"),
            Some(ExchangeOrderStatus::Canceled)
        );
        assert_eq!(
            ExchangeOrderStatus::parse("filled"),
            Some(ExchangeOrderStatus::Filled)
        );
        assert_eq!(ExchangeOrderStatus::parse("triggered"), None);
    }
}

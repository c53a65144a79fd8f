//! Immutable L2 book view.

use crate::domain::{Coin, TimeMs};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A single aggregated price level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceLevel {
    pub px: Decimal,
    pub sz: Decimal,
    /// Number of orders resting at this price.
    pub n: u32,
}

impl PriceLevel {
    pub fn new(px: Decimal, sz: Decimal, n: u32) -> Self {
        Self { px, sz, n }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BookError {
    #[error("crossed book for {coin}: best bid {bid} >= best ask {ask}")]
    CrossedBook {
        coin: Coin,
        bid: Decimal,
        ask: Decimal,
    },
    #[error("{side} levels for {coin} are not strictly ordered by price")]
    UnsortedLevels { coin: Coin, side: &'static str },
}

/// Point-in-time book for one instrument.
///
/// Only constructible through [`BookSnapshot::new`], which rejects crossed or
/// misordered books, so every stored snapshot satisfies
/// `bids[0].px < asks[0].px` when both sides are present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BookSnapshot {
    coin: Coin,
    /// Best (highest) first.
    bids: Vec<PriceLevel>,
    /// Best (lowest) first.
    asks: Vec<PriceLevel>,
    time: TimeMs,
}

impl BookSnapshot {
    pub fn new(
        coin: Coin,
        bids: Vec<PriceLevel>,
        asks: Vec<PriceLevel>,
        time: TimeMs,
    ) -> Result<Self, BookError> {
        if bids.windows(2).any(|w| w[0].px <= w[1].px) {
            return Err(BookError::UnsortedLevels { coin, side: "bid" });
        }
        if asks.windows(2).any(|w| w[0].px >= w[1].px) {
            return Err(BookError::UnsortedLevels { coin, side: "ask" });
        }
        if let (Some(bid), Some(ask)) = (bids.first(), asks.first()) {
            if bid.px >= ask.px {
                return Err(BookError::CrossedBook {
                    coin,
                    bid: bid.px,
                    ask: ask.px,
                });
            }
        }

        Ok(Self {
            coin,
            bids,
            asks,
            time,
        })
    }

    pub fn coin(&self) -> &Coin {
        &self.coin
    }

    pub fn bids(&self) -> &[PriceLevel] {
        &self.bids
    }

    pub fn asks(&self) -> &[PriceLevel] {
        &self.asks
    }

    pub fn time(&self) -> TimeMs {
        self.time
    }

    pub fn best_bid(&self) -> Option<&PriceLevel> {
        self.bids.first()
    }

    pub fn best_ask(&self) -> Option<&PriceLevel> {
        self.asks.first()
    }

    pub fn mid_price(&self) -> Option<Decimal> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => Some((bid.px + ask.px) / dec!(2)),
            _ => None,
        }
    }

    pub fn spread(&self) -> Option<Decimal> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => Some(ask.px - bid.px),
            _ => None,
        }
    }

    pub fn spread_bps(&self) -> Option<Decimal> {
        let mid = self.mid_price()?;
        if mid <= Decimal::ZERO {
            return None;
        }
        self.spread().map(|spread| spread / mid * dec!(10000))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn level(px: Decimal, sz: Decimal) -> PriceLevel {
        PriceLevel::new(px, sz, 1)
    }

    #[test]
    fn test_mid_and_spread() {
        let book = BookSnapshot::new(
            Coin::new("BTC"),
            vec![level(dec!(100), dec!(1)), level(dec!(99), dec!(2))],
            vec![level(dec!(102), dec!(1))],
            TimeMs::new(1),
        )
        .unwrap();

        assert_eq!(book.mid_price(), Some(dec!(101)));
        assert_eq!(book.spread(), Some(dec!(2)));
        assert_eq!(book.best_bid().unwrap().px, dec!(100));
    }

    #[test]
    fn test_one_sided_book_has_no_mid() {
        let book = BookSnapshot::new(
            Coin::new("BTC"),
            vec![level(dec!(100), dec!(1))],
            vec![],
            TimeMs::new(1),
        )
        .unwrap();

        assert_eq!(book.mid_price(), None);
        assert_eq!(book.spread_bps(), None);
    }

    #[test]
    fn test_crossed_book_rejected() {
        let result = BookSnapshot::new(
            Coin::new("BTC"),
            vec![level(dec!(101), dec!(1))],
            vec![level(dec!(101), dec!(1))],
            TimeMs::new(1),
        );
        assert!(matches!(result, Err(BookError::CrossedBook { .. })));
    }

    #[test]
    fn test_unsorted_bids_rejected() {
        let result = BookSnapshot::new(
            Coin::new("BTC"),
            vec![level(dec!(99), dec!(1)), level(dec!(100), dec!(1))],
            vec![],
            TimeMs::new(1),
        );
        assert!(matches!(
            result,
            Err(BookError::UnsortedLevels { side: "bid", .. })
        ));
    }
}

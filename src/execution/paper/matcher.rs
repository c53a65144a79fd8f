//! Top-of-book matching for simulated resting orders.

use crate::domain::{BookSnapshot, ClientOrderId, Coin, ExchangeOrderId, Side, TimeMs};
use crate::shard::InstrumentShards;
use rust_decimal::Decimal;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestingOrder {
    pub client_id: ClientOrderId,
    pub exchange_id: ExchangeOrderId,
    pub coin: Coin,
    pub side: Side,
    pub px: Decimal,
    pub remaining: Decimal,
    /// Arrival sequence, for time priority.
    pub seq: u64,
}

/// One simulated execution produced by a book update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Match {
    pub client_id: ClientOrderId,
    pub exchange_id: ExchangeOrderId,
    pub coin: Coin,
    pub side: Side,
    pub px: Decimal,
    pub sz: Decimal,
    /// Size still resting after this match.
    pub remaining: Decimal,
}

/// Top-of-book size of one snapshot that simulated fills have not taken yet.
///
/// Resting matches and immediate (IOC) fills draw from the same pool, so the
/// total filled against a snapshot never exceeds what that snapshot shows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TopLiquidity {
    /// Time of the snapshot the pool was taken from.
    pub time: Option<TimeMs>,
    /// Best bid `(px, unconsumed sz)`, hit by asks.
    pub bid: Option<(Decimal, Decimal)>,
    /// Best ask `(px, unconsumed sz)`, lifted by bids.
    pub ask: Option<(Decimal, Decimal)>,
}

impl TopLiquidity {
    pub fn from_book(book: &BookSnapshot) -> Self {
        Self {
            time: Some(book.time()),
            bid: book.best_bid().map(|l| (l.px, l.sz)),
            ask: book.best_ask().map(|l| (l.px, l.sz)),
        }
    }

    /// Take up to `sz` for an order on `side` limited at `px`. Returns the
    /// size taken, zero when the opposite top does not cross or is used up.
    pub fn take(&mut self, side: Side, px: Decimal, sz: Decimal) -> Decimal {
        let level = match side {
            Side::Bid => self.ask.as_mut().filter(|(top, _)| *top <= px),
            Side::Ask => self.bid.as_mut().filter(|(top, _)| *top >= px),
        };
        let Some((_, available)) = level else {
            return Decimal::ZERO;
        };
        if *available <= Decimal::ZERO || sz <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        let taken = sz.min(*available);
        *available -= taken;
        taken
    }
}

#[derive(Default)]
struct InstrumentState {
    resting: Vec<RestingOrder>,
    liquidity: TopLiquidity,
}

/// Resting orders and the current snapshot's unconsumed top level per
/// instrument, each instrument behind its own lock.
#[derive(Default)]
pub struct PaperMatcher {
    instruments: InstrumentShards<InstrumentState>,
}

impl PaperMatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, order: RestingOrder) {
        self.instruments
            .get_or_insert_with(&order.coin, InstrumentState::default)
            .lock()
            .resting
            .push(order);
    }

    /// Remove a resting order. `None` when it is not resting (never placed,
    /// already cancelled or fully filled).
    pub fn cancel(&self, coin: &Coin, client_id: ClientOrderId) -> Option<RestingOrder> {
        let slot = self.instruments.get(coin)?;
        let mut state = slot.lock();
        let idx = state.resting.iter().position(|o| o.client_id == client_id)?;
        Some(state.resting.remove(idx))
    }

    pub fn cancel_all(&self, coin: &Coin) -> usize {
        match self.instruments.get(coin) {
            Some(slot) => {
                let mut state = slot.lock();
                let n = state.resting.len();
                state.resting.clear();
                n
            }
            None => 0,
        }
    }

    pub fn resting(&self, coin: &Coin) -> Vec<RestingOrder> {
        self.instruments
            .get(coin)
            .map(|slot| slot.lock().resting.clone())
            .unwrap_or_default()
    }

    /// Start a fresh liquidity pool from `book` and match its instrument's
    /// resting orders against it.
    pub fn on_book(&self, book: &BookSnapshot) -> Vec<Match> {
        let slot = self
            .instruments
            .get_or_insert_with(book.coin(), InstrumentState::default);
        let mut state = slot.lock();
        let InstrumentState { resting, liquidity } = &mut *state;
        *liquidity = TopLiquidity::from_book(book);
        match_resting(resting, liquidity)
    }

    /// Size an immediate order can take from `book`'s top level, after what
    /// earlier fills against the same snapshot already consumed.
    pub fn take_immediate(
        &self,
        book: &BookSnapshot,
        side: Side,
        px: Decimal,
        sz: Decimal,
    ) -> Decimal {
        let slot = self
            .instruments
            .get_or_insert_with(book.coin(), InstrumentState::default);
        let mut state = slot.lock();
        let stale = state.liquidity.time.map_or(true, |seen| book.time() > seen);
        if stale {
            state.liquidity = TopLiquidity::from_book(book);
        }
        state.liquidity.take(side, px, sz)
    }
}

/// Fill resting orders against the unconsumed top of book.
///
/// A bid fills when the best ask is at or below its limit, an ask when the
/// best bid is at or above its limit, always at the order's own limit price.
/// Orders draw from `liquidity` in price-then-time priority, so the total
/// reported never exceeds what the book shows. Fully filled orders are
/// removed.
pub fn match_resting(resting: &mut Vec<RestingOrder>, liquidity: &mut TopLiquidity) -> Vec<Match> {
    let mut matches = Vec::new();

    let mut order_idx: Vec<usize> = (0..resting.len()).collect();
    order_idx.sort_by(|&a, &b| {
        let (oa, ob) = (&resting[a], &resting[b]);
        let price_priority = match oa.side {
            Side::Bid => ob.px.cmp(&oa.px),
            Side::Ask => oa.px.cmp(&ob.px),
        };
        price_priority.then(oa.seq.cmp(&ob.seq))
    });

    for idx in order_idx {
        let order = &mut resting[idx];
        let sz = liquidity.take(order.side, order.px, order.remaining);
        if sz.is_zero() {
            continue;
        }
        order.remaining -= sz;
        matches.push(Match {
            client_id: order.client_id,
            exchange_id: order.exchange_id,
            coin: order.coin.clone(),
            side: order.side,
            px: order.px,
            sz,
            remaining: order.remaining,
        });
    }

    resting.retain(|o| o.remaining > Decimal::ZERO);
    matches
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::PriceLevel;
    use rust_decimal_macros::dec;

    fn book(bid: (Decimal, Decimal), ask: (Decimal, Decimal)) -> BookSnapshot {
        BookSnapshot::new(
            Coin::new("BTC"),
            vec![PriceLevel::new(bid.0, bid.1, 1)],
            vec![PriceLevel::new(ask.0, ask.1, 1)],
            TimeMs::new(1),
        )
        .unwrap()
    }

    fn top(bid: (Decimal, Decimal), ask: (Decimal, Decimal)) -> TopLiquidity {
        TopLiquidity::from_book(&book(bid, ask))
    }

    fn resting(id: u128, side: Side, px: Decimal, sz: Decimal, seq: u64) -> RestingOrder {
        RestingOrder {
            client_id: ClientOrderId::new(id),
            exchange_id: ExchangeOrderId::new(id as u64),
            coin: Coin::new("BTC"),
            side,
            px,
            remaining: sz,
            seq,
        }
    }

    #[test]
    fn test_partial_fill_at_limit_price_keeps_remainder() {
        let mut orders = vec![resting(1, Side::Bid, dec!(101), dec!(2), 1)];
        let mut liquidity = top((dec!(100), dec!(1)), (dec!(101), dec!(1)));
        let matches = match_resting(&mut orders, &mut liquidity);

        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].px, dec!(101));
        assert_eq!(matches[0].sz, dec!(1));
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].remaining, dec!(1));
    }

    #[test]
    fn test_ask_fills_against_bid() {
        let mut orders = vec![resting(1, Side::Ask, dec!(99), dec!(0.5), 1)];
        let mut liquidity = top((dec!(100), dec!(3)), (dec!(101), dec!(1)));
        let matches = match_resting(&mut orders, &mut liquidity);

        assert_eq!(matches[0].sz, dec!(0.5));
        assert_eq!(matches[0].px, dec!(99));
        assert!(orders.is_empty());
    }

    #[test]
    fn test_no_fill_when_not_crossed() {
        let mut orders = vec![
            resting(1, Side::Bid, dec!(100.5), dec!(1), 1),
            resting(2, Side::Ask, dec!(100.5), dec!(1), 2),
        ];
        let mut liquidity = top((dec!(100), dec!(1)), (dec!(101), dec!(1)));
        let matches = match_resting(&mut orders, &mut liquidity);
        assert!(matches.is_empty());
        assert_eq!(orders.len(), 2);
    }

    #[test]
    fn test_top_level_liquidity_is_shared() {
        let mut orders = vec![
            resting(1, Side::Bid, dec!(101), dec!(1), 2),
            resting(2, Side::Bid, dec!(102), dec!(1), 3),
            resting(3, Side::Bid, dec!(101), dec!(1), 1),
        ];
        let mut liquidity = top((dec!(100), dec!(1)), (dec!(101), dec!(1.5)));
        let matches = match_resting(&mut orders, &mut liquidity);

        let total: Decimal = matches.iter().map(|m| m.sz).sum();
        assert_eq!(total, dec!(1.5));
        // Best price first, then earliest arrival.
        assert_eq!(matches[0].client_id, ClientOrderId::new(2));
        assert_eq!(matches[0].sz, dec!(1));
        assert_eq!(matches[1].client_id, ClientOrderId::new(3));
        assert_eq!(matches[1].sz, dec!(0.5));
        assert_eq!(orders.len(), 2);
    }

    #[test]
    fn test_empty_side_produces_no_fill() {
        let empty_asks = BookSnapshot::new(
            Coin::new("BTC"),
            vec![PriceLevel::new(dec!(100), dec!(1), 1)],
            vec![],
            TimeMs::new(1),
        )
        .unwrap();
        let mut orders = vec![resting(1, Side::Bid, dec!(1000), dec!(1), 1)];
        assert!(match_resting(&mut orders, &mut TopLiquidity::from_book(&empty_asks)).is_empty());
    }

    #[test]
    fn test_matcher_cancel() {
        let matcher = PaperMatcher::new();
        matcher.insert(resting(1, Side::Bid, dec!(100), dec!(1), 1));
        matcher.insert(resting(2, Side::Ask, dec!(105), dec!(1), 2));

        assert!(matcher.cancel(&Coin::new("BTC"), ClientOrderId::new(1)).is_some());
        assert!(matcher.cancel(&Coin::new("BTC"), ClientOrderId::new(1)).is_none());
        assert!(matcher.cancel(&Coin::new("ETH"), ClientOrderId::new(2)).is_none());
        assert_eq!(matcher.cancel_all(&Coin::new("BTC")), 1);
        assert!(matcher.resting(&Coin::new("BTC")).is_empty());
    }

    #[test]
    fn test_immediate_orders_share_snapshot_with_resting() {
        let matcher = PaperMatcher::new();
        matcher.insert(resting(1, Side::Bid, dec!(101), dec!(0.6), 1));
        let snapshot = book((dec!(100), dec!(1)), (dec!(101), dec!(1)));

        let matches = matcher.on_book(&snapshot);
        assert_eq!(matches[0].sz, dec!(0.6));

        // Only what the resting order left over is available.
        let take = |book: &BookSnapshot, side, px| matcher.take_immediate(book, side, px, dec!(2));
        assert_eq!(take(&snapshot, Side::Bid, dec!(101)), dec!(0.4));
        assert_eq!(take(&snapshot, Side::Bid, dec!(101)), dec!(0));
        // The other side is untouched.
        assert_eq!(take(&snapshot, Side::Ask, dec!(100)), dec!(1));

        // A newer snapshot brings fresh liquidity.
        let next = BookSnapshot::new(
            Coin::new("BTC"),
            vec![PriceLevel::new(dec!(100), dec!(1), 1)],
            vec![PriceLevel::new(dec!(101), dec!(1), 1)],
            TimeMs::new(2),
        )
        .unwrap();
        assert_eq!(take(&next, Side::Bid, dec!(101)), dec!(1));
    }

    #[test]
    fn test_take_requires_crossing_price() {
        let mut liquidity = top((dec!(100), dec!(1)), (dec!(101), dec!(1)));
        assert_eq!(liquidity.take(Side::Bid, dec!(100.5), dec!(1)), dec!(0));
        assert_eq!(liquidity.take(Side::Ask, dec!(100.5), dec!(1)), dec!(0));
        assert_eq!(liquidity.ask, Some((dec!(101), dec!(1))));
    }
}

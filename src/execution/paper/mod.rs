//! Simulated execution against the live book.
//!
//! Orders rest in an in-memory set and are matched whenever a new snapshot is
//! published. Acknowledgements have the same shape as the live backend's, and
//! fills flow through [`UserEventWriter`] exactly like exchange fills, so the
//! ledger cannot tell the two apart.

mod account;
mod matcher;

pub use account::PaperAccount;
pub use matcher::{match_resting, Match, PaperMatcher, RestingOrder, TopLiquidity};

use super::{BackendMode, CancelAck, CancelAllAck, ExecutionBackend, ExecutionError, PlaceAck};
use crate::domain::{
    AccountState, BookSnapshot, ClientOrderId, Coin, ExchangeOrderId, ExchangeOrderStatus, Fill,
    Order, OrderUpdate, Side, TimeInForce, TimeMs,
};
use crate::feed::{BookListener, UserEventWriter};
use crate::market::SnapshotStore;
use async_trait::async_trait;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

pub const IOC_WOULD_NOT_FILL: &str = "IOC would not fill";
pub const ALO_WOULD_CROSS: &str = "Post only order would have immediately matched";
pub const REDUCE_ONLY_WOULD_INCREASE: &str = "Reduce only order would increase position";
pub const CANNOT_CANCEL: &str = "Order was never placed, already canceled, or filled";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaperConfig {
    pub starting_balance: Decimal,
    pub leverage: u32,
}

impl Default for PaperConfig {
    fn default() -> Self {
        Self {
            starting_balance: Decimal::from(10_000),
            leverage: 20,
        }
    }
}

pub struct PaperBackend {
    store: Arc<SnapshotStore>,
    events: Arc<UserEventWriter>,
    matcher: PaperMatcher,
    account: Mutex<PaperAccount>,
    next_oid: AtomicU64,
    next_tid: AtomicU64,
    next_seq: AtomicU64,
}

impl PaperBackend {
    pub fn new(config: PaperConfig, store: Arc<SnapshotStore>, events: Arc<UserEventWriter>) -> Self {
        info!(
            "Paper backend: balance {}, leverage {}x",
            config.starting_balance, config.leverage
        );
        Self {
            store,
            events,
            matcher: PaperMatcher::new(),
            account: Mutex::new(PaperAccount::new(config.starting_balance, config.leverage)),
            next_oid: AtomicU64::new(0),
            next_tid: AtomicU64::new(0),
            next_seq: AtomicU64::new(0),
        }
    }

    pub fn resting(&self, coin: &Coin) -> Vec<RestingOrder> {
        self.matcher.resting(coin)
    }

    /// Update the simulated account, then hand the fill to the user-event path.
    fn settle(
        &self,
        exchange_id: ExchangeOrderId,
        coin: Coin,
        side: Side,
        px: Decimal,
        sz: Decimal,
        time: TimeMs,
    ) {
        let closed_pnl = self
            .account
            .lock()
            .apply_fill(&coin, side, px, sz, Decimal::ZERO);
        let tid = self.next_tid.fetch_add(1, Ordering::Relaxed) + 1;
        let fill = Fill::new(
            exchange_id,
            coin,
            side,
            px,
            sz,
            Decimal::ZERO,
            closed_pnl,
            time,
            Some(tid),
        );
        debug!(
            "Paper fill {} oid {} {} {} @ {}",
            fill.fill_id, exchange_id, fill.coin, fill.sz, fill.px
        );
        self.events.on_fill(fill);
    }

    fn check_reduce_only(&self, order: &Order) -> Result<(), ExecutionError> {
        if !order.reduce_only {
            return Ok(());
        }
        let position = self.account.lock().position_size(&order.coin);
        let reduces = match order.side {
            Side::Bid => position < Decimal::ZERO,
            Side::Ask => position > Decimal::ZERO,
        };
        if reduces {
            Ok(())
        } else {
            Err(ExecutionError::BackendRejected(
                REDUCE_ONLY_WOULD_INCREASE.to_string(),
            ))
        }
    }
}

/// Whether an order on `side` limited at `px` would trade against `book`'s
/// top level on arrival.
fn crosses(book: Option<&BookSnapshot>, side: Side, px: Decimal) -> bool {
    book.and_then(|b| match side {
        Side::Bid => b.best_ask().map(|l| l.px <= px),
        Side::Ask => b.best_bid().map(|l| l.px >= px),
    })
    .unwrap_or(false)
}

#[async_trait]
impl ExecutionBackend for PaperBackend {
    fn mode(&self) -> BackendMode {
        BackendMode::Paper
    }

    async fn place(&self, order: &Order) -> Result<PlaceAck, ExecutionError> {
        let sz = order.remaining_sz();
        if sz <= Decimal::ZERO || order.px <= Decimal::ZERO {
            return Err(ExecutionError::BackendRejected(format!(
                "Invalid order: px {} sz {}",
                order.px, sz
            )));
        }
        self.check_reduce_only(order)?;

        let book = self.store.get(&order.coin);

        match order.tif {
            TimeInForce::Ioc => {
                let crossing = book
                    .as_deref()
                    .map(|b| self.matcher.take_immediate(b, order.side, order.px, sz))
                    .unwrap_or(Decimal::ZERO);
                if crossing.is_zero() {
                    return Err(ExecutionError::BackendRejected(IOC_WOULD_NOT_FILL.to_string()));
                }
                let exchange_id =
                    ExchangeOrderId::new(self.next_oid.fetch_add(1, Ordering::Relaxed) + 1);
                let now = TimeMs::now();
                self.settle(exchange_id, order.coin.clone(), order.side, order.px, crossing, now);
                if crossing < sz {
                    // The unfilled part of an IOC dies with it.
                    self.events.on_order_update(&OrderUpdate {
                        exchange_id,
                        client_id: Some(order.client_id),
                        coin: order.coin.clone(),
                        status: ExchangeOrderStatus::Canceled,
                        time: now,
                    });
                }
                Ok(PlaceAck::Filled { exchange_id })
            }
            TimeInForce::Alo if crosses(book.as_deref(), order.side, order.px) => {
                Err(ExecutionError::BackendRejected(ALO_WOULD_CROSS.to_string()))
            }
            TimeInForce::Alo | TimeInForce::Gtc => {
                let exchange_id =
                    ExchangeOrderId::new(self.next_oid.fetch_add(1, Ordering::Relaxed) + 1);
                self.matcher.insert(RestingOrder {
                    client_id: order.client_id,
                    exchange_id,
                    coin: order.coin.clone(),
                    side: order.side,
                    px: order.px,
                    remaining: sz,
                    seq: self.next_seq.fetch_add(1, Ordering::Relaxed),
                });
                debug!(
                    "Paper resting {} oid {} {} {} {} @ {}",
                    order.client_id, exchange_id, order.coin, order.side, sz, order.px
                );
                Ok(PlaceAck::Resting { exchange_id })
            }
        }
    }

    async fn cancel(
        &self,
        coin: &Coin,
        client_id: ClientOrderId,
    ) -> Result<CancelAck, ExecutionError> {
        match self.matcher.cancel(coin, client_id) {
            Some(_) => Ok(CancelAck { client_id }),
            None => Err(ExecutionError::BackendRejected(CANNOT_CANCEL.to_string())),
        }
    }

    async fn cancel_all(&self, coin: &Coin) -> Result<CancelAllAck, ExecutionError> {
        Ok(CancelAllAck {
            cancelled: self.matcher.cancel_all(coin),
        })
    }

    async fn fetch_account_state(&self) -> Result<AccountState, ExecutionError> {
        let account = self.account.lock().clone();
        Ok(account.snapshot(|coin| self.store.get(coin).and_then(|b| b.mid_price())))
    }
}

impl BookListener for PaperBackend {
    fn on_book(&self, book: &BookSnapshot) {
        let matches = self.matcher.on_book(book);
        for m in matches {
            self.settle(m.exchange_id, m.coin, m.side, m.px, m.sz, book.time());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{OrderStatus, PriceLevel};
    use crate::feed::MarketDataWriter;
    use crate::ledger::OrderLedger;
    use crate::recorder::NullRecorder;
    use rust_decimal_macros::dec;

    struct Harness {
        ledger: Arc<OrderLedger>,
        writer: MarketDataWriter,
        paper: Arc<PaperBackend>,
    }

    fn harness() -> Harness {
        let store = Arc::new(SnapshotStore::new());
        let ledger = Arc::new(OrderLedger::new());
        let events = Arc::new(UserEventWriter::new(ledger.clone(), Arc::new(NullRecorder)));
        let paper = Arc::new(PaperBackend::new(PaperConfig::default(), store.clone(), events));
        let writer = MarketDataWriter::new(store, Arc::new(NullRecorder)).with_listener(paper.clone());
        Harness {
            ledger,
            writer,
            paper,
        }
    }

    fn book(bid: Decimal, ask: Decimal, ask_sz: Decimal, time: i64) -> BookSnapshot {
        BookSnapshot::new(
            Coin::new("BTC"),
            vec![PriceLevel::new(bid, dec!(5), 1)],
            vec![PriceLevel::new(ask, ask_sz, 1)],
            TimeMs::new(time),
        )
        .unwrap()
    }

    fn new_order(h: &Harness, side: Side, px: Decimal, sz: Decimal, tif: TimeInForce) -> Order {
        let order = Order::new(h.ledger.next_client_id(), Coin::new("BTC"), side, px, sz, tif, false);
        h.ledger.record_new(order.clone()).unwrap();
        order
    }

    #[tokio::test]
    async fn test_resting_order_fills_on_next_book() {
        let h = harness();
        h.writer.publish(book(dec!(99), dec!(102), dec!(1), 1));
        let order = new_order(&h, Side::Bid, dec!(101), dec!(2), TimeInForce::Gtc);

        let ack = h.paper.place(&order).await.unwrap();
        assert!(matches!(ack, PlaceAck::Resting { .. }));
        h.ledger.confirm_open(order.client_id, ack.exchange_id()).unwrap();

        h.writer.publish(book(dec!(99), dec!(101), dec!(1), 2));

        let tracked = h.ledger.get(order.client_id).unwrap();
        assert_eq!(tracked.filled_sz, dec!(1));
        assert_eq!(tracked.status, OrderStatus::PartiallyFilled);
        assert_eq!(h.ledger.fills_for(order.client_id)[0].px, dec!(101));
        assert_eq!(h.paper.resting(&Coin::new("BTC"))[0].remaining, dec!(1));
    }

    #[tokio::test]
    async fn test_ioc_fills_immediately_or_rejects() {
        let h = harness();
        h.writer.publish(book(dec!(99), dec!(101), dec!(0.4), 1));

        let miss = new_order(&h, Side::Bid, dec!(100), dec!(1), TimeInForce::Ioc);
        assert_eq!(
            h.paper.place(&miss).await,
            Err(ExecutionError::BackendRejected(IOC_WOULD_NOT_FILL.to_string()))
        );

        let full = new_order(&h, Side::Bid, dec!(101), dec!(0.25), TimeInForce::Ioc);
        let ack = h.paper.place(&full).await.unwrap();
        assert!(matches!(ack, PlaceAck::Filled { .. }));
        // Fill arrived before the ack was processed: it waits in the buffer.
        assert_eq!(h.ledger.pending_fill_count(), 1);
        let replayed = h.ledger.confirm_open(full.client_id, ack.exchange_id()).unwrap();
        assert_eq!(replayed[0].sz, dec!(0.25));
        assert_eq!(h.ledger.get(full.client_id).unwrap().status, OrderStatus::Filled);

        // Larger than what is left of the top level: partial fill, remainder
        // cancelled.
        let partial = new_order(&h, Side::Bid, dec!(101), dec!(1), TimeInForce::Ioc);
        let ack = h.paper.place(&partial).await.unwrap();
        assert_eq!(h.ledger.confirm_open(partial.client_id, ack.exchange_id()), Ok(vec![]));
        let tracked = h.ledger.get(partial.client_id).unwrap();
        assert_eq!(tracked.filled_sz, dec!(0.15));
        assert_eq!(tracked.status, OrderStatus::Cancelled);
        assert!(h.paper.resting(&Coin::new("BTC")).is_empty());
    }

    #[tokio::test]
    async fn test_ioc_without_book_rejects() {
        let h = harness();
        let order = new_order(&h, Side::Ask, dec!(1), dec!(1), TimeInForce::Ioc);
        assert!(h.paper.place(&order).await.is_err());
    }

    #[tokio::test]
    async fn test_alo_rejects_when_crossing() {
        let h = harness();
        h.writer.publish(book(dec!(99), dec!(101), dec!(1), 1));

        let crossing = new_order(&h, Side::Ask, dec!(98), dec!(1), TimeInForce::Alo);
        assert_eq!(
            h.paper.place(&crossing).await,
            Err(ExecutionError::BackendRejected(ALO_WOULD_CROSS.to_string()))
        );
        let passive = new_order(&h, Side::Ask, dec!(105), dec!(1), TimeInForce::Alo);
        assert!(matches!(h.paper.place(&passive).await, Ok(PlaceAck::Resting { .. })));
    }

    #[tokio::test]
    async fn test_cancel_after_fill_is_rejected() {
        let h = harness();
        let order = new_order(&h, Side::Bid, dec!(101), dec!(1), TimeInForce::Gtc);
        let ack = h.paper.place(&order).await.unwrap();
        h.ledger.confirm_open(order.client_id, ack.exchange_id()).unwrap();

        h.writer.publish(book(dec!(99), dec!(100), dec!(3), 1));
        assert_eq!(h.ledger.get(order.client_id).unwrap().status, OrderStatus::Filled);

        let result = h.paper.cancel(&Coin::new("BTC"), order.client_id).await;
        assert_eq!(
            result,
            Err(ExecutionError::BackendRejected(CANNOT_CANCEL.to_string()))
        );
        assert_eq!(h.ledger.get(order.client_id).unwrap().status, OrderStatus::Filled);
    }

    #[tokio::test]
    async fn test_cancel_all_and_account_state() {
        let h = harness();
        for px in [dec!(90), dec!(91)] {
            let order = new_order(&h, Side::Bid, px, dec!(1), TimeInForce::Gtc);
            h.paper.place(&order).await.unwrap();
        }
        assert_eq!(h.paper.cancel_all(&Coin::new("BTC")).await.unwrap().cancelled, 2);
        assert_eq!(h.paper.cancel_all(&Coin::new("ETH")).await.unwrap().cancelled, 0);

        let state = h.paper.fetch_account_state().await.unwrap();
        assert_eq!(state.account_value, dec!(10000));
        assert!(state.positions.is_empty());
    }

    #[tokio::test]
    async fn test_reduce_only_requires_opposite_position() {
        let h = harness();
        let order = Order::new(
            h.ledger.next_client_id(),
            Coin::new("BTC"),
            Side::Ask,
            dec!(100),
            dec!(1),
            TimeInForce::Gtc,
            true,
        );
        assert_eq!(
            h.paper.place(&order).await,
            Err(ExecutionError::BackendRejected(
                REDUCE_ONLY_WOULD_INCREASE.to_string()
            ))
        );
    }

    #[tokio::test]
    async fn test_ioc_orders_share_one_snapshot() {
        let h = harness();
        h.writer.publish(book(dec!(99), dec!(101), dec!(1), 1));

        let first = new_order(&h, Side::Bid, dec!(101), dec!(1), TimeInForce::Ioc);
        let ack = h.paper.place(&first).await.unwrap();
        h.ledger.confirm_open(first.client_id, ack.exchange_id()).unwrap();
        assert_eq!(h.ledger.get(first.client_id).unwrap().filled_sz, dec!(1));

        // The top ask is used up until the next snapshot arrives.
        let second = new_order(&h, Side::Bid, dec!(101), dec!(1), TimeInForce::Ioc);
        assert_eq!(
            h.paper.place(&second).await,
            Err(ExecutionError::BackendRejected(IOC_WOULD_NOT_FILL.to_string()))
        );

        h.writer.publish(book(dec!(99), dec!(101), dec!(1), 2));
        let third = new_order(&h, Side::Bid, dec!(101), dec!(1), TimeInForce::Ioc);
        assert!(h.paper.place(&third).await.is_ok());
    }

    #[tokio::test]
    async fn test_ioc_only_takes_what_resting_orders_left() {
        let h = harness();
        let resting = new_order(&h, Side::Bid, dec!(101), dec!(0.75), TimeInForce::Gtc);
        let ack = h.paper.place(&resting).await.unwrap();
        h.ledger.confirm_open(resting.client_id, ack.exchange_id()).unwrap();

        h.writer.publish(book(dec!(99), dec!(101), dec!(1), 1));
        assert_eq!(h.ledger.get(resting.client_id).unwrap().status, OrderStatus::Filled);

        let ioc = new_order(&h, Side::Bid, dec!(101), dec!(1), TimeInForce::Ioc);
        let ack = h.paper.place(&ioc).await.unwrap();
        h.ledger.confirm_open(ioc.client_id, ack.exchange_id()).unwrap();
        let tracked = h.ledger.get(ioc.client_id).unwrap();
        assert_eq!(tracked.filled_sz, dec!(0.25));
        assert_eq!(tracked.status, OrderStatus::Cancelled);
    }
}

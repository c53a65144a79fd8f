use crate::datasource::hyperliquid::{parse_order_update, parse_user_fill};
use crate::datasource::DataSourceError;
use crate::domain::{Fill, OrderUpdate};
use crate::ledger::{FillOutcome, OrderLedger, UpdateOutcome};
use crate::recorder::RecorderSink;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

/// Single entry point for fills and order-state pushes from either backend.
pub struct UserEventWriter {
    ledger: Arc<OrderLedger>,
    recorder: Arc<dyn RecorderSink>,
}

impl UserEventWriter {
    pub fn new(ledger: Arc<OrderLedger>, recorder: Arc<dyn RecorderSink>) -> Self {
        Self { ledger, recorder }
    }

    pub fn on_fill(&self, fill: Fill) -> FillOutcome {
        let raw = fill.clone();
        let outcome = self.ledger.apply_fill(fill);
        match &outcome {
            FillOutcome::Applied(applied) => self.recorder.record_fill(applied),
            FillOutcome::Buffered | FillOutcome::Dropped => self.recorder.record_fill(&raw),
            FillOutcome::Duplicate => {}
        }
        outcome
    }

    /// Ledger rejections are logged; a late or out-of-order push never
    /// stops the feed.
    pub fn on_order_update(&self, update: &OrderUpdate) -> UpdateOutcome {
        match self.ledger.apply_order_update(update) {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!("Order update for oid {} rejected: {}", update.exchange_id, e);
                UpdateOutcome::Ignored
            }
        }
    }

    /// Apply a Hyperliquid `userFills` payload (`{"user", "fills", "isSnapshot"}`).
    ///
    /// The snapshot sent on subscribe replays history that predates this
    /// session and is skipped. Unparseable entries are logged and skipped.
    /// Returns the number of fills handed to the ledger.
    pub fn apply_user_fills(&self, payload: &Value) -> Result<usize, DataSourceError> {
        if payload.get("isSnapshot").and_then(|v| v.as_bool()) == Some(true) {
            debug!("Skipping userFills snapshot");
            return Ok(0);
        }
        let fills = payload
            .get("fills")
            .and_then(|v| v.as_array())
            .ok_or_else(|| DataSourceError::ParseError("Missing fills array".to_string()))?;

        let mut count = 0;
        for raw in fills {
            match parse_user_fill(raw) {
                Ok(fill) => {
                    self.on_fill(fill);
                    count += 1;
                }
                Err(e) => warn!("Skipping malformed fill: {}", e),
            }
        }
        Ok(count)
    }

    /// Apply a Hyperliquid `orderUpdates` payload (an array of updates).
    pub fn apply_order_updates(&self, payload: &Value) -> Result<usize, DataSourceError> {
        let updates = payload
            .as_array()
            .ok_or_else(|| DataSourceError::ParseError("Expected update array".to_string()))?;

        let mut count = 0;
        for raw in updates {
            match parse_order_update(raw) {
                Ok(update) => {
                    self.on_order_update(&update);
                    count += 1;
                }
                Err(e) => warn!("Skipping malformed order update: {}", e),
            }
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ClientOrderId, Coin, ExchangeOrderId, Order, OrderStatus, Side, TimeInForce};
    use crate::recorder::{ChannelRecorder, Record};
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn writer() -> (Arc<OrderLedger>, UserEventWriter, tokio::sync::mpsc::Receiver<Record>) {
        let ledger = Arc::new(OrderLedger::new());
        let (recorder, rx) = ChannelRecorder::new(16);
        let writer = UserEventWriter::new(ledger.clone(), Arc::new(recorder));
        (ledger, writer, rx)
    }

    fn open_order(ledger: &OrderLedger, oid: u64) -> ClientOrderId {
        let id = ledger.next_client_id();
        let order = Order::new(
            id,
            Coin::new("BTC"),
            Side::Bid,
            dec!(100),
            dec!(2),
            TimeInForce::Gtc,
            false,
        );
        ledger.record_new(order).unwrap();
        ledger.confirm_open(id, ExchangeOrderId::new(oid)).unwrap();
        id
    }

    #[test]
    fn test_user_fills_payload_applies_and_records() {
        let (ledger, writer, mut rx) = writer();
        let id = open_order(&ledger, 42);
        let payload = json!({
            "user": "0xabc",
            "fills": [
                {"coin": "BTC", "px": "100", "sz": "0.5", "side": "B", "time": 10,
                 "oid": 42, "tid": 9001, "fee": "0.01", "closedPnl": "0"},
                {"coin": "BTC", "px": "100", "sz": "0.5", "side": "B", "time": 10,
                 "oid": 42, "tid": 9001, "fee": "0.01", "closedPnl": "0"},
                {"coin": "BTC", "side": "B"}
            ]
        });

        assert_eq!(writer.apply_user_fills(&payload).unwrap(), 2);
        assert_eq!(ledger.fills_for(id).len(), 1);
        assert_eq!(ledger.get(id).unwrap().status, OrderStatus::PartiallyFilled);
        // Duplicate is not recorded twice.
        assert!(matches!(rx.try_recv(), Ok(Record::Fill(f)) if f.client_id == Some(id)));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_user_fills_snapshot_is_skipped() {
        let (_ledger, writer, _rx) = writer();
        let payload = json!({"user": "0xabc", "isSnapshot": true, "fills": [
            {"coin": "BTC", "px": "100", "sz": "1", "side": "B", "time": 1, "oid": 1, "tid": 1}
        ]});
        assert_eq!(writer.apply_user_fills(&payload).unwrap(), 0);
    }

    #[test]
    fn test_order_updates_payload_cancels() {
        let (ledger, writer, _rx) = writer();
        let id = open_order(&ledger, 7);
        let payload = json!([
            {"order": {"coin": "BTC", "side": "B", "limitPx": "100", "sz": "2", "oid": 7,
                       "timestamp": 1, "origSz": "2"},
             "status": "canceled", "statusTimestamp": 5}
        ]);

        assert_eq!(writer.apply_order_updates(&payload).unwrap(), 1);
        assert_eq!(ledger.get(id).unwrap().status, OrderStatus::Cancelled);
    }

    #[test]
    fn test_late_update_on_terminal_order_is_ignored() {
        let (ledger, writer, _rx) = writer();
        let id = open_order(&ledger, 7);
        ledger
            .mark_terminal(id, OrderStatus::Cancelled, "test")
            .unwrap();
        let update = OrderUpdate {
            exchange_id: ExchangeOrderId::new(7),
            client_id: None,
            coin: Coin::new("BTC"),
            status: crate::domain::ExchangeOrderStatus::Filled,
            time: crate::domain::TimeMs::new(9),
        };
        assert_eq!(writer.on_order_update(&update), UpdateOutcome::Ignored);
        assert_eq!(ledger.get(id).unwrap().status, OrderStatus::Cancelled);
    }
}

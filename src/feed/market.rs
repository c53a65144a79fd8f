use crate::datasource::{DataSourceError, InfoSource};
use crate::domain::{BookSnapshot, Coin};
use crate::market::SnapshotStore;
use crate::recorder::RecorderSink;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Reacts to every published book. Called synchronously on the publishing
/// task, after the store already holds the snapshot.
pub trait BookListener: Send + Sync {
    fn on_book(&self, book: &BookSnapshot);
}

pub struct MarketDataWriter {
    store: Arc<SnapshotStore>,
    listeners: Vec<Arc<dyn BookListener>>,
    recorder: Arc<dyn RecorderSink>,
}

impl MarketDataWriter {
    pub fn new(store: Arc<SnapshotStore>, recorder: Arc<dyn RecorderSink>) -> Self {
        Self {
            store,
            listeners: Vec::new(),
            recorder,
        }
    }

    pub fn with_listener(mut self, listener: Arc<dyn BookListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    pub fn publish(&self, snapshot: BookSnapshot) -> Arc<BookSnapshot> {
        let book = self.store.publish(snapshot);
        for listener in &self.listeners {
            listener.on_book(&book);
        }
        self.recorder.record_book(&book);
        book
    }

    /// Publish a Hyperliquid `l2Book` message, either the bare book object or
    /// the `{"channel": "l2Book", "data": {...}}` envelope.
    ///
    /// Malformed or crossed books are rejected and the store is left as is.
    pub fn apply_l2_message(&self, payload: &Value) -> Result<Arc<BookSnapshot>, DataSourceError> {
        let data = match payload.get("channel").and_then(|c| c.as_str()) {
            Some("l2Book") => payload
                .get("data")
                .ok_or_else(|| DataSourceError::ParseError("Missing data field".to_string()))?,
            Some(other) => {
                return Err(DataSourceError::ParseError(format!(
                    "Unexpected channel: {}",
                    other
                )))
            }
            None => payload,
        };
        match crate::datasource::hyperliquid::parse_l2_book(data) {
            Ok(snapshot) => Ok(self.publish(snapshot)),
            Err(e) => {
                warn!("Rejected l2Book message: {}", e);
                Err(e)
            }
        }
    }
}

/// Poll `info` for each instrument's book every `interval` and publish it.
///
/// Fetch errors are logged and the instrument is retried on the next round.
/// The task exits once `shutdown` flips to `true`.
pub fn spawn_book_poller(
    info: Arc<dyn InfoSource>,
    writer: Arc<MarketDataWriter>,
    coins: Vec<Coin>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("Book poller started for {} instrument(s)", coins.len());
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
            }
            if *shutdown.borrow() {
                break;
            }

            for coin in &coins {
                match info.fetch_l2_book(coin).await {
                    Ok(snapshot) => {
                        let book = writer.publish(snapshot);
                        debug!("Published {} book, mid {:?}", coin, book.mid_price());
                    }
                    Err(e) => warn!("Book fetch for {} failed: {}", coin, e),
                }
            }
        }
        info!("Book poller stopped");
    })
}

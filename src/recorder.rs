//! Fire-and-forget sink for market data and fills.
//!
//! Recording never blocks the engine and never propagates errors: a full or
//! closed channel drops the record and bumps a counter.

use crate::domain::{BookSnapshot, Fill};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::warn;

pub trait RecorderSink: Send + Sync {
    fn record_book(&self, book: &BookSnapshot);
    fn record_fill(&self, fill: &Fill);
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullRecorder;

impl RecorderSink for NullRecorder {
    fn record_book(&self, _book: &BookSnapshot) {}
    fn record_fill(&self, _fill: &Fill) {}
}

#[derive(Debug, Clone)]
pub enum Record {
    Book(Arc<BookSnapshot>),
    Fill(Fill),
}

/// Forwards records over a bounded channel to whatever consumes them.
pub struct ChannelRecorder {
    tx: mpsc::Sender<Record>,
    dropped: AtomicU64,
}

impl ChannelRecorder {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<Record>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            Self {
                tx,
                dropped: AtomicU64::new(0),
            },
            rx,
        )
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn send(&self, record: Record) {
        if let Err(e) = self.tx.try_send(record) {
            let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
            // Log the first drop and then every 1000th.
            if dropped == 1 || dropped % 1000 == 0 {
                warn!("Recorder dropped {} record(s): {}", dropped, e);
            }
        }
    }
}

impl RecorderSink for ChannelRecorder {
    fn record_book(&self, book: &BookSnapshot) {
        self.send(Record::Book(Arc::new(book.clone())));
    }

    fn record_fill(&self, fill: &Fill) {
        self.send(Record::Fill(fill.clone()));
    }
}

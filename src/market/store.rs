use crate::domain::{BookSnapshot, Coin};
use crate::shard::InstrumentShards;
use std::collections::HashMap;
use std::sync::Arc;

/// Latest immutable book per instrument.
///
/// `publish` swaps a single `Arc` under the instrument's lock; `get` clones
/// the `Arc` and returns immediately. Since a snapshot is never mutated after
/// construction, a reader sees either the old or the new snapshot in full.
#[derive(Default)]
pub struct SnapshotStore {
    books: InstrumentShards<Option<Arc<BookSnapshot>>>,
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the stored snapshot for the snapshot's instrument.
    pub fn publish(&self, snapshot: BookSnapshot) -> Arc<BookSnapshot> {
        let snapshot = Arc::new(snapshot);
        let slot = self.books.get_or_insert_with(snapshot.coin(), || None);
        *slot.lock() = Some(snapshot.clone());
        snapshot
    }

    pub fn get(&self, coin: &Coin) -> Option<Arc<BookSnapshot>> {
        let slot = self.books.get(coin)?;
        let book = slot.lock().clone();
        book
    }

    pub fn get_all(&self) -> HashMap<Coin, Arc<BookSnapshot>> {
        self.books
            .entries()
            .into_iter()
            .filter_map(|(coin, slot)| slot.lock().clone().map(|book| (coin, book)))
            .collect()
    }

    pub fn instruments(&self) -> Vec<Coin> {
        self.books.coins()
    }
}

//! Per-instrument lock sharding.
//!
//! The registry lock is only taken to find or create a slot; all real work
//! happens under the slot's own mutex, so writers on one instrument never
//! contend with readers of another.

use crate::domain::Coin;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;

pub struct InstrumentShards<T> {
    slots: RwLock<HashMap<Coin, Arc<Mutex<T>>>>,
}

impl<T> InstrumentShards<T> {
    pub fn new() -> Self {
        Self {
            slots: RwLock::new(HashMap::new()),
        }
    }

    /// Existing slot for `coin`, if any.
    pub fn get(&self, coin: &Coin) -> Option<Arc<Mutex<T>>> {
        self.slots.read().get(coin).cloned()
    }

    /// Slot for `coin`, created with `init` on first use.
    pub fn get_or_insert_with(&self, coin: &Coin, init: impl FnOnce() -> T) -> Arc<Mutex<T>> {
        if let Some(slot) = self.get(coin) {
            return slot;
        }
        self.slots
            .write()
            .entry(coin.clone())
            .or_insert_with(|| Arc::new(Mutex::new(init())))
            .clone()
    }

    pub fn coins(&self) -> Vec<Coin> {
        let mut coins: Vec<Coin> = self.slots.read().keys().cloned().collect();
        coins.sort();
        coins
    }

    pub fn entries(&self) -> Vec<(Coin, Arc<Mutex<T>>)> {
        self.slots
            .read()
            .iter()
            .map(|(coin, slot)| (coin.clone(), slot.clone()))
            .collect()
    }
}

impl<T> Default for InstrumentShards<T> {
    fn default() -> Self {
        Self::new()
    }
}

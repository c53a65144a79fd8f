//! Fills that arrived before their order's exchange id was confirmed.

use crate::domain::{ExchangeOrderId, Fill};
use std::collections::{HashMap, HashSet, VecDeque};

pub(crate) enum Queued {
    Queued,
    Duplicate,
    /// Queued, but the buffer overflowed and the oldest other exchange id's
    /// fills were dropped.
    Evicted(ExchangeOrderId, Vec<Fill>),
    /// Buffer full of fills for this same exchange id; not queued.
    Full,
}

/// Arrival queue keyed by exchange id, replayed on confirmation.
pub(crate) struct PendingFills {
    buckets: HashMap<ExchangeOrderId, Vec<Fill>>,
    /// Exchange ids in first-arrival order, for eviction.
    arrival: VecDeque<ExchangeOrderId>,
    fill_ids: HashSet<String>,
    len: usize,
    capacity: usize,
}

impl PendingFills {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            buckets: HashMap::new(),
            arrival: VecDeque::new(),
            fill_ids: HashSet::new(),
            len: 0,
            capacity: capacity.max(1),
        }
    }

    pub(crate) fn contains(&self, fill_id: &str) -> bool {
        self.fill_ids.contains(fill_id)
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    pub(crate) fn push(&mut self, fill: Fill) -> Queued {
        if !self.fill_ids.insert(fill.fill_id.clone()) {
            return Queued::Duplicate;
        }

        let exchange_id = fill.exchange_id;
        let mut evicted = None;
        if self.len >= self.capacity {
            // Never evict the bucket this fill is about to join.
            let victim = self
                .arrival
                .iter()
                .position(|id| *id != exchange_id)
                .and_then(|idx| self.arrival.remove(idx));
            match victim {
                Some(oldest) => evicted = Some((oldest, self.remove_bucket(oldest))),
                None => {
                    self.fill_ids.remove(&fill.fill_id);
                    return Queued::Full;
                }
            }
        }

        let bucket = self.buckets.entry(exchange_id).or_insert_with(|| {
            self.arrival.push_back(exchange_id);
            Vec::new()
        });
        bucket.push(fill);
        self.len += 1;

        match evicted {
            Some((oldest, fills)) => Queued::Evicted(oldest, fills),
            None => Queued::Queued,
        }
    }

    /// Remove and return every buffered fill for `exchange_id`, in arrival order.
    pub(crate) fn take(&mut self, exchange_id: ExchangeOrderId) -> Vec<Fill> {
        if !self.buckets.contains_key(&exchange_id) {
            return Vec::new();
        }
        self.arrival.retain(|id| *id != exchange_id);
        self.remove_bucket(exchange_id)
    }

    fn remove_bucket(&mut self, exchange_id: ExchangeOrderId) -> Vec<Fill> {
        let fills = self.buckets.remove(&exchange_id).unwrap_or_default();
        for fill in &fills {
            self.fill_ids.remove(&fill.fill_id);
        }
        self.len -= fills.len();
        fills
    }
}

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use chrono::{DateTime, Duration, Utc};
use dashmap::{DashMap, mapref::entry::Entry};
use futures_util::future::BoxFuture;

use crate::application::clock::Clock;

/// Recently seen message identifiers.
pub trait DedupStore: Send + Sync {
    fn seen<'a>(&'a self, id: &'a str) -> BoxFuture<'a, bool>;

    fn remember<'a>(&'a self, id: &'a str) -> BoxFuture<'a, ()>;

    /// Remembers `id` and returns true, unless it was already present.
    fn claim<'a>(&'a self, id: &'a str) -> BoxFuture<'a, bool>;

    /// Drops expired entries and returns how many were removed.
    fn sweep(&self) -> BoxFuture<'_, usize>;

    fn len(&self) -> BoxFuture<'_, usize>;
}

#[derive(Debug, Clone, Copy)]
struct SeenEntry {
    first_seen: DateTime<Utc>,
    seq: u64,
}

pub struct MemoryDedupStore {
    ttl: Duration,
    capacity: usize,
    clock: Arc<dyn Clock>,
    entries: DashMap<String, SeenEntry>,
    next_seq: AtomicU64,
}

impl MemoryDedupStore {
    #[must_use]
    pub fn new(ttl: Duration, capacity: usize, clock: Arc<dyn Clock>) -> Self {
        Self {
            ttl,
            capacity: capacity.max(1),
            clock,
            entries: DashMap::new(),
            next_seq: AtomicU64::new(0),
        }
    }

    fn purge_expired(&self) -> usize {
        let cutoff = self.clock.now() - self.ttl;
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.first_seen > cutoff);
        before.saturating_sub(self.entries.len())
    }

    fn insert_if_absent(&self, id: &str) -> bool {
        self.purge_expired();
        let inserted = match self.entries.entry(id.to_owned()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(SeenEntry {
                    first_seen: self.clock.now(),
                    seq: self.next_seq.fetch_add(1, Ordering::Relaxed),
                });
                true
            }
        };
        if inserted {
            self.enforce_capacity();
        }
        inserted
    }

    fn enforce_capacity(&self) {
        while self.entries.len() > self.capacity {
            let oldest = self
                .entries
                .iter()
                .min_by_key(|entry| (entry.value().first_seen, entry.value().seq))
                .map(|entry| entry.key().clone());
            match oldest {
                Some(key) => {
                    self.entries.remove(&key);
                }
                None => break,
            }
        }
    }
}

impl DedupStore for MemoryDedupStore {
    fn seen<'a>(&'a self, id: &'a str) -> BoxFuture<'a, bool> {
        Box::pin(async move {
            self.purge_expired();
            self.entries.contains_key(id)
        })
    }

    fn remember<'a>(&'a self, id: &'a str) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            let _ = self.insert_if_absent(id);
        })
    }

    fn claim<'a>(&'a self, id: &'a str) -> BoxFuture<'a, bool> {
        Box::pin(async move { self.insert_if_absent(id) })
    }

    fn sweep(&self) -> BoxFuture<'_, usize> {
        Box::pin(async move { self.purge_expired() })
    }

    fn len(&self) -> BoxFuture<'_, usize> {
        Box::pin(async move { self.entries.len() })
    }
}

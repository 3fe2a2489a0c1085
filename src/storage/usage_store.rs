use dashmap::DashMap;
use futures_util::future::BoxFuture;

use crate::domain::models::SenderUsageRecord;

pub type RecordUpdate<'a> = Box<dyn FnOnce(&mut SenderUsageRecord) + Send + 'a>;

/// Per-sender usage records.
pub trait UsageStore: Send + Sync {
    /// Applies `update` to the sender's record atomically, creating a fresh
    /// record for `period` first if none exists, and returns the result.
    fn update<'a>(
        &'a self,
        sender: &'a str,
        period: &'a str,
        update: RecordUpdate<'a>,
    ) -> BoxFuture<'a, SenderUsageRecord>;

    fn get<'a>(&'a self, sender: &'a str) -> BoxFuture<'a, Option<SenderUsageRecord>>;

    /// Removes idle records from periods other than `period`.
    fn evict_stale<'a>(&'a self, period: &'a str) -> BoxFuture<'a, usize>;

    fn len(&self) -> BoxFuture<'_, usize>;
}

#[derive(Default)]
pub struct MemoryUsageStore {
    records: DashMap<String, SenderUsageRecord>,
}

impl MemoryUsageStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl UsageStore for MemoryUsageStore {
    fn update<'a>(
        &'a self,
        sender: &'a str,
        period: &'a str,
        update: RecordUpdate<'a>,
    ) -> BoxFuture<'a, SenderUsageRecord> {
        Box::pin(async move {
            let mut record = self
                .records
                .entry(sender.to_owned())
                .or_insert_with(|| SenderUsageRecord::new(sender, period));
            update(record.value_mut());
            record.value().clone()
        })
    }

    fn get<'a>(&'a self, sender: &'a str) -> BoxFuture<'a, Option<SenderUsageRecord>> {
        Box::pin(async move {
            self.records.get(sender).map(|record| record.value().clone())
        })
    }

    fn evict_stale<'a>(&'a self, period: &'a str) -> BoxFuture<'a, usize> {
        Box::pin(async move {
            let before = self.records.len();
            self.records
                .retain(|_, record| record.period == period || record.reserved_at.is_some());
            before.saturating_sub(self.records.len())
        })
    }

    fn len(&self) -> BoxFuture<'_, usize> {
        Box::pin(async move { self.records.len() })
    }
}

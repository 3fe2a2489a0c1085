mod dedup_store;
mod usage_store;

pub use dedup_store::{DedupStore, MemoryDedupStore};
pub use usage_store::{MemoryUsageStore, RecordUpdate, UsageStore};

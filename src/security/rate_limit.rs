use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use crate::{
    application::clock::{Clock, period_key_for},
    domain::models::SenderUsageRecord,
    storage::UsageStore,
};

/// Reservations older than this are treated as abandoned.
const RESERVATION_TIMEOUT_SECS: i64 = 300;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitDecision {
    /// A reply slot is reserved; finish with `commit` or `release`.
    Allowed,
    Cooldown,
    DailyLimit { notice_already_sent: bool },
}

/// Daily quota and reply spacing per sender.
#[derive(Clone)]
pub struct SenderRateLimiter {
    daily_limit: u32,
    cooldown: Duration,
    store: Arc<dyn UsageStore>,
    clock: Arc<dyn Clock>,
}

impl SenderRateLimiter {
    #[must_use]
    pub fn new(
        daily_limit: u32,
        cooldown: std::time::Duration,
        store: Arc<dyn UsageStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            daily_limit,
            cooldown: Duration::from_std(cooldown).unwrap_or(Duration::MAX),
            store,
            clock,
        }
    }

    #[must_use]
    pub fn daily_limit(&self) -> u32 {
        self.daily_limit
    }

    pub async fn check_and_reserve(&self, sender: &str) -> RateLimitDecision {
        let now = self.clock.now();
        let period = period_key_for(now);
        let (daily_limit, cooldown) = (self.daily_limit, self.cooldown);
        let mut decision = RateLimitDecision::Allowed;

        self.store
            .update(
                sender,
                &period,
                Box::new(|record: &mut SenderUsageRecord| {
                    if record.period != period {
                        record.roll_over(&period);
                    }
                    decision = evaluate(record, now, daily_limit, cooldown);
                }),
            )
            .await;

        decision
    }

    /// Finishes a reservation after a reply went out.
    pub async fn commit(&self, sender: &str, counts_toward_quota: bool) {
        let now = self.clock.now();
        let period = period_key_for(now);
        self.store
            .update(
                sender,
                &period,
                Box::new(|record: &mut SenderUsageRecord| {
                    if record.period != period {
                        record.roll_over(&period);
                    }
                    record.reserved_at = None;
                    record.last_reply_at = Some(now);
                    if counts_toward_quota {
                        record.answered = record.answered.saturating_add(1);
                    }
                }),
            )
            .await;
    }

    /// Drops a reservation without recording a reply.
    pub async fn release(&self, sender: &str) {
        let period = self.clock.period_key();
        self.store
            .update(
                sender,
                &period,
                Box::new(|record: &mut SenderUsageRecord| record.reserved_at = None),
            )
            .await;
    }

    pub async fn usage(&self, sender: &str) -> Option<SenderUsageRecord> {
        self.store.get(sender).await
    }

    /// Forgets idle senders from earlier periods.
    pub async fn sweep(&self) -> usize {
        let period = self.clock.period_key();
        self.store.evict_stale(&period).await
    }

    pub async fn tracked_senders(&self) -> usize {
        self.store.len().await
    }
}

fn evaluate(
    record: &mut SenderUsageRecord,
    now: DateTime<Utc>,
    daily_limit: u32,
    cooldown: Duration,
) -> RateLimitDecision {
    let reserved = record
        .reserved_at
        .is_some_and(|at| now - at < Duration::seconds(RESERVATION_TIMEOUT_SECS));
    let cooling = record.last_reply_at.is_some_and(|at| now - at < cooldown);
    if reserved || cooling {
        return RateLimitDecision::Cooldown;
    }

    if record.answered >= daily_limit {
        let notice_already_sent = record.limit_notice_sent;
        record.limit_notice_sent = true;
        return RateLimitDecision::DailyLimit {
            notice_already_sent,
        };
    }

    record.reserved_at = Some(now);
    RateLimitDecision::Allowed
}

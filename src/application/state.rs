use std::{
    future::Future,
    panic::AssertUnwindSafe,
    sync::Arc,
    time::{Duration, Instant},
};

use chrono::{DateTime, Utc};
use futures_util::FutureExt;
use serde_json::{Value, json};
use tokio_util::task::TaskTracker;
use tracing::{error, info};
use uuid::Uuid;

use crate::{
    application::{
        clock::{Clock, SystemClock},
        config::RuntimeConfig,
        dispatcher::{Admission, MessageDispatcher, MessageSender, Notices, mask_sender},
        reply::{CompletionClient, ReplyGenerator},
        topic::TopicClassifier,
    },
    domain::{
        error::DomainError,
        models::{InboundMessage, Outcome},
    },
    interfaces::{llm::OpenAiCompletions, whatsapp_api::CloudApiSender},
    security::rate_limit::SenderRateLimiter,
    storage::{MemoryDedupStore, MemoryUsageStore},
};

#[derive(Clone)]
pub struct SharedState {
    inner: Arc<InnerState>,
}

struct InnerState {
    config: RuntimeConfig,
    clock: Arc<dyn Clock>,
    dispatcher: MessageDispatcher,
    tasks: TaskTracker,
    started_at: Instant,
}

impl SharedState {
    pub fn new(config: RuntimeConfig) -> Result<Self, DomainError> {
        let completions = OpenAiCompletions::new(
            &config.llm_base_url,
            config.llm_api_key.clone(),
            &config.llm_model,
            config.llm_max_tokens,
            config.llm_timeout,
        )?;
        let sender = CloudApiSender::new(
            &config.graph_api_base_url,
            config.whatsapp_token.clone(),
            config.phone_number_id.clone(),
            config.whatsapp_timeout,
        )?;

        Self::with_collaborators(
            config,
            Arc::new(SystemClock),
            Arc::new(completions),
            Arc::new(sender),
        )
    }

    pub fn with_collaborators(
        config: RuntimeConfig,
        clock: Arc<dyn Clock>,
        completions: Arc<dyn CompletionClient>,
        sender: Arc<dyn MessageSender>,
    ) -> Result<Self, DomainError> {
        let dedup_ttl = chrono::Duration::from_std(config.dedup_ttl).map_err(|error| {
            DomainError::InvalidConfig(format!("dedup ttl out of range: {error}"))
        })?;
        let profile = &config.profile;

        let dispatcher = MessageDispatcher::new(
            Arc::new(MemoryDedupStore::new(
                dedup_ttl,
                config.dedup_capacity,
                clock.clone(),
            )),
            SenderRateLimiter::new(
                config.daily_limit,
                config.cooldown,
                Arc::new(MemoryUsageStore::new()),
                clock.clone(),
            ),
            TopicClassifier::new(&profile.keywords),
            ReplyGenerator::new(
                completions,
                profile.system_prompt.clone(),
                profile.fallback_reply.clone(),
            ),
            sender,
            Notices {
                off_topic: profile.off_topic_notice.clone(),
                limit_reached: profile.limit_notice_for(config.daily_limit),
            },
            config.max_reply_chars,
        );

        Ok(Self {
            inner: Arc::new(InnerState {
                config,
                clock,
                dispatcher,
                tasks: TaskTracker::new(),
                started_at: Instant::now(),
            }),
        })
    }

    #[must_use]
    pub fn config(&self) -> &RuntimeConfig {
        &self.inner.config
    }

    #[must_use]
    pub fn dispatcher(&self) -> &MessageDispatcher {
        &self.inner.dispatcher
    }

    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.inner.clock.now()
    }

    #[must_use]
    pub fn uptime_ms(&self) -> u64 {
        u64::try_from(self.inner.started_at.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    /// Runs one message through the pipeline. With `ack_before_reply` the
    /// network half is left to a tracked background task and this returns as
    /// soon as admission is decided.
    pub async fn process(&self, delivery_id: Uuid, message: InboundMessage) {
        let id = message.id.clone();
        let sender = message.sender.clone();

        if !self.config().ack_before_reply {
            let outcome = self.guarded(&sender, self.dispatcher().handle(message)).await;
            log_outcome(delivery_id, &id, &sender, &outcome);
            return;
        }

        let admission = AssertUnwindSafe(self.dispatcher().admit(message))
            .catch_unwind()
            .await;
        match admission {
            Ok(Admission::Finished(outcome)) => log_outcome(delivery_id, &id, &sender, &outcome),
            Ok(Admission::Pending(pending)) => {
                let state = self.clone();
                self.inner.tasks.spawn(async move {
                    let outcome = state
                        .guarded(&sender, state.dispatcher().complete(pending))
                        .await;
                    log_outcome(delivery_id, &id, &sender, &outcome);
                });
            }
            Err(_) => {
                self.dispatcher().limiter().release(&sender).await;
                log_outcome(
                    delivery_id,
                    &id,
                    &sender,
                    &Outcome::Faulted("admission panicked".to_owned()),
                );
            }
        }
    }

    /// Turns a panic into `Faulted` and frees the sender's reply slot.
    async fn guarded(&self, sender: &str, run: impl Future<Output = Outcome>) -> Outcome {
        match AssertUnwindSafe(run).catch_unwind().await {
            Ok(outcome) => outcome,
            Err(_) => {
                self.dispatcher().limiter().release(sender).await;
                Outcome::Faulted("pipeline panicked".to_owned())
            }
        }
    }

    #[must_use]
    pub fn pending_replies(&self) -> usize {
        self.inner.tasks.len()
    }

    /// Stops accepting background replies and waits up to `grace` for the
    /// ones already running.
    pub async fn drain(&self, grace: Duration) -> bool {
        self.inner.tasks.close();
        tokio::time::timeout(grace, self.inner.tasks.wait())
            .await
            .is_ok()
    }

    pub async fn sweep(&self) -> (usize, usize) {
        let dispatcher = self.dispatcher();
        let expired_ids = dispatcher.dedup().sweep().await;
        let idle_senders = dispatcher.limiter().sweep().await;
        (expired_ids, idle_senders)
    }

    pub async fn health_payload(&self) -> Value {
        let dispatcher = self.dispatcher();
        json!({
            "ok": true,
            "ts": self.now().timestamp_millis(),
            "version": self.config().runtime_version,
            "uptimeMs": self.uptime_ms(),
            "dedupEntries": dispatcher.dedup().len().await,
            "trackedSenders": dispatcher.limiter().tracked_senders().await,
            "dailyLimit": dispatcher.limiter().daily_limit(),
            "topicKeywords": dispatcher.topic().keyword_count(),
            "pendingReplies": self.pending_replies(),
            "ackBeforeReply": self.config().ack_before_reply,
            "outboundConfigured": self.config().outbound_configured(),
            "llmConfigured": self.config().llm_api_key.is_some(),
            "verifyConfigured": self.config().verify_token.is_some(),
        })
    }
}

fn log_outcome(delivery_id: Uuid, message_id: &str, sender: &str, outcome: &Outcome) {
    let sender = mask_sender(sender);
    match outcome {
        Outcome::Faulted(detail) => error!(
            "delivery {delivery_id} message {message_id} from {sender} faulted: {detail}"
        ),
        _ => info!(
            "delivery {delivery_id} message {message_id} from {sender}: {} replied={}",
            outcome.label(),
            outcome.sent_reply()
        ),
    }
}

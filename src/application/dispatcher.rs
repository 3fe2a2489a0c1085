use std::sync::Arc;

use futures_util::future::BoxFuture;
use tracing::{info, warn};

use crate::{
    application::{reply::ReplyGenerator, topic::TopicClassifier},
    domain::{
        error::DomainError,
        models::{
            IgnoreReason, InboundMessage, Outcome, RejectReason, ReplySource, SilenceReason,
        },
    },
    security::rate_limit::{RateLimitDecision, SenderRateLimiter},
    storage::DedupStore,
};

/// Outbound text transport.
pub trait MessageSender: Send + Sync {
    fn send_text<'a>(&'a self, to: &'a str, body: &'a str)
    -> BoxFuture<'a, Result<(), DomainError>>;
}

/// Canned texts sent without consulting the model.
#[derive(Debug, Clone)]
pub struct Notices {
    pub off_topic: String,
    pub limit_reached: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyAction {
    LimitNotice,
    OffTopicNotice,
    Answer,
}

/// A message that passed admission and still owes exactly one send.
#[derive(Debug, Clone)]
pub struct PendingReply {
    pub message: InboundMessage,
    pub action: ReplyAction,
}

#[derive(Debug, Clone)]
pub enum Admission {
    Finished(Outcome),
    Pending(PendingReply),
}

pub struct MessageDispatcher {
    dedup: Arc<dyn DedupStore>,
    limiter: SenderRateLimiter,
    topic: TopicClassifier,
    generator: ReplyGenerator,
    sender: Arc<dyn MessageSender>,
    notices: Notices,
    max_reply_chars: usize,
}

impl MessageDispatcher {
    #[must_use]
    pub fn new(
        dedup: Arc<dyn DedupStore>,
        limiter: SenderRateLimiter,
        topic: TopicClassifier,
        generator: ReplyGenerator,
        sender: Arc<dyn MessageSender>,
        notices: Notices,
        max_reply_chars: usize,
    ) -> Self {
        Self {
            dedup,
            limiter,
            topic,
            generator,
            sender,
            notices,
            max_reply_chars: max_reply_chars.max(1),
        }
    }

    #[must_use]
    pub fn limiter(&self) -> &SenderRateLimiter {
        &self.limiter
    }

    #[must_use]
    pub fn dedup(&self) -> &Arc<dyn DedupStore> {
        &self.dedup
    }

    #[must_use]
    pub fn topic(&self) -> &TopicClassifier {
        &self.topic
    }

    /// Runs the whole pipeline for one message.
    pub async fn handle(&self, message: InboundMessage) -> Outcome {
        match self.admit(message).await {
            Admission::Finished(outcome) => outcome,
            Admission::Pending(pending) => self.complete(pending).await,
        }
    }

    /// Makes every in-memory decision for a message without touching the
    /// network.
    pub async fn admit(&self, message: InboundMessage) -> Admission {
        if !self.dedup.claim(&message.id).await {
            return Admission::Finished(Outcome::Ignored(IgnoreReason::Duplicate));
        }

        let action = match self.limiter.check_and_reserve(&message.sender).await {
            RateLimitDecision::Cooldown => {
                return Admission::Finished(Outcome::Silenced(SilenceReason::Cooldown));
            }
            RateLimitDecision::DailyLimit {
                notice_already_sent: true,
            } => {
                return Admission::Finished(Outcome::Silenced(
                    SilenceReason::LimitNoticeAlreadySent,
                ));
            }
            RateLimitDecision::DailyLimit {
                notice_already_sent: false,
            } => ReplyAction::LimitNotice,
            RateLimitDecision::Allowed if !self.topic.is_in_domain(&message.text) => {
                self.limiter.release(&message.sender).await;
                ReplyAction::OffTopicNotice
            }
            RateLimitDecision::Allowed => ReplyAction::Answer,
        };

        Admission::Pending(PendingReply { message, action })
    }

    /// Produces and sends the reply owed by an admitted message.
    pub async fn complete(&self, pending: PendingReply) -> Outcome {
        let PendingReply { message, action } = pending;
        match action {
            ReplyAction::LimitNotice => {
                match self.send(&message, &self.notices.limit_reached).await {
                    Ok(()) => Outcome::Rejected(RejectReason::DailyLimit),
                    Err(error) => Outcome::Faulted(error.to_string()),
                }
            }
            ReplyAction::OffTopicNotice => {
                match self.send(&message, &self.notices.off_topic).await {
                    Ok(()) => Outcome::Rejected(RejectReason::OffTopic),
                    Err(error) => Outcome::Faulted(error.to_string()),
                }
            }
            ReplyAction::Answer => {
                let reply = self.generator.generate(&message.text).await;
                match self.send(&message, &reply.text).await {
                    Ok(()) => {
                        self.limiter
                            .commit(&message.sender, reply.source == ReplySource::Model)
                            .await;
                        Outcome::Answered {
                            source: reply.source,
                        }
                    }
                    Err(error) => {
                        self.limiter.release(&message.sender).await;
                        Outcome::Faulted(error.to_string())
                    }
                }
            }
        }
    }

    async fn send(&self, message: &InboundMessage, text: &str) -> Result<(), DomainError> {
        let body = truncate_chars(text, self.max_reply_chars);
        match self.sender.send_text(&message.sender, &body).await {
            Ok(()) => {
                info!(
                    "reply sent for message {} to {} ({} chars)",
                    message.id,
                    mask_sender(&message.sender),
                    body.chars().count()
                );
                Ok(())
            }
            Err(error) => {
                warn!(
                    "reply send failed for message {} to {}: {error}",
                    message.id,
                    mask_sender(&message.sender)
                );
                Err(error)
            }
        }
    }
}

/// Cuts `text` to at most `max_chars` characters, marking the cut with an
/// ellipsis.
#[must_use]
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_owned();
    }
    let mut truncated: String = text.chars().take(max_chars.saturating_sub(1)).collect();
    truncated.push('…');
    truncated
}

/// Keeps only the last four digits of a phone-number identifier.
#[must_use]
pub fn mask_sender(sender: &str) -> String {
    let count = sender.chars().count();
    if count <= 4 {
        return sender.to_owned();
    }
    let visible: String = sender.chars().skip(count - 4).collect();
    format!("***{visible}")
}

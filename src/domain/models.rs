use chrono::{DateTime, Utc};

/// One actionable message extracted from a webhook delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub id: String,
    pub sender: String,
    pub text: String,
    pub received_at: DateTime<Utc>,
}

/// Per-sender usage for the current period.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SenderUsageRecord {
    pub sender: String,
    pub period: String,
    pub answered: u32,
    pub limit_notice_sent: bool,
    pub last_reply_at: Option<DateTime<Utc>>,
    /// Set while a reply is being produced for this sender.
    pub reserved_at: Option<DateTime<Utc>>,
}

impl SenderUsageRecord {
    #[must_use]
    pub fn new(sender: &str, period: &str) -> Self {
        Self {
            sender: sender.to_owned(),
            period: period.to_owned(),
            answered: 0,
            limit_notice_sent: false,
            last_reply_at: None,
            reserved_at: None,
        }
    }

    /// Starts a fresh period. The last reply timestamp survives so a cooldown
    /// straddling midnight still applies.
    pub fn roll_over(&mut self, period: &str) {
        period.clone_into(&mut self.period);
        self.answered = 0;
        self.limit_notice_sent = false;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplySource {
    Model,
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub text: String,
    pub source: ReplySource,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    NotAMessage,
    UnsupportedType,
    EmptyText,
    Duplicate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SilenceReason {
    Cooldown,
    LimitNoticeAlreadySent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    DailyLimit,
    OffTopic,
}

/// Terminal state of one pipeline run. The transport acknowledgement is the
/// same for every variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Ignored(IgnoreReason),
    Silenced(SilenceReason),
    Rejected(RejectReason),
    Answered { source: ReplySource },
    Faulted(String),
}

impl Outcome {
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Ignored(IgnoreReason::NotAMessage) => "ignored.not-a-message",
            Self::Ignored(IgnoreReason::UnsupportedType) => "ignored.unsupported-type",
            Self::Ignored(IgnoreReason::EmptyText) => "ignored.empty-text",
            Self::Ignored(IgnoreReason::Duplicate) => "ignored.duplicate",
            Self::Silenced(SilenceReason::Cooldown) => "silenced.cooldown",
            Self::Silenced(SilenceReason::LimitNoticeAlreadySent) => "silenced.limit-notice-sent",
            Self::Rejected(RejectReason::DailyLimit) => "rejected.daily-limit",
            Self::Rejected(RejectReason::OffTopic) => "rejected.off-topic",
            Self::Answered {
                source: ReplySource::Model,
            } => "answered.model",
            Self::Answered {
                source: ReplySource::Fallback,
            } => "answered.fallback",
            Self::Faulted(_) => "faulted",
        }
    }

    /// Whether this outcome involved an outbound send.
    #[must_use]
    pub fn sent_reply(&self) -> bool {
        matches!(self, Self::Rejected(_) | Self::Answered { .. })
    }
}

use std::sync::Arc;

use futures_util::future::BoxFuture;
use tracing::warn;

use crate::domain::{
    error::DomainError,
    models::{Reply, ReplySource},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionRequest {
    pub system: String,
    pub user: String,
}

/// Single-turn completion against an upstream model.
pub trait CompletionClient: Send + Sync {
    fn complete(&self, request: CompletionRequest) -> BoxFuture<'_, Result<String, DomainError>>;
}

#[derive(Clone)]
pub struct ReplyGenerator {
    client: Arc<dyn CompletionClient>,
    system_prompt: String,
    fallback: String,
}

impl ReplyGenerator {
    #[must_use]
    pub fn new(
        client: Arc<dyn CompletionClient>,
        system_prompt: impl Into<String>,
        fallback: impl Into<String>,
    ) -> Self {
        Self {
            client,
            system_prompt: system_prompt.into(),
            fallback: fallback.into(),
        }
    }

    /// Makes one completion attempt; every failure maps to the fallback text.
    pub async fn generate(&self, text: &str) -> Reply {
        let request = CompletionRequest {
            system: self.system_prompt.clone(),
            user: text.trim().to_owned(),
        };

        match self.client.complete(request).await {
            Ok(completion) if !completion.trim().is_empty() => Reply {
                text: completion.trim().to_owned(),
                source: ReplySource::Model,
            },
            Ok(_) => {
                warn!("completion came back empty; using fallback reply");
                self.fallback_reply()
            }
            Err(error) => {
                warn!("completion failed; using fallback reply: {error}");
                self.fallback_reply()
            }
        }
    }

    fn fallback_reply(&self) -> Reply {
        Reply {
            text: self.fallback.clone(),
            source: ReplySource::Fallback,
        }
    }
}

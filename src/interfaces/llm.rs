use std::time::Duration;

use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};

use crate::{
    application::reply::{CompletionClient, CompletionRequest},
    domain::error::DomainError,
};

const SERVICE: &str = "llm";

#[derive(Debug, Serialize)]
struct ChatCompletionsBody<'a> {
    model: &'a str,
    messages: [ChatTurn<'a>; 2],
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatTurn<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionsResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// OpenAI-compatible `chat/completions` client.
#[derive(Debug, Clone)]
pub struct OpenAiCompletions {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    max_tokens: u32,
}

impl OpenAiCompletions {
    pub fn new(
        base_url: &str,
        api_key: Option<String>,
        model: &str,
        max_tokens: u32,
        timeout: Duration,
    ) -> Result<Self, DomainError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| {
                DomainError::Unavailable(format!("failed to construct llm http client: {error}"))
            })?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_owned(),
            api_key,
            model: model.to_owned(),
            max_tokens,
        })
    }

    async fn request(&self, request: CompletionRequest) -> Result<String, DomainError> {
        let Some(api_key) = self.api_key.as_deref() else {
            return Err(DomainError::Unavailable(
                "llm api key is not configured".to_owned(),
            ));
        };

        let body = ChatCompletionsBody {
            model: &self.model,
            messages: [
                ChatTurn {
                    role: "system",
                    content: &request.system,
                },
                ChatTurn {
                    role: "user",
                    content: &request.user,
                },
            ],
            max_tokens: self.max_tokens,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(|error| DomainError::transport(SERVICE, error))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let detail = response.text().await.unwrap_or_default();
            return Err(DomainError::Upstream {
                service: SERVICE,
                status,
                detail,
            });
        }

        let payload = response
            .json::<ChatCompletionsResponse>()
            .await
            .map_err(|error| DomainError::decode(SERVICE, error))?;

        payload
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| DomainError::decode(SERVICE, "response carried no message content"))
    }
}

impl CompletionClient for OpenAiCompletions {
    fn complete(&self, request: CompletionRequest) -> BoxFuture<'_, Result<String, DomainError>> {
        Box::pin(self.request(request))
    }
}

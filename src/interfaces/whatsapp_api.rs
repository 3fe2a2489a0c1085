use std::time::Duration;

use futures_util::future::BoxFuture;
use serde::Serialize;

use crate::{application::dispatcher::MessageSender, domain::error::DomainError};

const SERVICE: &str = "whatsapp";

#[derive(Debug, Serialize)]
struct SendMessageBody<'a> {
    messaging_product: &'static str,
    recipient_type: &'static str,
    to: &'a str,
    #[serde(rename = "type")]
    kind: &'static str,
    text: SendText<'a>,
}

#[derive(Debug, Serialize)]
struct SendText<'a> {
    preview_url: bool,
    body: &'a str,
}

/// Sends text messages through the WhatsApp Cloud API.
#[derive(Debug, Clone)]
pub struct CloudApiSender {
    client: reqwest::Client,
    base_url: String,
    access_token: Option<String>,
    phone_number_id: Option<String>,
}

impl CloudApiSender {
    pub fn new(
        base_url: &str,
        access_token: Option<String>,
        phone_number_id: Option<String>,
        timeout: Duration,
    ) -> Result<Self, DomainError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| {
                DomainError::Unavailable(format!(
                    "failed to construct whatsapp http client: {error}"
                ))
            })?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_owned(),
            access_token,
            phone_number_id,
        })
    }

    async fn post_text(&self, to: &str, body: &str) -> Result<(), DomainError> {
        let (Some(token), Some(phone_number_id)) =
            (self.access_token.as_deref(), self.phone_number_id.as_deref())
        else {
            return Err(DomainError::Unavailable(
                "whatsapp access token or phone number id is not configured".to_owned(),
            ));
        };

        let payload = SendMessageBody {
            messaging_product: "whatsapp",
            recipient_type: "individual",
            to,
            kind: "text",
            text: SendText {
                preview_url: false,
                body,
            },
        };

        let response = self
            .client
            .post(format!("{}/{phone_number_id}/messages", self.base_url))
            .bearer_auth(token)
            .json(&payload)
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

        Ok(())
    }
}

impl MessageSender for CloudApiSender {
    fn send_text<'a>(
        &'a self,
        to: &'a str,
        body: &'a str,
    ) -> BoxFuture<'a, Result<(), DomainError>> {
        Box::pin(self.post_text(to, body))
    }
}

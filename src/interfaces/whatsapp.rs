use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::{
    application::state::SharedState,
    domain::models::{IgnoreReason, InboundMessage},
    security::auth::verify_subscription,
};

const EVENT_RECEIVED: &str = "EVENT_RECEIVED";

#[derive(Debug, Deserialize)]
pub struct VerifyQuery {
    #[serde(rename = "hub.mode", default)]
    pub mode: Option<String>,
    #[serde(rename = "hub.verify_token", default)]
    pub verify_token: Option<String>,
    #[serde(rename = "hub.challenge", default)]
    pub challenge: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct WebhookDelivery {
    #[serde(default)]
    pub entry: Vec<WebhookEntry>,
}

#[derive(Debug, Default, Deserialize)]
pub struct WebhookEntry {
    #[serde(default)]
    pub changes: Vec<WebhookChange>,
}

#[derive(Debug, Default, Deserialize)]
pub struct WebhookChange {
    #[serde(default)]
    pub value: ChangeValue,
}

#[derive(Debug, Default, Deserialize)]
pub struct ChangeValue {
    #[serde(default)]
    pub messages: Vec<WhatsAppMessage>,
}

#[derive(Debug, Default, Deserialize)]
pub struct WhatsAppMessage {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub from: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub text: Option<TextContent>,
    #[serde(default)]
    pub button: Option<ButtonContent>,
    #[serde(default)]
    pub interactive: Option<InteractiveContent>,
}

#[derive(Debug, Deserialize)]
pub struct TextContent {
    #[serde(default)]
    pub body: String,
}

#[derive(Debug, Deserialize)]
pub struct ButtonContent {
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct InteractiveContent {
    #[serde(default)]
    pub button_reply: Option<SelectionReply>,
    #[serde(default)]
    pub list_reply: Option<SelectionReply>,
}

#[derive(Debug, Deserialize)]
pub struct SelectionReply {
    #[serde(default)]
    pub title: String,
}

pub async fn verify_handler(
    State(state): State<SharedState>,
    Query(query): Query<VerifyQuery>,
) -> Response {
    match verify_subscription(
        state.config().verify_token.as_deref(),
        query.mode.as_deref(),
        query.verify_token.as_deref(),
        query.challenge.as_deref(),
    ) {
        Ok(challenge) => {
            info!("webhook subscription verified");
            (
                StatusCode::OK,
                [(header::CONTENT_TYPE, "text/plain")],
                challenge.to_owned(),
            )
                .into_response()
        }
        Err(reason) => {
            warn!("webhook verification rejected: {reason:?}");
            (StatusCode::FORBIDDEN, "Forbidden").into_response()
        }
    }
}

/// Always acknowledges with 200 so the transport never redelivers.
pub async fn webhook_handler(State(state): State<SharedState>, body: Bytes) -> impl IntoResponse {
    let delivery_id = uuid::Uuid::new_v4();
    let delivery = match serde_json::from_slice::<WebhookDelivery>(&body) {
        Ok(delivery) => delivery,
        Err(error) => {
            warn!("delivery {delivery_id} has an unexpected shape, ignoring: {error}");
            return (StatusCode::OK, EVENT_RECEIVED);
        }
    };

    let received_at = state.now();
    for item in extract_messages(delivery, received_at) {
        match item {
            Ok(message) => state.process(delivery_id, message).await,
            Err(reason) => debug!("delivery {delivery_id} ignored: {reason:?}"),
        }
    }

    (StatusCode::OK, EVENT_RECEIVED)
}

/// Flattens a delivery into its messages. A delivery without any message,
/// such as a status notification, yields a single `NotAMessage`.
pub fn extract_messages(
    delivery: WebhookDelivery,
    received_at: DateTime<Utc>,
) -> Vec<Result<InboundMessage, IgnoreReason>> {
    let items: Vec<_> = delivery
        .entry
        .into_iter()
        .flat_map(|entry| entry.changes)
        .flat_map(|change| change.value.messages)
        .map(|message| to_inbound(message, received_at))
        .collect();

    if items.is_empty() {
        return vec![Err(IgnoreReason::NotAMessage)];
    }
    items
}

fn to_inbound(
    message: WhatsAppMessage,
    received_at: DateTime<Utc>,
) -> Result<InboundMessage, IgnoreReason> {
    let id = message.id.trim().to_owned();
    let sender = message.from.trim().to_owned();
    if id.is_empty() || sender.is_empty() {
        return Err(IgnoreReason::NotAMessage);
    }

    let text = match message.kind.as_str() {
        "text" => message.text.map(|text| text.body),
        "button" => message.button.map(|button| button.text),
        "interactive" => message.interactive.and_then(|interactive| {
            interactive
                .button_reply
                .or(interactive.list_reply)
                .map(|reply| reply.title)
        }),
        _ => return Err(IgnoreReason::UnsupportedType),
    };
    let text = text
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
        .ok_or(IgnoreReason::EmptyText)?;

    let received_at = message
        .timestamp
        .as_deref()
        .and_then(|raw| raw.parse::<i64>().ok())
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .unwrap_or(received_at);

    Ok(InboundMessage {
        id,
        sender,
        text,
        received_at,
    })
}

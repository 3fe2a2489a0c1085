use apiary_bridge::application::profile::AssistantProfile;
use serde_json::json;

use super::support::{MODEL_ANSWER, spawn_server, spawn_server_with, text_delivery};

const SENDER: &str = "905321234567";
const BEE_QUESTION: &str = "Kovanımda varroa gördüm, ne yapmalıyım?";

#[tokio::test]
async fn verification_echoes_challenge_for_matching_token() {
    let server = spawn_server().await;

    let response = reqwest::get(format!(
        "{}?hub.mode=subscribe&hub.verify_token=test-verify-token&hub.challenge=1158201444",
        server.webhook_url()
    ))
    .await
    .expect("verification should respond");

    assert_eq!(response.status(), reqwest::StatusCode::OK);
    assert_eq!(
        response.text().await.expect("challenge body"),
        "1158201444"
    );

    server.stop().await;
}

#[tokio::test]
async fn verification_rejects_wrong_token() {
    let server = spawn_server().await;

    for path in ["webhook", "api/webhook"] {
        let response = reqwest::get(format!(
            "http://{}/{path}?hub.mode=subscribe&hub.verify_token=nope&hub.challenge=42",
            server.addr
        ))
        .await
        .expect("verification should respond");
        assert_eq!(response.status(), reqwest::StatusCode::FORBIDDEN);
    }

    server.stop().await;
}

#[tokio::test]
async fn in_domain_question_is_answered_by_model() {
    let mut server = spawn_server().await;

    let response = server
        .post_delivery(&text_delivery("wamid.A1", SENDER, BEE_QUESTION))
        .await;
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    assert_eq!(
        response.text().await.expect("ack body"),
        "EVENT_RECEIVED"
    );

    let sent = server.upstream.drain_sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].phone_number_id, "100200300");
    assert_eq!(
        sent[0].authorization.as_deref(),
        Some("Bearer test-whatsapp-token")
    );
    assert_eq!(sent[0].to(), SENDER);
    assert_eq!(sent[0].text(), MODEL_ANSWER);
    assert_eq!(sent[0].body["messaging_product"], "whatsapp");
    assert_eq!(sent[0].body["type"], "text");

    let completions = server.upstream.drain_completions();
    assert_eq!(completions.len(), 1);
    assert_eq!(completions[0]["model"], "test-model");
    assert_eq!(completions[0]["messages"][0]["role"], "system");
    assert_eq!(completions[0]["messages"][1]["role"], "user");
    assert_eq!(completions[0]["messages"][1]["content"], BEE_QUESTION);

    server.stop().await;
}

#[tokio::test]
async fn redelivered_message_is_not_answered_twice() {
    let mut server = spawn_server_with(|config| {
        config.cooldown = std::time::Duration::ZERO;
    })
    .await;
    let delivery = text_delivery("wamid.B1", SENDER, BEE_QUESTION);

    server.post_delivery(&delivery).await;
    let second = server.post_delivery(&delivery).await;
    assert_eq!(second.status(), reqwest::StatusCode::OK);

    assert_eq!(server.upstream.drain_sent().len(), 1);
    assert_eq!(server.upstream.drain_completions().len(), 1);

    server.stop().await;
}

#[tokio::test]
async fn daily_limit_sends_one_notice_then_goes_quiet() {
    let mut server = spawn_server_with(|config| {
        config.daily_limit = 2;
        config.cooldown = std::time::Duration::ZERO;
    })
    .await;

    for index in 0..4 {
        server
            .post_delivery(&text_delivery(
                &format!("wamid.C{index}"),
                SENDER,
                BEE_QUESTION,
            ))
            .await;
    }

    let texts: Vec<String> = server
        .upstream
        .drain_sent()
        .iter()
        .map(|sent| sent.text().to_owned())
        .collect();
    assert_eq!(
        texts,
        vec![
            MODEL_ANSWER.to_owned(),
            MODEL_ANSWER.to_owned(),
            AssistantProfile::default().limit_notice_for(2),
        ]
    );
    assert_eq!(server.upstream.drain_completions().len(), 2);

    server.stop().await;
}

#[tokio::test]
async fn off_topic_question_gets_notice_without_model_call() {
    let mut server = spawn_server().await;

    server
        .post_delivery(&text_delivery(
            "wamid.D1",
            SENDER,
            "Dün akşamki maç kaç kaç bitti?",
        ))
        .await;

    let sent = server.upstream.drain_sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].text(), AssistantProfile::default().off_topic_notice);
    assert!(server.upstream.drain_completions().is_empty());

    // The notice does not start a cooldown.
    server
        .post_delivery(&text_delivery("wamid.D2", SENDER, BEE_QUESTION))
        .await;
    let sent = server.upstream.drain_sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].text(), MODEL_ANSWER);

    server.stop().await;
}

#[tokio::test]
async fn cooldown_silences_rapid_follow_up() {
    let mut server = spawn_server().await;

    server
        .post_delivery(&text_delivery("wamid.E1", SENDER, BEE_QUESTION))
        .await;
    server
        .post_delivery(&text_delivery("wamid.E2", SENDER, "Peki ballık kovana ne zaman konur?"))
        .await;

    assert_eq!(server.upstream.drain_sent().len(), 1);

    server.stop().await;
}

#[tokio::test]
async fn completion_failure_falls_back_to_canned_reply() {
    let mut server = spawn_server().await;
    server.upstream.fail_completions();

    server
        .post_delivery(&text_delivery("wamid.F1", SENDER, BEE_QUESTION))
        .await;

    let sent = server.upstream.drain_sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].text(), AssistantProfile::default().fallback_reply);

    server.stop().await;
}

#[tokio::test]
async fn status_and_malformed_deliveries_are_acknowledged_silently() {
    let mut server = spawn_server().await;

    let status = json!({
        "object": "whatsapp_business_account",
        "entry": [{
            "changes": [{
                "field": "messages",
                "value": {
                    "statuses": [{
                        "id": "wamid.S1",
                        "status": "delivered",
                        "recipient_id": SENDER
                    }]
                }
            }]
        }]
    });
    let response = server.post_delivery(&status).await;
    assert_eq!(response.status(), reqwest::StatusCode::OK);

    let response = reqwest::Client::new()
        .post(server.webhook_url())
        .header(reqwest::header::CONTENT_TYPE, "application/json")
        .body("{not json")
        .send()
        .await
        .expect("webhook should respond");
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    assert_eq!(
        response.text().await.expect("ack body"),
        "EVENT_RECEIVED"
    );

    assert!(server.upstream.drain_sent().is_empty());
    assert!(server.upstream.drain_completions().is_empty());

    server.stop().await;
}

#[tokio::test]
async fn acknowledges_before_replying_when_enabled() {
    let mut server = spawn_server_with(|config| {
        config.ack_before_reply = true;
    })
    .await;

    let response = server
        .post_delivery(&text_delivery("wamid.G1", SENDER, BEE_QUESTION))
        .await;
    assert_eq!(response.status(), reqwest::StatusCode::OK);

    let sent = server.upstream.next_sent().await;
    assert_eq!(sent.to(), SENDER);
    assert_eq!(sent.text(), MODEL_ANSWER);

    server.stop().await;
}

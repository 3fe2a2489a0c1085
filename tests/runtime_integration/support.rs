use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use apiary_bridge::application::{config::RuntimeConfig, startup};
use axum::{
    Json, Router,
    extract::{Path, State},
    http::{HeaderMap, StatusCode, header},
    response::IntoResponse,
    routing::post,
};
use serde_json::{Value, json};
use tokio::{
    net::TcpListener,
    sync::{mpsc, oneshot},
    task::JoinHandle,
    time::timeout,
};

pub(crate) const MODEL_ANSWER: &str = "Varroa için sonbaharda oksalik asit uygulayabilirsin.";

/// A message the bridge posted to the mock Graph API.
#[derive(Debug, Clone)]
pub(crate) struct SentMessage {
    pub(crate) phone_number_id: String,
    pub(crate) authorization: Option<String>,
    pub(crate) body: Value,
}

impl SentMessage {
    pub(crate) fn to(&self) -> &str {
        self.body["to"].as_str().unwrap_or_default()
    }

    pub(crate) fn text(&self) -> &str {
        self.body["text"]["body"].as_str().unwrap_or_default()
    }
}

#[derive(Clone)]
struct MockState {
    sent_tx: mpsc::UnboundedSender<SentMessage>,
    completion_tx: mpsc::UnboundedSender<Value>,
    llm_failing: Arc<AtomicBool>,
}

/// Stand-in for both the Graph API and the completion API.
pub(crate) struct MockUpstream {
    pub(crate) addr: SocketAddr,
    sent_rx: mpsc::UnboundedReceiver<SentMessage>,
    completion_rx: mpsc::UnboundedReceiver<Value>,
    llm_failing: Arc<AtomicBool>,
    shutdown: Option<oneshot::Sender<()>>,
    join: JoinHandle<()>,
}

impl MockUpstream {
    pub(crate) async fn start() -> Self {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0))
            .await
            .expect("mock listener should bind");
        let addr = listener
            .local_addr()
            .expect("mock listener should expose local addr");

        let (sent_tx, sent_rx) = mpsc::unbounded_channel();
        let (completion_tx, completion_rx) = mpsc::unbounded_channel();
        let llm_failing = Arc::new(AtomicBool::new(false));
        let app = Router::new()
            .route("/v22.0/{phone_number_id}/messages", post(graph_send))
            .route("/v1/chat/completions", post(chat_completions))
            .with_state(MockState {
                sent_tx,
                completion_tx,
                llm_failing: llm_failing.clone(),
            });

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let join = tokio::spawn(async move {
            let _ = axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await;
        });

        Self {
            addr,
            sent_rx,
            completion_rx,
            llm_failing,
            shutdown: Some(shutdown_tx),
            join,
        }
    }

    pub(crate) fn fail_completions(&self) {
        self.llm_failing.store(true, Ordering::SeqCst);
    }

    /// Everything sent so far, without waiting.
    pub(crate) fn drain_sent(&mut self) -> Vec<SentMessage> {
        let mut sent = Vec::new();
        while let Ok(message) = self.sent_rx.try_recv() {
            sent.push(message);
        }
        sent
    }

    pub(crate) async fn next_sent(&mut self) -> SentMessage {
        timeout(Duration::from_secs(3), self.sent_rx.recv())
            .await
            .expect("outbound send should arrive")
            .expect("outbound channel should stay open")
    }

    pub(crate) fn drain_completions(&mut self) -> Vec<Value> {
        let mut requests = Vec::new();
        while let Ok(request) = self.completion_rx.try_recv() {
            requests.push(request);
        }
        requests
    }

    pub(crate) async fn stop(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        let _ = self.join.await;
    }
}

async fn graph_send(
    State(state): State<MockState>,
    Path(phone_number_id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    let authorization = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned);
    let _ = state.sent_tx.send(SentMessage {
        phone_number_id,
        authorization,
        body,
    });
    Json(json!({
        "messaging_product": "whatsapp",
        "messages": [{ "id": "wamid.outbound" }]
    }))
}

async fn chat_completions(
    State(state): State<MockState>,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    let _ = state.completion_tx.send(body);
    if state.llm_failing.load(Ordering::SeqCst) {
        return (
            StatusCode::TOO_MANY_REQUESTS,
            Json(json!({ "error": { "code": "insufficient_quota" } })),
        );
    }
    (
        StatusCode::OK,
        Json(json!({
            "choices": [{
                "index": 0,
                "message": { "role": "assistant", "content": MODEL_ANSWER },
                "finish_reason": "stop"
            }]
        })),
    )
}

pub(crate) struct ServerHandle {
    pub(crate) addr: SocketAddr,
    pub(crate) upstream: MockUpstream,
    shutdown: Option<oneshot::Sender<()>>,
    join: JoinHandle<()>,
}

impl ServerHandle {
    pub(crate) fn webhook_url(&self) -> String {
        format!("http://{}/webhook", self.addr)
    }

    pub(crate) async fn post_delivery(&self, delivery: &Value) -> reqwest::Response {
        reqwest::Client::new()
            .post(self.webhook_url())
            .json(delivery)
            .send()
            .await
            .expect("webhook should respond")
    }

    pub(crate) async fn stop(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        let _ = self.join.await;
        self.upstream.stop().await;
    }
}

pub(crate) async fn spawn_server() -> ServerHandle {
    spawn_server_with(|_: &mut RuntimeConfig| {}).await
}

pub(crate) async fn spawn_server_with(configure: impl FnOnce(&mut RuntimeConfig)) -> ServerHandle {
    let upstream = MockUpstream::start().await;

    let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0))
        .await
        .expect("listener should bind");
    let addr = listener
        .local_addr()
        .expect("listener should expose local addr");

    let mut config = RuntimeConfig::for_test(IpAddr::V4(Ipv4Addr::LOCALHOST), addr.port());
    config.graph_api_base_url = format!("http://{}/v22.0", upstream.addr);
    config.llm_base_url = format!("http://{}/v1", upstream.addr);
    configure(&mut config);

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let join = tokio::spawn(async move {
        let _ = startup::run_with_listener(listener, config, async {
            let _ = shutdown_rx.await;
        })
        .await;
    });

    ServerHandle {
        addr,
        upstream,
        shutdown: Some(shutdown_tx),
        join,
    }
}

/// Builds a Cloud API delivery carrying one text message.
pub(crate) fn text_delivery(message_id: &str, from: &str, body: &str) -> Value {
    json!({
        "object": "whatsapp_business_account",
        "entry": [{
            "id": "102290129340398",
            "changes": [{
                "field": "messages",
                "value": {
                    "messaging_product": "whatsapp",
                    "metadata": {
                        "display_phone_number": "15550783881",
                        "phone_number_id": "100200300"
                    },
                    "contacts": [{ "profile": { "name": "Ayşe" }, "wa_id": from }],
                    "messages": [{
                        "from": from,
                        "id": message_id,
                        "timestamp": "1760000000",
                        "type": "text",
                        "text": { "body": body }
                    }]
                }
            }]
        }]
    })
}

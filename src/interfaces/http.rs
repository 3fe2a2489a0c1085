use std::future::Future;

use axum::{Json, Router, extract::State, http::StatusCode, response::IntoResponse, routing::get};
use tokio::net::TcpListener;
use tracing::info;

use crate::{application::state::SharedState, domain::error::DomainError, interfaces::whatsapp};

pub fn build_router(state: SharedState) -> Router {
    Router::new()
        .route("/", get(root_handler))
        .route("/healthz", get(healthz_handler))
        .route(
            "/webhook",
            get(whatsapp::verify_handler).post(whatsapp::webhook_handler),
        )
        .route(
            "/api/webhook",
            get(whatsapp::verify_handler).post(whatsapp::webhook_handler),
        )
        .with_state(state)
}

pub async fn serve(
    listener: TcpListener,
    state: SharedState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), DomainError> {
    let local_addr = listener.local_addr().map_err(|error| {
        DomainError::Unavailable(format!("failed to read listener address: {error}"))
    })?;

    info!(
        "apiary-bridge listening on http://{}:{}/webhook",
        local_addr.ip(),
        local_addr.port(),
    );

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|error| DomainError::Unavailable(format!("server runtime error: {error}")))
}

async fn root_handler() -> impl IntoResponse {
    (StatusCode::OK, "Arıcılık Asistanı webhook hazır")
}

async fn healthz_handler(State(state): State<SharedState>) -> impl IntoResponse {
    (StatusCode::OK, Json(state.health_payload().await))
}

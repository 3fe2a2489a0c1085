use std::{future::Future, time::Duration};

use tokio::net::TcpListener;
use tracing::{debug, info, warn};
use tracing_subscriber::{EnvFilter, fmt};

use crate::{
    application::{
        config::{Args, RuntimeConfig},
        state::SharedState,
    },
    domain::error::DomainError,
    interfaces::http,
};

const DRAIN_GRACE: Duration = Duration::from_secs(30);

pub async fn run(args: Args) -> Result<(), DomainError> {
    let config = RuntimeConfig::from_args(args)
        .map_err(|error| DomainError::InvalidConfig(format!("configuration error: {error}")))?;

    init_logging(&config.log_filter, config.json_logs)?;
    let listener = TcpListener::bind(config.bind_addr())
        .await
        .map_err(|error| DomainError::Unavailable(format!("failed to bind listener: {error}")))?;

    let signal = shutdown_signal();
    run_with_listener(listener, config, signal).await
}

pub async fn run_with_listener(
    listener: TcpListener,
    config: RuntimeConfig,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), DomainError> {
    let state = SharedState::new(config)?;
    run_with_state(listener, state, shutdown).await
}

pub async fn run_with_state(
    listener: TcpListener,
    state: SharedState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), DomainError> {
    let config = state.config();
    info!(
        "starting apiary-bridge host={} port={} daily_limit={} cooldown_ms={} ack_before_reply={}",
        config.host,
        config.port,
        config.daily_limit,
        config.cooldown.as_millis(),
        config.ack_before_reply
    );
    if config.verify_token.is_none() {
        warn!("VERIFY_TOKEN is not set; webhook verification will be refused");
    }
    if !config.outbound_configured() {
        warn!("WHATSAPP_TOKEN or PHONE_NUMBER_ID is not set; replies cannot be sent");
    }
    if config.llm_api_key.is_none() {
        warn!("OPENAI_API_KEY is not set; every answer will use the fallback reply");
    }

    let sweeper = spawn_sweeper(state.clone());
    let serve_result = http::serve(listener, state.clone(), shutdown).await;

    sweeper.abort();
    if let Err(error) = sweeper.await
        && !error.is_cancelled()
    {
        warn!("sweeper task failed: {error}");
    }

    let pending = state.pending_replies();
    if pending > 0 {
        info!("waiting for {pending} background replies to finish");
    }
    if !state.drain(DRAIN_GRACE).await {
        warn!("background replies still running after shutdown grace period");
    }

    serve_result
}

fn init_logging(filter: &str, json_logs: bool) -> Result<(), DomainError> {
    let env_filter = EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = fmt().with_env_filter(env_filter).with_target(false);

    if json_logs {
        builder.json().try_init().map_err(|error| {
            DomainError::Unavailable(format!("failed to initialize logger: {error}"))
        })?;
    } else {
        builder.compact().try_init().map_err(|error| {
            DomainError::Unavailable(format!("failed to initialize logger: {error}"))
        })?;
    }

    Ok(())
}

fn spawn_sweeper(state: SharedState) -> tokio::task::JoinHandle<()> {
    let interval = state.config().sweep_interval;
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let (expired_ids, idle_senders) = state.sweep().await;
            debug!("sweep removed {expired_ids} message ids and {idle_senders} idle senders");
        }
    })
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received");
}

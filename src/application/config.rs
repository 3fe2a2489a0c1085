use std::{
    net::{IpAddr, SocketAddr},
    path::PathBuf,
    time::Duration,
};

use clap::{ArgAction, Parser};

use crate::application::profile::AssistantProfile;

#[derive(Debug, Clone, Parser)]
#[command(
    name = "apiary-bridge",
    version,
    about = "WhatsApp webhook bridge for a topic-restricted LLM assistant"
)]
pub struct Args {
    #[arg(long, env = "APIARY_HOST", default_value = "0.0.0.0")]
    pub host: IpAddr,

    #[arg(long, env = "PORT", default_value_t = 3000)]
    pub port: u16,

    #[arg(long, env = "VERIFY_TOKEN")]
    pub verify_token: Option<String>,

    #[arg(long, env = "WHATSAPP_TOKEN")]
    pub whatsapp_token: Option<String>,

    #[arg(long, env = "PHONE_NUMBER_ID")]
    pub phone_number_id: Option<String>,

    #[arg(
        long,
        env = "APIARY_GRAPH_API_BASE_URL",
        default_value = "https://graph.facebook.com/v22.0"
    )]
    pub graph_api_base_url: String,

    #[arg(long, env = "APIARY_WHATSAPP_TIMEOUT_MS", default_value_t = 10_000)]
    pub whatsapp_timeout_ms: u64,

    #[arg(long, env = "OPENAI_API_KEY")]
    pub llm_api_key: Option<String>,

    #[arg(
        long,
        env = "APIARY_LLM_BASE_URL",
        default_value = "https://api.openai.com/v1"
    )]
    pub llm_base_url: String,

    #[arg(long, env = "APIARY_LLM_MODEL", default_value = "gpt-4o-mini")]
    pub llm_model: String,

    #[arg(long, env = "APIARY_LLM_TIMEOUT_MS", default_value_t = 20_000)]
    pub llm_timeout_ms: u64,

    #[arg(long, env = "APIARY_LLM_MAX_TOKENS", default_value_t = 500)]
    pub llm_max_tokens: u32,

    #[arg(long, env = "APIARY_DAILY_LIMIT", default_value_t = 5)]
    pub daily_limit: u32,

    #[arg(long, env = "APIARY_COOLDOWN_MS", default_value_t = 15_000)]
    pub cooldown_ms: u64,

    #[arg(long, env = "APIARY_DEDUP_TTL_MS", default_value_t = 24 * 60 * 60 * 1000)]
    pub dedup_ttl_ms: u64,

    #[arg(long, env = "APIARY_DEDUP_CAPACITY", default_value_t = 1000)]
    pub dedup_capacity: usize,

    #[arg(long, env = "APIARY_SWEEP_INTERVAL_MS", default_value_t = 60_000)]
    pub sweep_interval_ms: u64,

    #[arg(
        long,
        env = "APIARY_ACK_BEFORE_REPLY",
        default_value_t = true,
        action = ArgAction::Set
    )]
    pub ack_before_reply: bool,

    #[arg(long, env = "APIARY_MAX_REPLY_CHARS", default_value_t = 4096)]
    pub max_reply_chars: usize,

    #[arg(long, env = "APIARY_PROFILE")]
    pub profile: Option<PathBuf>,

    #[arg(long, env = "APIARY_RUNTIME_VERSION", default_value = env!("CARGO_PKG_VERSION"))]
    pub runtime_version: String,

    #[arg(long, env = "RUST_LOG", default_value = "info")]
    pub log_filter: String,

    #[arg(long, env = "APIARY_JSON_LOGS", default_value_t = false, action = ArgAction::Set)]
    pub json_logs: bool,
}

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub host: IpAddr,
    pub port: u16,
    pub verify_token: Option<String>,
    pub whatsapp_token: Option<String>,
    pub phone_number_id: Option<String>,
    pub graph_api_base_url: String,
    pub whatsapp_timeout: Duration,
    pub llm_api_key: Option<String>,
    pub llm_base_url: String,
    pub llm_model: String,
    pub llm_timeout: Duration,
    pub llm_max_tokens: u32,
    pub daily_limit: u32,
    pub cooldown: Duration,
    pub dedup_ttl: Duration,
    pub dedup_capacity: usize,
    pub sweep_interval: Duration,
    pub ack_before_reply: bool,
    pub max_reply_chars: usize,
    pub profile: AssistantProfile,
    pub runtime_version: String,
    pub log_filter: String,
    pub json_logs: bool,
}

impl RuntimeConfig {
    pub fn from_args(args: Args) -> Result<Self, String> {
        if args.port == 0 {
            return Err("port must be greater than 0".to_owned());
        }
        if args.daily_limit == 0 {
            return Err("daily_limit must be greater than 0".to_owned());
        }
        if args.dedup_ttl_ms == 0 {
            return Err("dedup_ttl_ms must be greater than 0".to_owned());
        }
        if args.dedup_capacity == 0 {
            return Err("dedup_capacity must be greater than 0".to_owned());
        }
        if args.sweep_interval_ms == 0 {
            return Err("sweep_interval_ms must be greater than 0".to_owned());
        }
        if args.max_reply_chars == 0 {
            return Err("max_reply_chars must be greater than 0".to_owned());
        }

        let profile = match &args.profile {
            Some(path) => AssistantProfile::load(path).map_err(|error| error.to_string())?,
            None => AssistantProfile::default(),
        };

        Ok(Self {
            host: args.host,
            port: args.port,
            verify_token: normalize_secret(args.verify_token),
            whatsapp_token: normalize_secret(args.whatsapp_token),
            phone_number_id: normalize_secret(args.phone_number_id),
            graph_api_base_url: args.graph_api_base_url,
            whatsapp_timeout: Duration::from_millis(args.whatsapp_timeout_ms),
            llm_api_key: normalize_secret(args.llm_api_key),
            llm_base_url: args.llm_base_url,
            llm_model: args.llm_model,
            llm_timeout: Duration::from_millis(args.llm_timeout_ms),
            llm_max_tokens: args.llm_max_tokens,
            daily_limit: args.daily_limit,
            cooldown: Duration::from_millis(args.cooldown_ms),
            dedup_ttl: Duration::from_millis(args.dedup_ttl_ms),
            dedup_capacity: args.dedup_capacity,
            sweep_interval: Duration::from_millis(args.sweep_interval_ms),
            ack_before_reply: args.ack_before_reply,
            max_reply_chars: args.max_reply_chars,
            profile,
            runtime_version: args.runtime_version,
            log_filter: args.log_filter,
            json_logs: args.json_logs,
        })
    }

    #[must_use]
    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    #[must_use]
    pub fn outbound_configured(&self) -> bool {
        self.whatsapp_token.is_some() && self.phone_number_id.is_some()
    }

    #[must_use]
    pub fn for_test(host: IpAddr, port: u16) -> Self {
        Self {
            host,
            port,
            verify_token: Some("test-verify-token".to_owned()),
            whatsapp_token: Some("test-whatsapp-token".to_owned()),
            phone_number_id: Some("100200300".to_owned()),
            graph_api_base_url: "http://127.0.0.1:9".to_owned(),
            whatsapp_timeout: Duration::from_millis(2_000),
            llm_api_key: Some("test-llm-key".to_owned()),
            llm_base_url: "http://127.0.0.1:9".to_owned(),
            llm_model: "test-model".to_owned(),
            llm_timeout: Duration::from_millis(2_000),
            llm_max_tokens: 200,
            daily_limit: 5,
            cooldown: Duration::from_millis(15_000),
            dedup_ttl: Duration::from_secs(24 * 60 * 60),
            dedup_capacity: 1000,
            sweep_interval: Duration::from_millis(60_000),
            ack_before_reply: false,
            max_reply_chars: 4096,
            profile: AssistantProfile::default(),
            runtime_version: "test".to_owned(),
            log_filter: "warn".to_owned(),
            json_logs: false,
        }
    }
}

fn normalize_secret(input: Option<String>) -> Option<String> {
    input.and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_owned())
        }
    })
}

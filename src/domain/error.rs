use thiserror::Error;

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    #[error("{service} returned {status}: {detail}")]
    Upstream {
        service: &'static str,
        status: u16,
        detail: String,
    },
    #[error("{service} request failed: {detail}")]
    Transport {
        service: &'static str,
        detail: String,
    },
    #[error("{service} response decode failed: {detail}")]
    Decode {
        service: &'static str,
        detail: String,
    },
    #[error("unavailable: {0}")]
    Unavailable(String),
}

impl DomainError {
    pub(crate) fn transport(service: &'static str, error: impl std::fmt::Display) -> Self {
        Self::Transport {
            service,
            detail: error.to_string(),
        }
    }

    pub(crate) fn decode(service: &'static str, error: impl std::fmt::Display) -> Self {
        Self::Decode {
            service,
            detail: error.to_string(),
        }
    }
}

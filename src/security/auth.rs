use subtle::ConstantTimeEq;

const SUBSCRIBE_MODE: &str = "subscribe";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyFailureReason {
    NotConfigured,
    WrongMode,
    MissingToken,
    InvalidToken,
    MissingChallenge,
}

/// Checks a webhook subscription handshake and returns the challenge to echo.
pub fn verify_subscription<'a>(
    expected_token: Option<&str>,
    mode: Option<&str>,
    token: Option<&str>,
    challenge: Option<&'a str>,
) -> Result<&'a str, VerifyFailureReason> {
    let Some(expected) = expected_token.filter(|value| !value.is_empty()) else {
        return Err(VerifyFailureReason::NotConfigured);
    };
    if mode != Some(SUBSCRIBE_MODE) {
        return Err(VerifyFailureReason::WrongMode);
    }
    let Some(provided) = token.filter(|value| !value.is_empty()) else {
        return Err(VerifyFailureReason::MissingToken);
    };
    if !bool::from(provided.as_bytes().ct_eq(expected.as_bytes())) {
        return Err(VerifyFailureReason::InvalidToken);
    }

    challenge.ok_or(VerifyFailureReason::MissingChallenge)
}

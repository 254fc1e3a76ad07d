use thiserror::Error;

/// Errors surfaced by the booking client.
///
/// `Validation` is caught before any network call and shown inline;
/// `Transport` and `Api` carry a message fit for direct display; nothing
/// here is fatal — the wizard stays open and retryable in every case.
#[derive(Debug, Error)]
pub enum BookingError {
    /// Local input problem: missing required field, empty promo code.
    #[error("{0}")]
    Validation(String),

    /// Network failure, non-2xx status or a malformed response body.
    #[error("не удалось связаться с сервером: {0}")]
    Transport(String),

    /// The API answered `success: false`.
    #[error("{0}")]
    Api(String),

    /// The session is no longer valid; re-authentication is required.
    #[error("сессия истекла, войдите заново")]
    SessionExpired,
}

impl BookingError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}

impl From<reqwest::Error> for BookingError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

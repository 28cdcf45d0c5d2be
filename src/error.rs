use std::time::Duration;

use strum::Display;

/// Classified failure kinds as reported to whoever renders a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, serde::Serialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidPayload,
    ClientRejected,
    ServiceUnavailable,
    ProtocolViolation,
    Unknown,
}

/// Errors produced while talking to the translation service.
///
/// Each variant keeps the original cause; [`TranslateError::kind`] maps it onto the
/// coarser [`ErrorKind`] used for display and retry decisions.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TranslateError {
    #[error("Invalid image: {0}")]
    InvalidPayload(String),

    #[error("Request rejected ({status}): {detail}")]
    ClientRejected { status: u16, detail: String },

    #[error("Connection to translation service failed: {0}")]
    Connectivity(String),

    #[error("Translation service did not respond within {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("Translation service error ({status}): {detail}")]
    Remote { status: u16, detail: String },

    #[error("Translation service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Malformed response from translation service: {0}")]
    ProtocolViolation(String),

    #[error("Unexpected error: {0}")]
    Unknown(String),
}

impl TranslateError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidPayload(_) => ErrorKind::InvalidPayload,
            Self::ClientRejected { .. } => ErrorKind::ClientRejected,
            Self::Connectivity(_)
            | Self::Timeout(_)
            | Self::Remote { .. }
            | Self::ServiceUnavailable(_) => ErrorKind::ServiceUnavailable,
            Self::ProtocolViolation(_) => ErrorKind::ProtocolViolation,
            Self::Unknown(_) => ErrorKind::Unknown,
        }
    }

    /// Whether another attempt could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Connectivity(_) | Self::Timeout(_) | Self::Remote { .. } | Self::Unknown(_)
        )
    }

    /// Map an HTTP status and the service's `detail` message onto a classified error.
    pub fn from_status(status: u16, detail: String) -> Self {
        match status {
            400..=499 => Self::ClientRejected { status, detail },
            500..=599 => Self::Remote { status, detail },
            _ => Self::Unknown(format!("unexpected status {status}: {detail}")),
        }
    }
}

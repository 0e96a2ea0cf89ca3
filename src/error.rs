//! Error types for the voice session engine

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for voice session operations
pub type VoiceResult<T> = Result<T, VoiceError>;

/// Errors raised while establishing, running or tearing down a voice session
#[derive(Error, Debug)]
pub enum VoiceError {
    #[error("Token issuer error: {0}")]
    Token(String),

    #[error("Microphone permission denied: {0}")]
    MediaPermission(String),

    #[error("Audio device error: {0}")]
    AudioDevice(String),

    #[error("Negotiation failed: {0}")]
    Negotiation(String),

    #[error("Remote peer rejected negotiation (HTTP {status}): {body}")]
    RemoteRejection { status: u16, body: String },

    #[error("Transport lost: {0}")]
    TransportLost(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Daily voice budget exhausted")]
    BudgetExhausted,

    #[error("Usage persistence failed: {0}")]
    Persistence(String),

    #[error("Invalid session state: {0}")]
    InvalidState(String),

    #[error("No active voice session")]
    NotActive,

    #[error("Connection attempt cancelled")]
    Cancelled,

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Coarse classification of [`VoiceError`], safe to serialize to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Token,
    MediaPermission,
    AudioDevice,
    Negotiation,
    RemoteRejection,
    TransportLost,
    Protocol,
    BudgetExhausted,
    Persistence,
    InvalidState,
    NotActive,
    Cancelled,
    Config,
}

impl VoiceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            VoiceError::Token(_) => ErrorKind::Token,
            VoiceError::MediaPermission(_) => ErrorKind::MediaPermission,
            VoiceError::AudioDevice(_) => ErrorKind::AudioDevice,
            VoiceError::Negotiation(_) => ErrorKind::Negotiation,
            VoiceError::RemoteRejection { .. } => ErrorKind::RemoteRejection,
            VoiceError::TransportLost(_) => ErrorKind::TransportLost,
            VoiceError::Protocol(_) => ErrorKind::Protocol,
            VoiceError::BudgetExhausted => ErrorKind::BudgetExhausted,
            VoiceError::Persistence(_) => ErrorKind::Persistence,
            VoiceError::InvalidState(_) => ErrorKind::InvalidState,
            VoiceError::NotActive => ErrorKind::NotActive,
            VoiceError::Cancelled => ErrorKind::Cancelled,
            VoiceError::Config(_) => ErrorKind::Config,
        }
    }

    /// Whether this error ends a connection attempt (as opposed to a live session)
    pub fn is_connect_failure(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Token
                | ErrorKind::MediaPermission
                | ErrorKind::AudioDevice
                | ErrorKind::Negotiation
                | ErrorKind::RemoteRejection
                | ErrorKind::Cancelled
        )
    }
}

impl From<hound::Error> for VoiceError {
    fn from(err: hound::Error) -> Self {
        VoiceError::AudioDevice(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorKind::RemoteRejection).unwrap();
        assert_eq!(json, "\"remote_rejection\"");
    }

    #[test]
    fn test_connect_failures() {
        assert!(VoiceError::Token("down".into()).is_connect_failure());
        assert!(VoiceError::RemoteRejection {
            status: 400,
            body: String::new()
        }
        .is_connect_failure());
        assert!(!VoiceError::BudgetExhausted.is_connect_failure());
        assert!(!VoiceError::TransportLost("eof".into()).is_connect_failure());
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ErrorKind;
use crate::events::{ProtocolErrorDetails, Speaker, TranscriptFragment};
use crate::telemetry::EmotionSnapshot;

/// Externally visible session state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Connecting,
    Active,
    Ended,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionState::Idle => "idle",
            SessionState::Connecting => "connecting",
            SessionState::Active => "active",
            SessionState::Ended => "ended",
        };
        f.write_str(s)
    }
}

/// Why a session ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum EndReason {
    /// Caller-initiated stop
    Stopped,
    /// Daily budget ran out
    BudgetExhausted,
    /// Data channel or transport closed underneath the session
    ConnectionLost { detail: String },
}

/// Statistics about a voice session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStats {
    pub session_id: String,

    pub user_id: String,

    pub state: SessionState,

    /// When the session became active
    pub started_at: DateTime<Utc>,

    /// Seconds billed so far
    pub elapsed_seconds: u64,

    /// Seconds left in today's budget
    pub remaining_budget_seconds: u64,

    /// Set once the session has ended
    pub end_reason: Option<EndReason>,
}

/// Lifecycle notifications
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum LifecycleEvent {
    Connecting {
        user_id: String,
    },
    Active {
        session_id: String,
        remaining_budget_seconds: u64,
    },
    Ended {
        session_id: String,
        reason: EndReason,
        elapsed_seconds: u64,
    },
}

/// Everything the engine reports to callers
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    Lifecycle(LifecycleEvent),
    ConnectFailed {
        kind: ErrorKind,
        message: String,
    },
    Transcript(TranscriptFragment),
    SpeakingChanged {
        speaker: Speaker,
        speaking: bool,
    },
    Emotion(EmotionSnapshot),
    /// Non-fatal by itself
    ProtocolError(ProtocolErrorDetails),
    /// Unrecognised protocol event, forwarded verbatim
    Unrecognized {
        event_type: String,
        payload: serde_json::Value,
    },
    Clock {
        elapsed_seconds: u64,
        remaining_budget_seconds: u64,
    },
    UsagePersistFailed {
        session_id: String,
        delta_seconds: u64,
        message: String,
    },
}

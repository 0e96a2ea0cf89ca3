//! Data-channel wire protocol
//!
//! Inbound frames are JSON objects discriminated by a `type` string. Known
//! kinds are parsed into [`ServerEvent`]; anything else is kept verbatim in
//! [`ServerEvent::Unknown`] so newer server events pass through untouched.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{VoiceError, VoiceResult};

/// Details of a protocol-level `error` event
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ProtocolErrorDetails {
    #[serde(rename = "type", default)]
    pub error_type: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub event_id: Option<String>,
}

/// An inbound protocol event
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    /// User started speaking (server VAD)
    SpeechStarted,
    /// User stopped speaking
    SpeechStopped,
    /// Assistant audio is flowing
    AudioDelta,
    /// Assistant audio finished
    AudioDone,
    /// Partial transcription of user speech
    InputTranscriptDelta { item_id: Option<String>, delta: String },
    /// Final transcription of user speech
    InputTranscriptCompleted {
        item_id: Option<String>,
        transcript: String,
    },
    /// Partial transcript of assistant speech
    OutputTranscriptDelta { item_id: Option<String>, delta: String },
    /// Final transcript of assistant speech
    OutputTranscriptDone {
        item_id: Option<String>,
        transcript: String,
    },
    Error(ProtocolErrorDetails),
    /// Unrecognised event, forwarded without interpretation
    Unknown { event_type: String, raw: Value },
}

#[derive(Deserialize)]
struct DeltaPayload {
    #[serde(default)]
    item_id: Option<String>,
    delta: String,
}

#[derive(Deserialize)]
struct TranscriptPayload {
    #[serde(default)]
    item_id: Option<String>,
    #[serde(default)]
    transcript: String,
}

#[derive(Deserialize)]
struct ErrorPayload {
    error: ProtocolErrorDetails,
}

fn payload<T: for<'de> Deserialize<'de>>(event_type: &str, value: Value) -> VoiceResult<T> {
    serde_json::from_value(value)
        .map_err(|e| VoiceError::Protocol(format!("Malformed {} event: {}", event_type, e)))
}

impl ServerEvent {
    /// Parse one data-channel text frame
    pub fn parse(frame: &str) -> VoiceResult<Self> {
        let value: Value = serde_json::from_str(frame)
            .map_err(|e| VoiceError::Protocol(format!("Invalid JSON frame: {}", e)))?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> VoiceResult<Self> {
        let event_type = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| VoiceError::Protocol("Event without a type".to_string()))?
            .to_string();

        let event = match event_type.as_str() {
            "input_audio_buffer.speech_started" => ServerEvent::SpeechStarted,
            "input_audio_buffer.speech_stopped" => ServerEvent::SpeechStopped,
            "response.audio.delta" | "output_audio_buffer.started" => ServerEvent::AudioDelta,
            "response.audio.done" | "output_audio_buffer.stopped" => ServerEvent::AudioDone,
            "conversation.item.input_audio_transcription.delta" => {
                let p: DeltaPayload = payload(&event_type, value)?;
                ServerEvent::InputTranscriptDelta {
                    item_id: p.item_id,
                    delta: p.delta,
                }
            }
            "conversation.item.input_audio_transcription.completed" => {
                let p: TranscriptPayload = payload(&event_type, value)?;
                ServerEvent::InputTranscriptCompleted {
                    item_id: p.item_id,
                    transcript: p.transcript,
                }
            }
            "response.audio_transcript.delta" => {
                let p: DeltaPayload = payload(&event_type, value)?;
                ServerEvent::OutputTranscriptDelta {
                    item_id: p.item_id,
                    delta: p.delta,
                }
            }
            "response.audio_transcript.done" => {
                let p: TranscriptPayload = payload(&event_type, value)?;
                ServerEvent::OutputTranscriptDone {
                    item_id: p.item_id,
                    transcript: p.transcript,
                }
            }
            "error" => {
                let p: ErrorPayload = payload(&event_type, value)?;
                ServerEvent::Error(p.error)
            }
            _ => ServerEvent::Unknown {
                event_type,
                raw: value,
            },
        };

        Ok(event)
    }
}

/// An outbound protocol event
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    /// Inject a user text turn into the conversation
    UserText(String),
    /// Ask the model to respond
    ResponseCreate,
}

impl ClientEvent {
    pub fn to_json(&self) -> Value {
        match self {
            ClientEvent::UserText(text) => json!({
                "type": "conversation.item.create",
                "item": {
                    "type": "message",
                    "role": "user",
                    "content": [{ "type": "input_text", "text": text }],
                },
            }),
            ClientEvent::ResponseCreate => json!({ "type": "response.create" }),
        }
    }

    pub fn to_frame(&self) -> String {
        self.to_json().to_string()
    }
}

//! Data-channel event handling
//!
//! This module turns the ordered protocol stream into:
//! - Speaking-state transitions per speaker
//! - Transcript fragments (interim and final)
//! - Non-fatal protocol errors and forwarded unknown events

mod processor;
pub mod protocol;
mod transcript;

pub use processor::{EventStreamProcessor, StreamOutput};
pub use protocol::{ClientEvent, ProtocolErrorDetails, ServerEvent};
pub use transcript::{Speaker, TranscriptBuffer, TranscriptFragment, Utterance};

use serde_json::Value;
use tracing::{debug, warn};

use super::protocol::{ProtocolErrorDetails, ServerEvent};
use super::transcript::{Speaker, TranscriptBuffer, TranscriptFragment};

/// Normalised output of the event stream
#[derive(Debug, Clone, PartialEq)]
pub enum StreamOutput {
    SpeakingChanged { speaker: Speaker, speaking: bool },
    Transcript(TranscriptFragment),
    /// Non-fatal; closing the connection is the session's decision
    ProtocolError(ProtocolErrorDetails),
    /// Forwarded verbatim
    Unrecognized { event_type: String, raw: Value },
}

#[derive(Debug)]
struct SpeakerState {
    speaking: bool,
    buffer: TranscriptBuffer,
    last_final_item: Option<String>,
    last_final_text: Option<String>,
}

impl SpeakerState {
    fn new(speaker: Speaker) -> Self {
        Self {
            speaking: false,
            buffer: TranscriptBuffer::new(speaker),
            last_final_item: None,
            last_final_text: None,
        }
    }
}

/// Turns the ordered data-channel stream into speaking-state changes,
/// transcript fragments and protocol errors
///
/// Each speaker runs an independent `Silent -> Speaking -> Silent` machine.
/// Notifications fire only on edges, so observers see strict alternation.
#[derive(Debug)]
pub struct EventStreamProcessor {
    user: SpeakerState,
    assistant: SpeakerState,
    processed: u64,
}

impl Default for EventStreamProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl EventStreamProcessor {
    pub fn new() -> Self {
        Self {
            user: SpeakerState::new(Speaker::User),
            assistant: SpeakerState::new(Speaker::Assistant),
            processed: 0,
        }
    }

    pub fn is_speaking(&self, speaker: Speaker) -> bool {
        self.state(speaker).speaking
    }

    /// Text of the speaker's open buffer, if any
    pub fn open_text(&self, speaker: Speaker) -> Option<&str> {
        let buffer = &self.state(speaker).buffer;
        buffer.is_open().then(|| buffer.text())
    }

    /// Number of frames processed so far
    pub fn processed(&self) -> u64 {
        self.processed
    }

    /// Parse and apply one raw data-channel frame
    pub fn process_frame(&mut self, frame: &str) -> Vec<StreamOutput> {
        match ServerEvent::parse(frame) {
            Ok(event) => self.apply(event),
            Err(e) => {
                self.processed += 1;
                warn!("Dropping malformed protocol frame: {}", e);
                vec![StreamOutput::ProtocolError(ProtocolErrorDetails {
                    error_type: Some("malformed_event".to_string()),
                    code: None,
                    message: e.to_string(),
                    event_id: None,
                })]
            }
        }
    }

    pub fn apply(&mut self, event: ServerEvent) -> Vec<StreamOutput> {
        self.processed += 1;

        match event {
            ServerEvent::SpeechStarted => self.started(Speaker::User),
            ServerEvent::SpeechStopped => self.stopped(Speaker::User),
            ServerEvent::AudioDelta => self.started(Speaker::Assistant),
            ServerEvent::AudioDone => self.stopped(Speaker::Assistant),
            ServerEvent::InputTranscriptDelta { delta, .. } => self.interim(Speaker::User, &delta),
            ServerEvent::OutputTranscriptDelta { delta, .. } => {
                self.interim(Speaker::Assistant, &delta)
            }
            ServerEvent::InputTranscriptCompleted {
                item_id,
                transcript,
            } => self.finalize(Speaker::User, item_id, &transcript),
            ServerEvent::OutputTranscriptDone {
                item_id,
                transcript,
            } => self.finalize(Speaker::Assistant, item_id, &transcript),
            ServerEvent::Error(details) => {
                warn!(
                    "Protocol error from remote peer: {} ({:?})",
                    details.message, details.code
                );
                vec![StreamOutput::ProtocolError(details)]
            }
            ServerEvent::Unknown { event_type, raw } => {
                debug!("Forwarding unrecognized event {}", event_type);
                vec![StreamOutput::Unrecognized { event_type, raw }]
            }
        }
    }

    fn state(&self, speaker: Speaker) -> &SpeakerState {
        match speaker {
            Speaker::User => &self.user,
            Speaker::Assistant => &self.assistant,
        }
    }

    fn state_mut(&mut self, speaker: Speaker) -> &mut SpeakerState {
        match speaker {
            Speaker::User => &mut self.user,
            Speaker::Assistant => &mut self.assistant,
        }
    }

    fn started(&mut self, speaker: Speaker) -> Vec<StreamOutput> {
        let state = self.state_mut(speaker);
        if state.speaking {
            return Vec::new();
        }

        state.speaking = true;
        if state.buffer.discard() {
            debug!("Discarded stale {} transcript buffer", speaker);
        }

        vec![StreamOutput::SpeakingChanged {
            speaker,
            speaking: true,
        }]
    }

    fn stopped(&mut self, speaker: Speaker) -> Vec<StreamOutput> {
        let state = self.state_mut(speaker);
        if !state.speaking {
            return Vec::new();
        }

        state.speaking = false;
        vec![StreamOutput::SpeakingChanged {
            speaker,
            speaking: false,
        }]
    }

    fn interim(&mut self, speaker: Speaker, delta: &str) -> Vec<StreamOutput> {
        let text = self.state_mut(speaker).buffer.append(delta).to_string();
        vec![StreamOutput::Transcript(TranscriptFragment {
            speaker,
            text,
            is_final: false,
        })]
    }

    fn finalize(
        &mut self,
        speaker: Speaker,
        item_id: Option<String>,
        transcript: &str,
    ) -> Vec<StreamOutput> {
        let state = self.state_mut(speaker);

        // A repeat is the same item, or for id-less frames the same text,
        // with no interim text in between
        if !state.buffer.is_open() {
            let repeated = match &item_id {
                Some(_) => item_id == state.last_final_item,
                None => {
                    state.last_final_item.is_none()
                        && state.last_final_text.as_deref() == Some(transcript)
                }
            };
            if repeated {
                debug!("Ignoring repeated final transcript for {:?}", item_id);
                return Vec::new();
            }
        }

        match state.buffer.finalize(Some(transcript)) {
            Some(utterance) => {
                state.last_final_item = item_id;
                state.last_final_text = Some(transcript.to_string());
                vec![StreamOutput::Transcript(utterance.fragment())]
            }
            None => Vec::new(),
        }
    }
}

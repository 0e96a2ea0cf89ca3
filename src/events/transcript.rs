use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    User,
    Assistant,
}

impl fmt::Display for Speaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Speaker::User => write!(f, "user"),
            Speaker::Assistant => write!(f, "assistant"),
        }
    }
}

/// A piece of recognised speech, possibly partial
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptFragment {
    pub speaker: Speaker,
    pub text: String,
    pub is_final: bool,
}

/// A finalised unit of speech for one speaker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Utterance {
    pub speaker: Speaker,
    pub text: String,
    pub finalized_at: DateTime<Utc>,
}

impl Utterance {
    pub fn fragment(&self) -> TranscriptFragment {
        TranscriptFragment {
            speaker: self.speaker,
            text: self.text.clone(),
            is_final: true,
        }
    }
}

/// Open (non-final) transcript text for one speaker
#[derive(Debug, Clone)]
pub struct TranscriptBuffer {
    speaker: Speaker,
    text: String,
    open: bool,
}

impl TranscriptBuffer {
    pub fn new(speaker: Speaker) -> Self {
        Self {
            speaker,
            text: String::new(),
            open: false,
        }
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Append an interim fragment, returning the accumulated text
    pub fn append(&mut self, delta: &str) -> &str {
        self.text.push_str(delta);
        self.open = true;
        &self.text
    }

    /// Drop any stale open text
    pub fn discard(&mut self) -> bool {
        let was_open = self.open;
        self.text.clear();
        self.open = false;
        was_open
    }

    /// Close the buffer into an utterance
    ///
    /// `authoritative` replaces the accumulated text when non-empty. Returns
    /// `None` when there is nothing to flush.
    pub fn finalize(&mut self, authoritative: Option<&str>) -> Option<Utterance> {
        let text = match authoritative {
            Some(t) if !t.is_empty() => t.to_string(),
            _ if self.open && !self.text.is_empty() => std::mem::take(&mut self.text),
            _ => {
                self.discard();
                return None;
            }
        };
        self.discard();

        Some(Utterance {
            speaker: self.speaker,
            text,
            finalized_at: Utc::now(),
        })
    }

    /// Flush accumulated interims; `None` if the buffer is not open
    pub fn flush(&mut self) -> Option<Utterance> {
        self.finalize(None)
    }
}

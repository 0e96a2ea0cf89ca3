pub mod audio;
pub mod config;
pub mod error;
pub mod events;
pub mod http;
pub mod session;
pub mod signaling;
pub mod telemetry;

pub use audio::{
    AudioFile, AudioFrame, CaptureConstraints, CaptureDevice, LocalStream, MediaDevices,
    PlaybackSink, RemoteStream, WavFileMicrophone,
};
pub use config::Config;
pub use error::{ErrorKind, VoiceError, VoiceResult};
pub use events::{
    ClientEvent, EventStreamProcessor, ServerEvent, Speaker, StreamOutput, TranscriptFragment,
    Utterance,
};
pub use http::{create_router, AppState};
pub use session::{
    Collaborators, EndReason, InMemoryUsageLedger, LifecycleEvent, SessionConfig, SessionEvent,
    SessionManager, SessionState, SessionStats, UsageLedger,
};
pub use signaling::{
    Connection, EphemeralCredential, HttpNegotiator, HttpTokenIssuer, Negotiator, PeerTransport,
    SessionDescription, SignalingClient, TokenIssuer, TransportEvent, TransportFactory,
    TransportSpec,
};
pub use telemetry::{EmotionSnapshot, FrequencyAnalyzer, TelemetrySampler};

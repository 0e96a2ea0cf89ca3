pub mod backend;
pub mod file;

pub use backend::{
    AudioFrame, CaptureConstraints, CaptureDevice, LocalStream, MediaDevices, PlaybackSink,
    RemoteStream,
};
pub use file::{AudioFile, WavFileMicrophone};

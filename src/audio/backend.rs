use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, error, info};

use crate::error::VoiceResult;

/// Audio sample data (16-bit PCM, interleaved)
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// Raw audio samples (i16 PCM, interleaved)
    pub samples: Vec<i16>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of channels
    pub channels: u16,
    /// Timestamp in milliseconds since capture started
    pub timestamp_ms: u64,
}

/// Constraints requested when acquiring the microphone
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureConstraints {
    /// Capture sample rate in Hz (the realtime model expects 24kHz)
    pub sample_rate: u32,
    /// Number of channels (1 = mono)
    pub channels: u16,
    pub echo_cancellation: bool,
    pub noise_suppression: bool,
    pub auto_gain_control: bool,
}

impl Default for CaptureConstraints {
    fn default() -> Self {
        Self {
            sample_rate: 24000,
            channels: 1,
            echo_cancellation: true,
            noise_suppression: true,
            auto_gain_control: true,
        }
    }
}

/// A running microphone capture
///
/// Implementations must stop the underlying device when `stop` is called and
/// tolerate repeated calls.
pub trait CaptureDevice: Send + Sync {
    /// Subscribe to captured frames
    fn subscribe(&self) -> broadcast::Receiver<AudioFrame>;

    /// Stop capturing and release the device
    fn stop(&mut self) -> VoiceResult<()>;

    /// Check if the device is currently capturing
    fn is_capturing(&self) -> bool;

    /// Device name for logging
    fn name(&self) -> &str;
}

/// Microphone access
///
/// Platform-specific implementations:
/// - Browser/mobile shells: bridge to the host media stack
/// - File: replay a WAV file (see [`super::WavFileMicrophone`])
#[async_trait::async_trait]
pub trait MediaDevices: Send + Sync {
    /// Acquire exclusive access to the microphone
    ///
    /// Fails with `VoiceError::MediaPermission` when access is denied.
    async fn acquire_microphone(
        &self,
        constraints: &CaptureConstraints,
    ) -> VoiceResult<Box<dyn CaptureDevice>>;
}

/// The local (outbound) audio stream of a connection
///
/// Owns the capture device exclusively. The device is released on `release()`
/// or when the stream is dropped, whichever comes first.
pub struct LocalStream {
    id: String,
    constraints: CaptureConstraints,
    device: Option<Box<dyn CaptureDevice>>,
}

impl LocalStream {
    pub fn new(device: Box<dyn CaptureDevice>, constraints: CaptureConstraints) -> Self {
        let id = format!("local-{}", uuid::Uuid::new_v4());
        info!("Local stream {} opened on {}", id, device.name());
        Self {
            id,
            constraints,
            device: Some(device),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn constraints(&self) -> &CaptureConstraints {
        &self.constraints
    }

    /// Borrow the captured frames; `None` once released
    pub fn subscribe(&self) -> Option<broadcast::Receiver<AudioFrame>> {
        self.device.as_ref().map(|d| d.subscribe())
    }

    pub fn is_active(&self) -> bool {
        self.device.as_ref().is_some_and(|d| d.is_capturing())
    }

    /// Stop the capture device (idempotent)
    pub fn release(&mut self) {
        if let Some(mut device) = self.device.take() {
            if let Err(e) = device.stop() {
                error!("Failed to stop capture device {}: {}", device.name(), e);
            }
            info!("Local stream {} released", self.id);
        }
    }
}

impl Drop for LocalStream {
    fn drop(&mut self) {
        if self.device.is_some() {
            debug!("Local stream {} dropped while capturing", self.id);
            self.release();
        }
    }
}

/// Handle to the inbound (remote) audio stream
///
/// Referenced by the connection, rendered by a [`PlaybackSink`].
#[derive(Debug, Clone)]
pub struct RemoteStream {
    pub track_id: String,
    pub codec: String,
    frames: broadcast::Sender<AudioFrame>,
}

impl RemoteStream {
    pub fn new(
        track_id: impl Into<String>,
        codec: impl Into<String>,
        frames: broadcast::Sender<AudioFrame>,
    ) -> Self {
        Self {
            track_id: track_id.into(),
            codec: codec.into(),
            frames,
        }
    }

    /// Subscribe to decoded remote audio
    pub fn subscribe(&self) -> broadcast::Receiver<AudioFrame> {
        self.frames.subscribe()
    }
}

/// External renderer for the remote stream
pub trait PlaybackSink: Send + Sync {
    fn attach(&self, stream: RemoteStream);
    fn detach(&self);
}

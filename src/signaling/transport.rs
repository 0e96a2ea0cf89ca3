use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error};

use super::negotiate::SessionDescription;
use crate::audio::{AudioFrame, RemoteStream};
use crate::error::VoiceResult;

/// Shape of the transport session to create
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportSpec {
    /// Label of the protocol-event data channel
    pub data_channel_label: String,
    /// The data channel must be ordered and reliable
    pub ordered: bool,
    /// One outbound audio track (the local stream)
    pub send_audio: bool,
    /// One inbound audio track (the remote model)
    pub receive_audio: bool,
}

impl Default for TransportSpec {
    fn default() -> Self {
        Self {
            data_channel_label: "oai-events".to_string(),
            ordered: true,
            send_audio: true,
            receive_audio: true,
        }
    }
}

/// Events raised by a live transport, in arrival order
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// The data channel finished its handshake
    DataChannelOpen,
    /// The remote peer's audio track arrived
    RemoteTrack(RemoteStream),
    /// A text frame on the data channel
    Message(String),
    /// The data channel closed
    DataChannelClosed,
    /// The transport itself failed or disconnected
    Disconnected { reason: String },
}

/// A peer transport carrying audio tracks and one data channel
///
/// Dropping the last handle must not leave the transport open; callers close
/// explicitly and [`TransportGuard`] covers the cancellation path.
#[async_trait::async_trait]
pub trait PeerTransport: Send + Sync {
    /// Attach the outbound track, reading frames from the local stream
    async fn attach_local_audio(&self, frames: broadcast::Receiver<AudioFrame>) -> VoiceResult<()>;

    /// Produce the local offer (with candidates gathered)
    async fn create_offer(&self) -> VoiceResult<SessionDescription>;

    /// Apply the remote answer
    async fn apply_answer(&self, answer: SessionDescription) -> VoiceResult<()>;

    /// Take the event stream; yields `Some` once
    fn take_events(&self) -> Option<mpsc::Receiver<TransportEvent>>;

    /// Send a text frame on the data channel
    async fn send_text(&self, payload: String) -> VoiceResult<()>;

    async fn close_data_channel(&self) -> VoiceResult<()>;

    async fn close(&self) -> VoiceResult<()>;

    /// Transport name for logging
    fn name(&self) -> &str;
}

/// Creates transports for new connections
#[async_trait::async_trait]
pub trait TransportFactory: Send + Sync {
    async fn create(&self, spec: &TransportSpec) -> VoiceResult<Arc<dyn PeerTransport>>;
}

/// Closes the transport on drop unless disarmed
pub struct TransportGuard {
    transport: Option<Arc<dyn PeerTransport>>,
}

impl TransportGuard {
    pub fn new(transport: Arc<dyn PeerTransport>) -> Self {
        Self {
            transport: Some(transport),
        }
    }

    pub fn transport(&self) -> Option<&Arc<dyn PeerTransport>> {
        self.transport.as_ref()
    }

    /// Close now and disarm
    pub async fn close(&mut self) {
        if let Some(transport) = self.transport.take() {
            if let Err(e) = transport.close().await {
                error!("Failed to close transport {}: {}", transport.name(), e);
            }
        }
    }
}

impl Drop for TransportGuard {
    fn drop(&mut self) {
        if let Some(transport) = self.transport.take() {
            debug!("Transport {} dropped while open, closing", transport.name());
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                handle.spawn(async move {
                    if let Err(e) = transport.close().await {
                        error!("Failed to close abandoned transport: {}", e);
                    }
                });
            }
        }
    }
}

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

use super::negotiate::Negotiator;
use super::token::TokenIssuer;
use super::transport::{PeerTransport, TransportEvent, TransportFactory, TransportGuard, TransportSpec};
use crate::audio::{AudioFrame, CaptureConstraints, LocalStream, MediaDevices, RemoteStream};
use crate::error::{VoiceError, VoiceResult};
use crate::events::ClientEvent;

/// Timeouts applied while connecting
#[derive(Debug, Clone, Copy)]
pub struct ConnectTimeouts {
    pub token: Duration,
    pub negotiation: Duration,
}

impl Default for ConnectTimeouts {
    fn default() -> Self {
        Self {
            token: Duration::from_secs(10),
            negotiation: Duration::from_secs(20),
        }
    }
}

/// Establishes connections to the remote model
pub struct SignalingClient {
    token_issuer: Arc<dyn TokenIssuer>,
    negotiator: Arc<dyn Negotiator>,
    media: Arc<dyn MediaDevices>,
    transports: Arc<dyn TransportFactory>,
    constraints: CaptureConstraints,
    spec: TransportSpec,
    timeouts: ConnectTimeouts,
}

impl SignalingClient {
    pub fn new(
        token_issuer: Arc<dyn TokenIssuer>,
        negotiator: Arc<dyn Negotiator>,
        media: Arc<dyn MediaDevices>,
        transports: Arc<dyn TransportFactory>,
    ) -> Self {
        Self {
            token_issuer,
            negotiator,
            media,
            transports,
            constraints: CaptureConstraints::default(),
            spec: TransportSpec::default(),
            timeouts: ConnectTimeouts::default(),
        }
    }

    pub fn with_constraints(mut self, constraints: CaptureConstraints) -> Self {
        self.constraints = constraints;
        self
    }

    pub fn with_transport_spec(mut self, spec: TransportSpec) -> Self {
        self.spec = spec;
        self
    }

    pub fn with_timeouts(mut self, timeouts: ConnectTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Establish a connection
    ///
    /// Exactly one microphone acquisition per successful connect. On every
    /// failure path (and if this future is dropped) the microphone is released
    /// and the transport closed.
    pub async fn connect(&self) -> VoiceResult<Connection> {
        info!("Connecting voice session");

        let credential = tokio::time::timeout(
            self.timeouts.token,
            self.token_issuer.request_ephemeral_credential(),
        )
        .await
        .map_err(|_| VoiceError::Token(format!("Token request timed out after {:?}", self.timeouts.token)))??;

        if credential.is_expired(chrono::Utc::now()) {
            return Err(VoiceError::Token(format!(
                "Ephemeral credential expired at {}",
                credential.expires_at()
            )));
        }

        let device = self.media.acquire_microphone(&self.constraints).await?;
        let mut local = LocalStream::new(device, self.constraints.clone());

        let mut transport = TransportGuard::new(self.transports.create(&self.spec).await?);

        let negotiated = match transport.transport() {
            Some(t) => self.negotiate(Arc::clone(t), &local, credential).await,
            None => Err(VoiceError::Negotiation("Transport unavailable".to_string())),
        };

        match negotiated {
            Ok(ready) => {
                info!("Voice session connected via {}", ready.transport_name);
                Ok(Connection {
                    local,
                    remote: ready.remote,
                    transport,
                    events: Some(ready.events),
                    early_events: ready.early_events,
                    data_channel_open: true,
                })
            }
            Err(e) => {
                warn!("Connection attempt failed: {}", e);
                transport.close().await;
                local.release();
                Err(e)
            }
        }
    }

    async fn negotiate(
        &self,
        transport: Arc<dyn PeerTransport>,
        local: &LocalStream,
        credential: super::EphemeralCredential,
    ) -> VoiceResult<Negotiated> {
        let frames = local
            .subscribe()
            .ok_or_else(|| VoiceError::AudioDevice("Local stream already released".to_string()))?;
        transport.attach_local_audio(frames).await?;

        let offer = transport.create_offer().await?;
        debug!("Local offer created ({} bytes)", offer.sdp.len());

        let answer = tokio::time::timeout(
            self.timeouts.negotiation,
            self.negotiator.exchange(&offer, credential),
        )
        .await
        .map_err(|_| {
            VoiceError::Negotiation(format!("SDP exchange timed out after {:?}", self.timeouts.negotiation))
        })??;

        transport.apply_answer(answer).await?;

        let mut events = transport
            .take_events()
            .ok_or_else(|| VoiceError::Negotiation("Transport event stream already taken".to_string()))?;

        let (remote, early_events) =
            tokio::time::timeout(self.timeouts.negotiation, wait_for_data_channel(&mut events))
                .await
                .map_err(|_| VoiceError::Negotiation("Data channel did not open in time".to_string()))??;

        Ok(Negotiated {
            transport_name: transport.name().to_string(),
            remote,
            events,
            early_events,
        })
    }
}

struct Negotiated {
    transport_name: String,
    remote: Option<RemoteStream>,
    events: mpsc::Receiver<TransportEvent>,
    early_events: Vec<TransportEvent>,
}

/// Wait for the data channel handshake, keeping anything that arrives first
async fn wait_for_data_channel(
    events: &mut mpsc::Receiver<TransportEvent>,
) -> VoiceResult<(Option<RemoteStream>, Vec<TransportEvent>)> {
    let mut remote = None;
    let mut early = Vec::new();

    while let Some(event) = events.recv().await {
        match event {
            TransportEvent::DataChannelOpen => return Ok((remote, early)),
            TransportEvent::RemoteTrack(stream) => remote = Some(stream),
            TransportEvent::DataChannelClosed => {
                return Err(VoiceError::Negotiation("Data channel closed during handshake".to_string()))
            }
            TransportEvent::Disconnected { reason } => {
                return Err(VoiceError::Negotiation(format!("Transport failed during handshake: {}", reason)))
            }
            other => early.push(other),
        }
    }

    Err(VoiceError::Negotiation("Transport closed during handshake".to_string()))
}

/// A live connection to the remote model
///
/// Owns the local stream and the transport; references the remote stream.
pub struct Connection {
    local: LocalStream,
    remote: Option<RemoteStream>,
    transport: TransportGuard,
    events: Option<mpsc::Receiver<TransportEvent>>,
    early_events: Vec<TransportEvent>,
    data_channel_open: bool,
}

impl Connection {
    pub fn local_stream(&self) -> &LocalStream {
        &self.local
    }

    /// Borrow the local frames for analysis
    pub fn subscribe_local(&self) -> Option<broadcast::Receiver<AudioFrame>> {
        self.local.subscribe()
    }

    pub fn remote_stream(&self) -> Option<&RemoteStream> {
        self.remote.as_ref()
    }

    pub fn set_remote_stream(&mut self, stream: RemoteStream) {
        info!("Remote stream attached: {} ({})", stream.track_id, stream.codec);
        self.remote = Some(stream);
    }

    /// Data channel open but remote audio not yet attached
    pub fn is_negotiating(&self) -> bool {
        self.data_channel_open && self.remote.is_none()
    }

    /// Telemetry is reported only on a fully established connection
    pub fn accepts_telemetry(&self) -> bool {
        self.data_channel_open && self.remote.is_some() && self.local.is_active()
    }

    pub fn take_events(&mut self) -> Option<mpsc::Receiver<TransportEvent>> {
        self.events.take()
    }

    /// Events that arrived while waiting for the data channel, in order
    pub fn take_early_events(&mut self) -> Vec<TransportEvent> {
        std::mem::take(&mut self.early_events)
    }

    pub async fn send_event(&self, event: &ClientEvent) -> VoiceResult<()> {
        if !self.data_channel_open {
            return Err(VoiceError::TransportLost("Data channel is closed".to_string()));
        }
        let transport = self
            .transport
            .transport()
            .ok_or_else(|| VoiceError::TransportLost("Transport is closed".to_string()))?;
        transport.send_text(event.to_frame()).await
    }

    pub fn release_media(&mut self) {
        self.local.release();
    }

    pub async fn close_data_channel(&mut self) {
        if !self.data_channel_open {
            return;
        }
        self.data_channel_open = false;
        if let Some(transport) = self.transport.transport() {
            if let Err(e) = transport.close_data_channel().await {
                error!("Failed to close data channel: {}", e);
            }
        }
    }

    pub async fn close_transport(&mut self) {
        self.transport.close().await;
        self.remote = None;
        self.events = None;
    }

    /// Release media, close the data channel, close the transport
    pub async fn teardown(&mut self) {
        self.release_media();
        self.close_data_channel().await;
        self.close_transport().await;
        info!("Connection torn down");
    }
}

// Fake collaborators shared by the integration tests
//
// Each fake counts what the engine does to it so tests can assert on
// acquisition, release, persistence and wire traffic.

#![allow(dead_code)]

use companion_voice::audio::{
    AudioFrame, CaptureConstraints, CaptureDevice, MediaDevices, PlaybackSink, RemoteStream,
};
use companion_voice::signaling::{
    EphemeralCredential, Negotiator, PeerTransport, SessionDescription, TokenIssuer,
    TransportEvent, TransportFactory, TransportSpec,
};
use companion_voice::{
    Collaborators, SessionConfig, SessionEvent, SessionManager, UsageLedger, VoiceError,
    VoiceResult,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};

// ============================================================================
// Token issuer
// ============================================================================

#[derive(Default)]
pub struct FakeTokenIssuer {
    pub fail: AtomicBool,
    /// Hand out credentials that have already expired
    pub expired: AtomicBool,
    pub issued: AtomicUsize,
}

#[async_trait::async_trait]
impl TokenIssuer for FakeTokenIssuer {
    async fn request_ephemeral_credential(&self) -> VoiceResult<EphemeralCredential> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(VoiceError::Token("issuer unavailable".to_string()));
        }
        self.issued.fetch_add(1, Ordering::SeqCst);
        let lifetime = if self.expired.load(Ordering::SeqCst) {
            chrono::Duration::seconds(-1)
        } else {
            chrono::Duration::seconds(60)
        };
        Ok(EphemeralCredential::new("ek_test", chrono::Utc::now() + lifetime))
    }
}

// ============================================================================
// Negotiator
// ============================================================================

#[derive(Default)]
pub struct FakeNegotiator {
    /// Reject offers with this HTTP status
    pub reject: Mutex<Option<u16>>,
    /// Never answer, as if the peer stalled
    pub hang: AtomicBool,
    pub exchanges: AtomicUsize,
}

#[async_trait::async_trait]
impl Negotiator for FakeNegotiator {
    async fn exchange(
        &self,
        offer: &SessionDescription,
        credential: EphemeralCredential,
    ) -> VoiceResult<SessionDescription> {
        self.exchanges.fetch_add(1, Ordering::SeqCst);
        let _bearer = credential.into_bearer();

        if self.hang.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }

        if let Some(status) = *self.reject.lock().unwrap() {
            return Err(VoiceError::RemoteRejection {
                status,
                body: "offer rejected".to_string(),
            });
        }
        Ok(SessionDescription::answer(format!("answer-to:{}", offer.sdp)))
    }
}

// ============================================================================
// Microphone
// ============================================================================

pub struct FakeMedia {
    pub deny: AtomicBool,
    pub acquisitions: AtomicUsize,
    /// Captures acquired and not yet stopped
    pub open: Arc<AtomicUsize>,
    pub frames: broadcast::Sender<AudioFrame>,
}

impl Default for FakeMedia {
    fn default() -> Self {
        let (frames, _) = broadcast::channel(64);
        Self {
            deny: AtomicBool::new(false),
            acquisitions: AtomicUsize::new(0),
            open: Arc::new(AtomicUsize::new(0)),
            frames,
        }
    }
}

impl FakeMedia {
    pub fn open_captures(&self) -> usize {
        self.open.load(Ordering::SeqCst)
    }

    pub fn acquisitions(&self) -> usize {
        self.acquisitions.load(Ordering::SeqCst)
    }
}

struct FakeCapture {
    frames: broadcast::Sender<AudioFrame>,
    open: Arc<AtomicUsize>,
    stopped: bool,
}

impl CaptureDevice for FakeCapture {
    fn subscribe(&self) -> broadcast::Receiver<AudioFrame> {
        self.frames.subscribe()
    }

    fn stop(&mut self) -> VoiceResult<()> {
        if !self.stopped {
            self.stopped = true;
            self.open.fetch_sub(1, Ordering::SeqCst);
        }
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        !self.stopped
    }

    fn name(&self) -> &str {
        "fake-mic"
    }
}

#[async_trait::async_trait]
impl MediaDevices for FakeMedia {
    async fn acquire_microphone(
        &self,
        _constraints: &CaptureConstraints,
    ) -> VoiceResult<Box<dyn CaptureDevice>> {
        if self.deny.load(Ordering::SeqCst) {
            return Err(VoiceError::MediaPermission("user denied access".to_string()));
        }
        self.acquisitions.fetch_add(1, Ordering::SeqCst);
        self.open.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeCapture {
            frames: self.frames.clone(),
            open: Arc::clone(&self.open),
            stopped: false,
        }))
    }
}

// ============================================================================
// Transport
// ============================================================================

pub struct FakeTransport {
    events_tx: mpsc::Sender<TransportEvent>,
    events_rx: Mutex<Option<mpsc::Receiver<TransportEvent>>>,
    remote_track: bool,
    pub sent: Mutex<Vec<String>>,
    pub audio_attached: AtomicBool,
    pub data_channel_closed: AtomicBool,
    pub closed: AtomicBool,
}

impl FakeTransport {
    fn new(remote_track: bool) -> Self {
        let (events_tx, events_rx) = mpsc::channel(64);
        Self {
            events_tx,
            events_rx: Mutex::new(Some(events_rx)),
            remote_track,
            sent: Mutex::new(Vec::new()),
            audio_attached: AtomicBool::new(false),
            data_channel_closed: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        }
    }

    /// Deliver an event as if the remote side raised it
    pub async fn inject(&self, event: TransportEvent) {
        self.events_tx.send(event).await.unwrap();
    }

    /// Deliver a data-channel text frame
    pub async fn inject_frame(&self, frame: &str) {
        self.inject(TransportEvent::Message(frame.to_string())).await;
    }

    pub fn sent_frames(&self) -> Vec<serde_json::Value> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|s| serde_json::from_str(s).unwrap())
            .collect()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl PeerTransport for FakeTransport {
    async fn attach_local_audio(&self, _frames: broadcast::Receiver<AudioFrame>) -> VoiceResult<()> {
        self.audio_attached.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn create_offer(&self) -> VoiceResult<SessionDescription> {
        Ok(SessionDescription::offer("v=0 fake-offer"))
    }

    async fn apply_answer(&self, _answer: SessionDescription) -> VoiceResult<()> {
        if self.remote_track {
            let (frames, _) = broadcast::channel(8);
            let remote = RemoteStream::new("remote-audio", "opus", frames);
            self.events_tx
                .send(TransportEvent::RemoteTrack(remote))
                .await
                .map_err(|e| VoiceError::Negotiation(e.to_string()))?;
        }
        self.events_tx
            .send(TransportEvent::DataChannelOpen)
            .await
            .map_err(|e| VoiceError::Negotiation(e.to_string()))
    }

    fn take_events(&self) -> Option<mpsc::Receiver<TransportEvent>> {
        self.events_rx.lock().unwrap().take()
    }

    async fn send_text(&self, payload: String) -> VoiceResult<()> {
        if self.data_channel_closed.load(Ordering::SeqCst) {
            return Err(VoiceError::TransportLost("data channel closed".to_string()));
        }
        self.sent.lock().unwrap().push(payload);
        Ok(())
    }

    async fn close_data_channel(&self) -> VoiceResult<()> {
        self.data_channel_closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&self) -> VoiceResult<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn name(&self) -> &str {
        "fake-transport"
    }
}

pub struct FakeTransportFactory {
    pub remote_track: AtomicBool,
    pub created: Mutex<Vec<Arc<FakeTransport>>>,
}

impl Default for FakeTransportFactory {
    fn default() -> Self {
        Self {
            remote_track: AtomicBool::new(true),
            created: Mutex::new(Vec::new()),
        }
    }
}

impl FakeTransportFactory {
    pub fn last(&self) -> Arc<FakeTransport> {
        Arc::clone(self.created.lock().unwrap().last().expect("no transport created"))
    }

    pub fn count(&self) -> usize {
        self.created.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl TransportFactory for FakeTransportFactory {
    async fn create(&self, _spec: &TransportSpec) -> VoiceResult<Arc<dyn PeerTransport>> {
        let transport = Arc::new(FakeTransport::new(self.remote_track.load(Ordering::SeqCst)));
        self.created.lock().unwrap().push(Arc::clone(&transport));
        Ok(transport)
    }
}

// ============================================================================
// Usage ledger
// ============================================================================

pub struct CountingLedger {
    pub remaining: Mutex<i64>,
    pub records: Mutex<Vec<(String, u64)>>,
    pub fail: AtomicBool,
}

impl CountingLedger {
    pub fn new(remaining: i64) -> Self {
        Self {
            remaining: Mutex::new(remaining),
            records: Mutex::new(Vec::new()),
            fail: AtomicBool::new(false),
        }
    }

    pub fn records(&self) -> Vec<(String, u64)> {
        self.records.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl UsageLedger for CountingLedger {
    async fn remaining_seconds_today(&self, _user_id: &str) -> VoiceResult<i64> {
        Ok(*self.remaining.lock().unwrap())
    }

    async fn record_usage(&self, user_id: &str, delta_seconds: u64) -> VoiceResult<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(VoiceError::Persistence("ledger offline".to_string()));
        }
        self.records
            .lock()
            .unwrap()
            .push((user_id.to_string(), delta_seconds));
        *self.remaining.lock().unwrap() -= delta_seconds as i64;
        Ok(())
    }
}

// ============================================================================
// Playback
// ============================================================================

#[derive(Default)]
pub struct RecordingPlayback {
    pub attached: Mutex<Vec<String>>,
    pub detaches: AtomicUsize,
}

impl PlaybackSink for RecordingPlayback {
    fn attach(&self, stream: RemoteStream) {
        self.attached.lock().unwrap().push(stream.track_id);
    }

    fn detach(&self) {
        self.detaches.fetch_add(1, Ordering::SeqCst);
    }
}

// ============================================================================
// Harness
// ============================================================================

pub struct Harness {
    pub issuer: Arc<FakeTokenIssuer>,
    pub negotiator: Arc<FakeNegotiator>,
    pub media: Arc<FakeMedia>,
    pub transports: Arc<FakeTransportFactory>,
    pub ledger: Arc<CountingLedger>,
    pub playback: Arc<RecordingPlayback>,
}

impl Harness {
    pub fn new(remaining_budget: i64) -> Self {
        Self {
            issuer: Arc::new(FakeTokenIssuer::default()),
            negotiator: Arc::new(FakeNegotiator::default()),
            media: Arc::new(FakeMedia::default()),
            transports: Arc::new(FakeTransportFactory::default()),
            ledger: Arc::new(CountingLedger::new(remaining_budget)),
            playback: Arc::new(RecordingPlayback::default()),
        }
    }

    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            token_issuer: self.issuer.clone(),
            negotiator: self.negotiator.clone(),
            media: self.media.clone(),
            transports: self.transports.clone(),
            ledger: self.ledger.clone(),
            playback: Some(self.playback.clone()),
        }
    }

    pub fn manager(&self) -> SessionManager {
        SessionManager::new(SessionConfig::default(), self.collaborators())
    }
}

/// Receive events until one matches, failing after `limit`
pub async fn wait_for<F>(
    events: &mut broadcast::Receiver<SessionEvent>,
    limit: Duration,
    mut matches: F,
) -> SessionEvent
where
    F: FnMut(&SessionEvent) -> bool,
{
    tokio::time::timeout(limit, async {
        loop {
            match events.recv().await {
                Ok(event) if matches(&event) => return event,
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(e) => panic!("event stream ended: {}", e),
            }
        }
    })
    .await
    .expect("timed out waiting for session event")
}

/// Drain everything currently queued
pub fn drain(events: &mut broadcast::Receiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut out = Vec::new();
    loop {
        match events.try_recv() {
            Ok(event) => out.push(event),
            Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
            Err(_) => return out,
        }
    }
}

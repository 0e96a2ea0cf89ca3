use chrono::Utc;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::config::SessionConfig;
use super::driver::{SessionDriver, SessionInput};
use super::ledger::UsageLedger;
use super::stats::{LifecycleEvent, SessionEvent, SessionState, SessionStats};
use crate::audio::{MediaDevices, PlaybackSink};
use crate::error::{VoiceError, VoiceResult};
use crate::events::EventStreamProcessor;
use crate::signaling::{Negotiator, SignalingClient, TokenIssuer, TransportFactory};

/// External collaborators of the session engine
#[derive(Clone)]
pub struct Collaborators {
    pub token_issuer: Arc<dyn TokenIssuer>,
    pub negotiator: Arc<dyn Negotiator>,
    pub media: Arc<dyn MediaDevices>,
    pub transports: Arc<dyn TransportFactory>,
    pub ledger: Arc<dyn UsageLedger>,
    /// Renders the remote stream, if the caller wants audio out
    pub playback: Option<Arc<dyn PlaybackSink>>,
}

struct ActiveSession {
    session_id: String,
    control: mpsc::UnboundedSender<SessionInput>,
    driver: JoinHandle<SessionStats>,
    stats: watch::Receiver<SessionStats>,
}

/// A connect in flight; `finished` resolves once `start()` has cleaned up
struct ConnectAttempt {
    cancel: CancellationToken,
    finished: watch::Receiver<()>,
}

pub(crate) struct ManagerInner {
    state: SessionState,
    connecting: Option<ConnectAttempt>,
    active: Option<ActiveSession>,
    last_stats: Option<SessionStats>,
}

impl ManagerInner {
    pub(crate) fn session_ended(&mut self, session_id: &str, stats: SessionStats) {
        let owned = match &self.active {
            Some(active) => active.session_id == session_id,
            None => true,
        };
        if !owned {
            return;
        }
        self.active = None;
        self.state = SessionState::Ended;
        self.last_stats = Some(stats);
    }
}

/// Owns the voice session lifecycle: `Idle -> Connecting -> Active -> Ended`
///
/// At most one session runs at a time. A new `start()` after `Ended`
/// allocates a fresh session.
pub struct SessionManager {
    config: SessionConfig,
    collaborators: Collaborators,
    events: broadcast::Sender<SessionEvent>,
    inner: Arc<Mutex<ManagerInner>>,
}

impl SessionManager {
    pub fn new(config: SessionConfig, collaborators: Collaborators) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(16));
        Self {
            config,
            collaborators,
            events,
            inner: Arc::new(Mutex::new(ManagerInner {
                state: SessionState::Idle,
                connecting: None,
                active: None,
                last_stats: None,
            })),
        }
    }

    /// Subscribe to session events
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub async fn state(&self) -> SessionState {
        self.inner.lock().await.state
    }

    /// Live stats of the running session, or the last ended one
    pub async fn stats(&self) -> Option<SessionStats> {
        let inner = self.inner.lock().await;
        match &inner.active {
            Some(active) => Some(active.stats.borrow().clone()),
            None => inner.last_stats.clone(),
        }
    }

    /// Start a session for `user_id`, returning its id
    pub async fn start(&self, user_id: &str) -> VoiceResult<String> {
        self.config.validate()?;

        let cancel = CancellationToken::new();
        let (finished_tx, finished) = watch::channel(());

        let remaining = {
            let mut inner = self.inner.lock().await;
            if matches!(inner.state, SessionState::Connecting | SessionState::Active) {
                return Err(VoiceError::InvalidState(format!(
                    "a session is already {}",
                    inner.state
                )));
            }

            let remaining = self
                .collaborators
                .ledger
                .remaining_seconds_today(user_id)
                .await?;
            if remaining <= 0 {
                warn!("Voice budget exhausted for {}", user_id);
                return Err(VoiceError::BudgetExhausted);
            }

            inner.state = SessionState::Connecting;
            inner.connecting = Some(ConnectAttempt {
                cancel: cancel.clone(),
                finished,
            });
            remaining as u64
        };

        info!("Starting voice session for {} ({}s budget left)", user_id, remaining);
        self.emit(SessionEvent::Lifecycle(LifecycleEvent::Connecting {
            user_id: user_id.to_string(),
        }));

        let mut guard = ConnectingGuard {
            inner: Arc::clone(&self.inner),
            cancel: cancel.clone(),
            finished: Some(finished_tx),
            armed: true,
        };

        let client = self.signaling_client();
        let result = tokio::select! {
            result = client.connect() => result,
            _ = cancel.cancelled() => Err(VoiceError::Cancelled),
        };

        let mut inner = self.inner.lock().await;
        guard.armed = false;
        inner.connecting = None;

        let mut connection = match result {
            Ok(connection) => connection,
            Err(e) => return Err(self.connect_failed(&mut inner, e)),
        };
        if cancel.is_cancelled() {
            connection.teardown().await;
            return Err(self.connect_failed(&mut inner, VoiceError::Cancelled));
        }

        let session_id = format!("voice-{}", uuid::Uuid::new_v4());
        let started_at = Utc::now();
        let (control, inbound) = mpsc::unbounded_channel();
        let (stats_tx, stats) = watch::channel(SessionStats {
            session_id: session_id.clone(),
            user_id: user_id.to_string(),
            state: SessionState::Active,
            started_at,
            elapsed_seconds: 0,
            remaining_budget_seconds: remaining,
            end_reason: None,
        });

        let driver = SessionDriver {
            session_id: session_id.clone(),
            user_id: user_id.to_string(),
            started_at,
            elapsed: 0,
            remaining,
            config: self.config.clone(),
            connection,
            processor: EventStreamProcessor::new(),
            inbound,
            inbound_tx: control.clone(),
            events: self.events.clone(),
            stats: stats_tx,
            ledger: Arc::clone(&self.collaborators.ledger),
            playback: self.collaborators.playback.clone(),
            shared: Arc::clone(&self.inner),
            clock: None,
            sampler: None,
            forwarder: None,
            playback_attached: false,
        };

        inner.state = SessionState::Active;
        self.emit(SessionEvent::Lifecycle(LifecycleEvent::Active {
            session_id: session_id.clone(),
            remaining_budget_seconds: remaining,
        }));

        let driver = driver.spawn();
        inner.active = Some(ActiveSession {
            session_id: session_id.clone(),
            control,
            driver,
            stats,
        });

        info!("Voice session {} active", session_id);

        Ok(session_id)
    }

    /// Stop the current session
    ///
    /// While connecting, cancels the attempt and returns `None` once the
    /// microphone is released and the manager is back to `Idle`. While
    /// active, ends the session and returns its final stats.
    pub async fn stop(&self) -> VoiceResult<Option<SessionStats>> {
        let active = {
            let mut inner = self.inner.lock().await;
            let state = inner.state;
            match state {
                SessionState::Connecting => {
                    let finished = inner.connecting.as_ref().map(|attempt| {
                        info!("Cancelling voice session connection attempt");
                        attempt.cancel.cancel();
                        attempt.finished.clone()
                    });
                    drop(inner);

                    // Resolves when the attempt drops its sender
                    if let Some(mut finished) = finished {
                        let _ = finished.changed().await;
                    }
                    return Ok(None);
                }
                SessionState::Active => inner.active.take(),
                SessionState::Idle | SessionState::Ended => return Err(VoiceError::NotActive),
            }
        };

        let Some(active) = active else {
            return Err(VoiceError::NotActive);
        };

        let _ = active.control.send(SessionInput::Stop);

        match active.driver.await {
            Ok(stats) => Ok(Some(stats)),
            Err(e) => {
                error!("Session {} driver panicked: {}", active.session_id, e);
                let stats = active.stats.borrow().clone();
                let mut inner = self.inner.lock().await;
                inner.session_ended(&active.session_id, stats);
                Err(VoiceError::InvalidState(format!("session driver failed: {}", e)))
            }
        }
    }

    /// Inject a user text turn without consuming audio budget
    pub async fn send_out_of_band_text(&self, text: &str) -> VoiceResult<()> {
        if text.trim().is_empty() {
            return Err(VoiceError::Protocol("Out-of-band text is empty".to_string()));
        }

        let control = {
            let inner = self.inner.lock().await;
            match (&inner.state, &inner.active) {
                (SessionState::Active, Some(active)) => active.control.clone(),
                _ => return Err(VoiceError::NotActive),
            }
        };

        let (reply, response) = oneshot::channel();
        control
            .send(SessionInput::SendText {
                text: text.to_string(),
                reply,
            })
            .map_err(|_| VoiceError::NotActive)?;

        response.await.map_err(|_| VoiceError::NotActive)?
    }

    fn signaling_client(&self) -> SignalingClient {
        SignalingClient::new(
            Arc::clone(&self.collaborators.token_issuer),
            Arc::clone(&self.collaborators.negotiator),
            Arc::clone(&self.collaborators.media),
            Arc::clone(&self.collaborators.transports),
        )
        .with_constraints(self.config.capture.clone())
        .with_transport_spec(self.config.transport.clone())
        .with_timeouts(self.config.connect_timeouts())
    }

    fn connect_failed(&self, inner: &mut ManagerInner, err: VoiceError) -> VoiceError {
        warn!("Voice session failed to connect: {}", err);
        inner.state = SessionState::Idle;
        self.emit(SessionEvent::ConnectFailed {
            kind: err.kind(),
            message: err.to_string(),
        });
        err
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        if let Ok(inner) = self.inner.try_lock() {
            if let Some(attempt) = &inner.connecting {
                attempt.cancel.cancel();
            }
            if let Some(active) = &inner.active {
                let _ = active.control.send(SessionInput::Stop);
            }
        }
    }
}

/// Returns the manager to `Idle` if a `start()` future is dropped mid-connect
///
/// Holds the attempt's `finished` sender, so a waiting `stop()` wakes only
/// after the state is settled.
struct ConnectingGuard {
    inner: Arc<Mutex<ManagerInner>>,
    cancel: CancellationToken,
    finished: Option<watch::Sender<()>>,
    armed: bool,
}

impl Drop for ConnectingGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        self.cancel.cancel();
        let inner = Arc::clone(&self.inner);
        let finished = self.finished.take();
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                let mut inner = inner.lock().await;
                if inner.state == SessionState::Connecting {
                    warn!("Connection attempt abandoned, returning to idle");
                    inner.state = SessionState::Idle;
                    inner.connecting = None;
                }
                drop(finished);
            });
        }
    }
}

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::clock::BudgetClock;
use super::config::SessionConfig;
use super::ledger::UsageLedger;
use super::manager::ManagerInner;
use super::stats::{EndReason, LifecycleEvent, SessionEvent, SessionState, SessionStats};
use crate::audio::PlaybackSink;
use crate::error::VoiceResult;
use crate::events::{ClientEvent, EventStreamProcessor, StreamOutput};
use crate::signaling::{Connection, TransportEvent};
use crate::telemetry::{EmotionSnapshot, TelemetrySampler};

/// Inputs serialised into the session's single queue
#[derive(Debug)]
pub(crate) enum SessionInput {
    Tick,
    Telemetry(EmotionSnapshot),
    Transport(TransportEvent),
    SendText {
        text: String,
        reply: oneshot::Sender<VoiceResult<()>>,
    },
    Stop,
}

/// Single writer for one active session
///
/// The budget clock, the telemetry sampler and the transport forwarder push
/// into one ordered queue; only this loop mutates session state or starts
/// teardown.
pub(crate) struct SessionDriver {
    pub(crate) session_id: String,
    pub(crate) user_id: String,
    pub(crate) started_at: DateTime<Utc>,
    pub(crate) elapsed: u64,
    pub(crate) remaining: u64,
    pub(crate) config: SessionConfig,
    pub(crate) connection: Connection,
    pub(crate) processor: EventStreamProcessor,
    pub(crate) inbound: mpsc::UnboundedReceiver<SessionInput>,
    pub(crate) inbound_tx: mpsc::UnboundedSender<SessionInput>,
    pub(crate) events: broadcast::Sender<SessionEvent>,
    pub(crate) stats: watch::Sender<SessionStats>,
    pub(crate) ledger: Arc<dyn UsageLedger>,
    pub(crate) playback: Option<Arc<dyn PlaybackSink>>,
    pub(crate) shared: Arc<Mutex<ManagerInner>>,
    pub(crate) clock: Option<BudgetClock>,
    pub(crate) sampler: Option<TelemetrySampler>,
    pub(crate) forwarder: Option<JoinHandle<()>>,
    pub(crate) playback_attached: bool,
}

impl SessionDriver {
    pub(crate) fn spawn(self) -> JoinHandle<SessionStats> {
        tokio::spawn(self.run())
    }

    pub(crate) fn snapshot(&self, state: SessionState, end_reason: Option<EndReason>) -> SessionStats {
        SessionStats {
            session_id: self.session_id.clone(),
            user_id: self.user_id.clone(),
            state,
            started_at: self.started_at,
            elapsed_seconds: self.elapsed,
            remaining_budget_seconds: self.remaining,
            end_reason,
        }
    }

    async fn run(mut self) -> SessionStats {
        self.start_producers();

        if let Some(remote) = self.connection.remote_stream().cloned() {
            self.attach_playback(remote);
        }

        let mut reason = None;
        for event in self.connection.take_early_events() {
            reason = self.on_transport(event);
            if reason.is_some() {
                break;
            }
        }

        let reason = match reason {
            Some(reason) => reason,
            None => self.event_loop().await,
        };

        self.finish(reason).await
    }

    fn start_producers(&mut self) {
        let tx = self.inbound_tx.clone();
        self.clock = Some(BudgetClock::spawn(self.config.clock_period, move || {
            tx.send(SessionInput::Tick).is_ok()
        }));

        match self.connection.subscribe_local() {
            Some(frames) => {
                let tx = self.inbound_tx.clone();
                self.sampler = Some(TelemetrySampler::spawn(
                    frames,
                    self.config.analyzer.clone(),
                    self.config.telemetry_interval,
                    move |snapshot| tx.send(SessionInput::Telemetry(snapshot)).is_ok(),
                ));
            }
            None => warn!("Session {} has no local stream, telemetry disabled", self.session_id),
        }

        if let Some(mut transport_events) = self.connection.take_events() {
            let tx = self.inbound_tx.clone();
            self.forwarder = Some(tokio::spawn(async move {
                while let Some(event) = transport_events.recv().await {
                    if tx.send(SessionInput::Transport(event)).is_err() {
                        return;
                    }
                }
                let _ = tx.send(SessionInput::Transport(TransportEvent::Disconnected {
                    reason: "transport event stream ended".to_string(),
                }));
            }));
        }
    }

    async fn event_loop(&mut self) -> EndReason {
        while let Some(input) = self.inbound.recv().await {
            match input {
                SessionInput::Tick => {
                    self.elapsed += 1;
                    self.remaining = self.remaining.saturating_sub(1);
                    self.stats
                        .send_replace(self.snapshot(SessionState::Active, None));
                    self.emit(SessionEvent::Clock {
                        elapsed_seconds: self.elapsed,
                        remaining_budget_seconds: self.remaining,
                    });

                    if self.remaining == 0 {
                        info!("Session {} used up its budget", self.session_id);
                        return EndReason::BudgetExhausted;
                    }
                }
                SessionInput::Telemetry(snapshot) => {
                    if self.connection.accepts_telemetry() {
                        self.emit(SessionEvent::Emotion(snapshot));
                    } else {
                        debug!("Dropping telemetry while connection is negotiating");
                    }
                }
                SessionInput::Transport(event) => {
                    if let Some(reason) = self.on_transport(event) {
                        return reason;
                    }
                }
                SessionInput::SendText { text, reply } => {
                    let result = self.send_text(text).await;
                    let _ = reply.send(result);
                }
                SessionInput::Stop => {
                    info!("Session {} stopped by caller", self.session_id);
                    return EndReason::Stopped;
                }
            }
        }

        EndReason::Stopped
    }

    fn on_transport(&mut self, event: TransportEvent) -> Option<EndReason> {
        match event {
            TransportEvent::Message(frame) => {
                for output in self.processor.process_frame(&frame) {
                    self.emit(output.into());
                }
                None
            }
            TransportEvent::RemoteTrack(remote) => {
                self.connection.set_remote_stream(remote.clone());
                self.attach_playback(remote);
                None
            }
            TransportEvent::DataChannelOpen => {
                debug!("Duplicate data channel open notification");
                None
            }
            TransportEvent::DataChannelClosed => {
                warn!("Data channel closed under session {}", self.session_id);
                Some(EndReason::ConnectionLost {
                    detail: "data channel closed".to_string(),
                })
            }
            TransportEvent::Disconnected { reason } => {
                warn!("Transport lost under session {}: {}", self.session_id, reason);
                Some(EndReason::ConnectionLost { detail: reason })
            }
        }
    }

    async fn send_text(&self, text: String) -> VoiceResult<()> {
        self.connection
            .send_event(&ClientEvent::UserText(text))
            .await?;
        self.connection.send_event(&ClientEvent::ResponseCreate).await?;
        debug!("Out-of-band text sent on session {}", self.session_id);
        Ok(())
    }

    fn attach_playback(&mut self, remote: crate::audio::RemoteStream) {
        if let Some(playback) = &self.playback {
            playback.attach(remote);
            self.playback_attached = true;
        }
    }

    fn emit(&self, event: SessionEvent) {
        // No subscribers is not an error
        let _ = self.events.send(event);
    }

    /// Tear down in order: timers, sampling, media, data channel, transport
    async fn finish(mut self, reason: EndReason) -> SessionStats {
        info!("Ending session {} ({:?})", self.session_id, reason);

        if let Some(mut clock) = self.clock.take() {
            clock.stop().await;
        }
        if let Some(forwarder) = self.forwarder.take() {
            forwarder.abort();
        }
        if let Some(mut sampler) = self.sampler.take() {
            sampler.stop().await;
        }

        self.connection.teardown().await;

        if self.playback_attached {
            if let Some(playback) = &self.playback {
                playback.detach();
            }
            self.playback_attached = false;
        }

        if self.elapsed > 0 {
            if let Err(e) = self.ledger.record_usage(&self.user_id, self.elapsed).await {
                error!(
                    "Failed to record {}s of usage for session {}: {}",
                    self.elapsed, self.session_id, e
                );
                self.emit(SessionEvent::UsagePersistFailed {
                    session_id: self.session_id.clone(),
                    delta_seconds: self.elapsed,
                    message: e.to_string(),
                });
            }
        }

        let stats = self.snapshot(SessionState::Ended, Some(reason.clone()));
        self.stats.send_replace(stats.clone());

        {
            let mut inner = self.shared.lock().await;
            inner.session_ended(&self.session_id, stats.clone());
        }

        self.emit(SessionEvent::Lifecycle(LifecycleEvent::Ended {
            session_id: self.session_id.clone(),
            reason,
            elapsed_seconds: self.elapsed,
        }));

        info!(
            "Session {} ended after {}s ({}s budget left)",
            self.session_id, self.elapsed, self.remaining
        );

        stats
    }
}

impl From<StreamOutput> for SessionEvent {
    fn from(output: StreamOutput) -> Self {
        match output {
            StreamOutput::SpeakingChanged { speaker, speaking } => {
                SessionEvent::SpeakingChanged { speaker, speaking }
            }
            StreamOutput::Transcript(fragment) => SessionEvent::Transcript(fragment),
            StreamOutput::ProtocolError(details) => SessionEvent::ProtocolError(details),
            StreamOutput::Unrecognized { event_type, raw } => SessionEvent::Unrecognized {
                event_type,
                payload: raw,
            },
        }
    }
}

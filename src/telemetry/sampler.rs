use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::analyzer::{AnalyzerConfig, FrequencyAnalyzer};
use super::emotion::EmotionSnapshot;
use crate::audio::AudioFrame;
use crate::session::MIN_PERIOD;

/// Periodic telemetry over the local stream
///
/// Reads frames by reference (a broadcast subscription), never owns the
/// capture device. `stop()` cancels the timer before the analyser is dropped,
/// so no tick fires once teardown begins.
pub struct TelemetrySampler {
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl TelemetrySampler {
    /// Start sampling every `interval`
    ///
    /// `emit` receives each snapshot and returns `false` to stop the sampler.
    pub fn spawn<F>(
        mut frames: broadcast::Receiver<AudioFrame>,
        config: AnalyzerConfig,
        interval: Duration,
        mut emit: F,
    ) -> Self
    where
        F: FnMut(EmotionSnapshot) -> bool + Send + 'static,
    {
        if interval.is_zero() {
            warn!("Zero telemetry interval, using {:?}", MIN_PERIOD);
        }
        let interval = interval.max(MIN_PERIOD);
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        let handle = tokio::spawn(async move {
            let mut analyzer = FrequencyAnalyzer::new(config);
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            info!(
                "Telemetry sampler started ({} bins, every {:?})",
                analyzer.bin_count(),
                interval
            );

            loop {
                tokio::select! {
                    biased;

                    _ = token.cancelled() => break,

                    _ = ticker.tick() => {
                        if token.is_cancelled() {
                            break;
                        }
                        let bins = analyzer.byte_frequency_data();
                        if !emit(EmotionSnapshot::from_bins(&bins)) {
                            debug!("Telemetry receiver gone, stopping sampler");
                            break;
                        }
                    }

                    frame = frames.recv() => match frame {
                        Ok(frame) => analyzer.push_samples(&frame.samples),
                        Err(RecvError::Lagged(skipped)) => {
                            debug!("Telemetry sampler lagged, skipped {} frames", skipped);
                        }
                        Err(RecvError::Closed) => {
                            debug!("Local stream closed, stopping sampler");
                            break;
                        }
                    },
                }
            }

            info!("Telemetry sampler stopped");
        });

        Self {
            cancel,
            handle: Some(handle),
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Cancel the timer and wait for the analyser to be released (idempotent)
    pub async fn stop(&mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                error!("Telemetry sampler task panicked: {}", e);
            }
        }
    }
}

impl Drop for TelemetrySampler {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

use hound::WavReader;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::backend::{AudioFrame, CaptureConstraints, CaptureDevice, MediaDevices};
use crate::error::{VoiceError, VoiceResult};

pub struct AudioFile {
    pub path: String,
    pub duration_seconds: f64,
    pub sample_rate: u32,
    pub channels: u16,
    pub samples: Vec<i16>,
}

impl AudioFile {
    pub fn open(path: impl AsRef<Path>) -> VoiceResult<Self> {
        let path = path.as_ref();
        info!("Opening audio file: {}", path.display());

        let reader = WavReader::open(path)?;

        let spec = reader.spec();
        let samples: Vec<i16> = reader
            .into_samples::<i16>()
            .collect::<Result<Vec<_>, _>>()?;

        let duration_seconds =
            samples.len() as f64 / (spec.sample_rate as f64 * spec.channels as f64);

        info!(
            "Audio file loaded: {:.1}s, {}Hz, {} channels, {} samples",
            duration_seconds,
            spec.sample_rate,
            spec.channels,
            samples.len()
        );

        Ok(Self {
            path: path.display().to_string(),
            duration_seconds,
            sample_rate: spec.sample_rate,
            channels: spec.channels,
            samples,
        })
    }

    /// Down-mix to mono and linearly resample to `target_rate`
    pub fn to_mono_at(&self, target_rate: u32) -> Vec<i16> {
        let mono: Vec<i16> = if self.channels <= 1 {
            self.samples.clone()
        } else {
            let channels = self.channels as usize;
            self.samples
                .chunks_exact(channels)
                .map(|frame| {
                    let sum: i32 = frame.iter().map(|&s| s as i32).sum();
                    (sum / channels as i32) as i16
                })
                .collect()
        };

        if self.sample_rate == target_rate || mono.is_empty() || target_rate == 0 {
            return mono;
        }

        let ratio = self.sample_rate as f64 / target_rate as f64;
        let out_len = (mono.len() as f64 / ratio).floor() as usize;
        let last = mono.len() - 1;

        (0..out_len)
            .map(|i| {
                let pos = i as f64 * ratio;
                let idx = pos.floor() as usize;
                let frac = pos - idx as f64;
                let a = mono[idx.min(last)] as f64;
                let b = mono[(idx + 1).min(last)] as f64;
                (a + (b - a) * frac).round() as i16
            })
            .collect()
    }
}

/// Microphone that replays a WAV file in real time
///
/// Used for offline runs of the engine and for tests.
pub struct WavFileMicrophone {
    samples: Arc<Vec<i16>>,
    sample_rate: u32,
    frame_duration: Duration,
    looped: bool,
}

impl WavFileMicrophone {
    /// Load `path`, converted to the rate the session will request
    pub fn open(path: impl AsRef<Path>, sample_rate: u32) -> VoiceResult<Self> {
        let file = AudioFile::open(path)?;
        Ok(Self::from_samples(file.to_mono_at(sample_rate), sample_rate))
    }

    pub fn from_samples(samples: Vec<i16>, sample_rate: u32) -> Self {
        Self {
            samples: Arc::new(samples),
            sample_rate,
            frame_duration: Duration::from_millis(20),
            looped: false,
        }
    }

    /// Restart from the beginning when the file runs out
    pub fn looped(mut self, looped: bool) -> Self {
        self.looped = looped;
        self
    }
}

#[async_trait::async_trait]
impl MediaDevices for WavFileMicrophone {
    async fn acquire_microphone(
        &self,
        constraints: &CaptureConstraints,
    ) -> VoiceResult<Box<dyn CaptureDevice>> {
        if constraints.sample_rate != self.sample_rate {
            return Err(VoiceError::AudioDevice(format!(
                "file prepared at {}Hz, capture requested {}Hz",
                self.sample_rate, constraints.sample_rate
            )));
        }

        let (tx, _) = broadcast::channel(64);
        let samples = Arc::clone(&self.samples);
        let frame_len = (self.sample_rate as u64 * self.frame_duration.as_millis() as u64
            / 1000)
            .max(1) as usize;
        let frame_duration = self.frame_duration;
        let looped = self.looped;
        let sample_rate = self.sample_rate;
        let frames = tx.clone();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(frame_duration);
            let mut offset = 0usize;
            let mut timestamp_ms = 0u64;

            loop {
                ticker.tick().await;

                if offset >= samples.len() {
                    if looped && !samples.is_empty() {
                        offset = 0;
                    } else {
                        debug!("WAV microphone reached end of file");
                        break;
                    }
                }

                let end = (offset + frame_len).min(samples.len());
                let frame = AudioFrame {
                    samples: samples[offset..end].to_vec(),
                    sample_rate,
                    channels: 1,
                    timestamp_ms,
                };
                offset = end;
                timestamp_ms += frame_duration.as_millis() as u64;

                // No subscribers yet is fine; frames are live, not buffered.
                let _ = frames.send(frame);
            }
        });

        info!("WAV microphone capture started ({}Hz mono)", sample_rate);

        Ok(Box::new(WavCapture {
            tx,
            task: Some(task),
        }))
    }
}

struct WavCapture {
    tx: broadcast::Sender<AudioFrame>,
    task: Option<JoinHandle<()>>,
}

impl CaptureDevice for WavCapture {
    fn subscribe(&self) -> broadcast::Receiver<AudioFrame> {
        self.tx.subscribe()
    }

    fn stop(&mut self) -> VoiceResult<()> {
        if let Some(task) = self.task.take() {
            task.abort();
            info!("WAV microphone capture stopped");
        }
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    fn name(&self) -> &str {
        "wav-file"
    }
}

impl Drop for WavCapture {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

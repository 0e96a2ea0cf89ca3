use rustfft::{num_complex::Complex32, Fft, FftPlanner};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::f32::consts::PI;
use std::sync::Arc;

/// Frequency analyser configuration
///
/// Defaults mirror a browser `AnalyserNode`: 512-point FFT (256 bins),
/// decibel range [-100, -30] mapped onto 0..=255, smoothing 0.8.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyzerConfig {
    /// FFT size; must be a power of two, bins = fft_size / 2
    pub fft_size: usize,
    pub min_decibels: f32,
    pub max_decibels: f32,
    /// Temporal smoothing between reads, 0.0 disables
    pub smoothing: f32,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            fft_size: 512,
            min_decibels: -100.0,
            max_decibels: -30.0,
            smoothing: 0.8,
        }
    }
}

/// Rolling FFT over the most recent `fft_size` samples
pub struct FrequencyAnalyzer {
    config: AnalyzerConfig,
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    samples: VecDeque<f32>,
    smoothed: Vec<f32>,
    scratch: Vec<Complex32>,
}

impl FrequencyAnalyzer {
    pub fn new(config: AnalyzerConfig) -> Self {
        let fft_size = config.fft_size.max(2).next_power_of_two();
        let fft = FftPlanner::<f32>::new().plan_fft_forward(fft_size);

        // Blackman window (alpha = 0.16)
        let window = (0..fft_size)
            .map(|i| {
                let x = i as f32 / fft_size as f32;
                0.42 - 0.5 * (2.0 * PI * x).cos() + 0.08 * (4.0 * PI * x).cos()
            })
            .collect();

        Self {
            config: AnalyzerConfig {
                fft_size,
                ..config
            },
            fft,
            window,
            samples: VecDeque::from(vec![0.0; fft_size]),
            smoothed: vec![0.0; fft_size / 2],
            scratch: vec![Complex32::new(0.0, 0.0); fft_size],
        }
    }

    pub fn bin_count(&self) -> usize {
        self.config.fft_size / 2
    }

    /// Feed PCM samples; only the latest `fft_size` are kept
    pub fn push_samples(&mut self, samples: &[i16]) {
        let fft_size = self.config.fft_size;
        let skip = samples.len().saturating_sub(fft_size);
        for &s in &samples[skip..] {
            if self.samples.len() == fft_size {
                self.samples.pop_front();
            }
            self.samples.push_back(s as f32 / 32768.0);
        }
    }

    /// Current spectrum as byte magnitudes per bin
    pub fn byte_frequency_data(&mut self) -> Vec<u8> {
        let n = self.config.fft_size;

        for (i, (slot, sample)) in self.scratch.iter_mut().zip(self.samples.iter()).enumerate() {
            *slot = Complex32::new(sample * self.window[i], 0.0);
        }
        self.fft.process(&mut self.scratch);

        let tau = self.config.smoothing.clamp(0.0, 1.0);
        let range = self.config.max_decibels - self.config.min_decibels;

        self.smoothed
            .iter_mut()
            .zip(self.scratch.iter())
            .map(|(smoothed, bin)| {
                let magnitude = bin.norm() / n as f32;
                *smoothed = tau * *smoothed + (1.0 - tau) * magnitude;

                if *smoothed <= 0.0 || range <= 0.0 {
                    return 0;
                }
                let db = 20.0 * smoothed.log10();
                let scaled = 255.0 / range * (db - self.config.min_decibels);
                scaled.floor().clamp(0.0, 255.0) as u8
            })
            .collect()
    }

    /// Forget buffered audio and smoothing state
    pub fn reset(&mut self) {
        self.samples.iter_mut().for_each(|s| *s = 0.0);
        self.smoothed.iter_mut().for_each(|s| *s = 0.0);
    }
}

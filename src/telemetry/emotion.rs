//! Vocal "emotion" heuristic
//!
//! The four channels are a proxy computed from spectral energy of the local
//! microphone. They are not a calibrated emotion classifier and are meant for
//! UI affordances only.

use serde::{Deserialize, Serialize};

/// Spectral features of one analysis window
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpectrumFeatures {
    /// Mean magnitude across all bins
    pub avg: f32,
    /// Peak magnitude
    pub max: f32,
    /// Mean magnitude over the upper half of the bins
    pub high_freq_avg: f32,
}

impl SpectrumFeatures {
    pub fn from_bins(bins: &[u8]) -> Self {
        if bins.is_empty() {
            return Self {
                avg: 0.0,
                max: 0.0,
                high_freq_avg: 0.0,
            };
        }

        let mean = |slice: &[u8]| -> f32 {
            if slice.is_empty() {
                0.0
            } else {
                slice.iter().map(|&b| b as f32).sum::<f32>() / slice.len() as f32
            }
        };

        Self {
            avg: mean(bins),
            max: bins.iter().copied().max().unwrap_or(0) as f32,
            high_freq_avg: mean(&bins[bins.len() / 2..]),
        }
    }
}

/// Behavioural telemetry snapshot, each channel in [0, 100]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EmotionSnapshot {
    pub confidence: f32,
    pub energy: f32,
    pub stress: f32,
    pub engagement: f32,
}

fn clamp_percent(value: f32) -> f32 {
    value.clamp(0.0, 100.0)
}

impl EmotionSnapshot {
    pub fn from_features(f: SpectrumFeatures) -> Self {
        let confidence = f.avg / 128.0 * 100.0 + 20.0;
        let energy = f.max / 255.0 * 100.0;
        let stress = f.high_freq_avg / 128.0 * 80.0 + if f.avg > 100.0 { 20.0 } else { 0.0 };
        let engagement = if f.avg > 10.0 {
            70.0 + f.avg / 128.0 * 30.0
        } else {
            30.0
        };

        Self {
            confidence: clamp_percent(confidence),
            energy: clamp_percent(energy),
            stress: clamp_percent(stress),
            engagement: clamp_percent(engagement),
        }
    }

    pub fn from_bins(bins: &[u8]) -> Self {
        Self::from_features(SpectrumFeatures::from_bins(bins))
    }
}

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::audio::CaptureConstraints;
use crate::error::{VoiceError, VoiceResult};
use crate::signaling::{ConnectTimeouts, TransportSpec};
use crate::telemetry::AnalyzerConfig;

/// Configuration for voice sessions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Microphone constraints (24kHz mono with voice processing by default)
    pub capture: CaptureConstraints,

    /// Transport shape (tracks + data channel label)
    pub transport: TransportSpec,

    /// Emotion snapshot cadence
    /// Default: 100ms
    pub telemetry_interval: Duration,

    pub analyzer: AnalyzerConfig,

    /// Budget clock period
    /// Default: 1 second
    pub clock_period: Duration,

    /// Token request timeout
    pub token_timeout: Duration,

    /// SDP exchange and data channel handshake timeout
    pub negotiation_timeout: Duration,

    /// Capacity of the caller-facing event channel
    pub event_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            capture: CaptureConstraints::default(),
            transport: TransportSpec::default(),
            telemetry_interval: Duration::from_millis(100),
            analyzer: AnalyzerConfig::default(),
            clock_period: Duration::from_secs(1),
            token_timeout: Duration::from_secs(10),
            negotiation_timeout: Duration::from_secs(20),
            event_capacity: 1024,
        }
    }
}

impl SessionConfig {
    /// Reject settings that would stall or crash a running session
    pub fn validate(&self) -> VoiceResult<()> {
        let periods = [
            ("telemetry interval", self.telemetry_interval),
            ("clock period", self.clock_period),
            ("token timeout", self.token_timeout),
            ("negotiation timeout", self.negotiation_timeout),
        ];
        for (name, value) in periods {
            if value.is_zero() {
                return Err(VoiceError::Config(format!("{} must be non-zero", name)));
            }
        }

        if self.analyzer.fft_size == 0 {
            return Err(VoiceError::Config("fft_size must be non-zero".to_string()));
        }
        if !(0.0..1.0).contains(&self.analyzer.smoothing) {
            return Err(VoiceError::Config(format!(
                "smoothing must be in [0, 1), got {}",
                self.analyzer.smoothing
            )));
        }

        Ok(())
    }

    pub fn connect_timeouts(&self) -> ConnectTimeouts {
        ConnectTimeouts {
            token: self.token_timeout,
            negotiation: self.negotiation_timeout,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(SessionConfig::default().validate().is_ok());
    }

    #[test]
    fn test_zero_periods_are_rejected() {
        let config = SessionConfig {
            telemetry_interval: Duration::ZERO,
            ..SessionConfig::default()
        };
        assert!(matches!(config.validate(), Err(VoiceError::Config(_))));

        let config = SessionConfig {
            negotiation_timeout: Duration::ZERO,
            ..SessionConfig::default()
        };
        assert!(matches!(config.validate(), Err(VoiceError::Config(_))));
    }

    #[test]
    fn test_analyzer_settings_are_checked() {
        let mut config = SessionConfig::default();
        config.analyzer.fft_size = 0;
        assert!(config.validate().is_err());

        let mut config = SessionConfig::default();
        config.analyzer.smoothing = 1.0;
        assert!(config.validate().is_err());
    }
}

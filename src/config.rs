use anyhow::{Context, Result};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

use crate::audio::{CaptureConstraints, MediaDevices, PlaybackSink};
use crate::session::{Collaborators, InMemoryUsageLedger, SessionConfig};
use crate::signaling::{HttpNegotiator, HttpTokenIssuer, TransportFactory, TransportSpec};
use crate::telemetry::AnalyzerConfig;

#[derive(Debug, Deserialize)]
pub struct Config {
    pub service: ServiceConfig,
    pub realtime: RealtimeConfig,
    pub audio: AudioConfig,
    pub budget: BudgetConfig,
    pub telemetry: TelemetryConfig,
}

#[derive(Debug, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

#[derive(Debug, Deserialize)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

#[derive(Debug, Deserialize)]
pub struct RealtimeConfig {
    pub token_url: String,
    pub negotiation_url: String,
    pub model: String,
    pub voice: String,
    /// Environment variable holding the token issuer's API key, if any
    pub api_key_env: Option<String>,
    pub token_timeout_secs: u64,
    pub negotiation_timeout_secs: u64,
    pub data_channel_label: String,
}

#[derive(Debug, Deserialize)]
pub struct AudioConfig {
    pub sample_rate: u32,
    pub channels: u16,
    pub echo_cancellation: bool,
    pub noise_suppression: bool,
    pub auto_gain_control: bool,
}

#[derive(Debug, Deserialize)]
pub struct BudgetConfig {
    pub daily_seconds: u64,
}

#[derive(Debug, Deserialize)]
pub struct TelemetryConfig {
    pub interval_ms: u64,
    pub fft_size: usize,
    pub smoothing: f32,
}

impl Config {
    /// Load from a TOML file, overridden by `COMPANION_VOICE__SECTION__KEY`
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::with_prefix("COMPANION_VOICE").separator("__"))
            .build()?;

        let cfg: Self = settings.try_deserialize()?;
        cfg.session_config()
            .validate()
            .with_context(|| format!("Invalid configuration in {}", path))?;

        Ok(cfg)
    }

    /// Address the HTTP control API listens on
    pub fn http_addr(&self) -> String {
        format!("{}:{}", self.service.http.bind, self.service.http.port)
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            capture: CaptureConstraints {
                sample_rate: self.audio.sample_rate,
                channels: self.audio.channels,
                echo_cancellation: self.audio.echo_cancellation,
                noise_suppression: self.audio.noise_suppression,
                auto_gain_control: self.audio.auto_gain_control,
            },
            transport: TransportSpec {
                data_channel_label: self.realtime.data_channel_label.clone(),
                ..TransportSpec::default()
            },
            telemetry_interval: Duration::from_millis(self.telemetry.interval_ms),
            analyzer: AnalyzerConfig {
                fft_size: self.telemetry.fft_size,
                smoothing: self.telemetry.smoothing,
                ..AnalyzerConfig::default()
            },
            token_timeout: Duration::from_secs(self.realtime.token_timeout_secs),
            negotiation_timeout: Duration::from_secs(self.realtime.negotiation_timeout_secs),
            ..SessionConfig::default()
        }
    }

    pub fn token_issuer(&self) -> Result<HttpTokenIssuer> {
        let issuer = HttpTokenIssuer::new(
            &self.realtime.token_url,
            &self.realtime.model,
            &self.realtime.voice,
            Duration::from_secs(self.realtime.token_timeout_secs),
        )?;

        match &self.realtime.api_key_env {
            Some(var) => {
                let key = std::env::var(var)
                    .with_context(|| format!("API key variable {} is not set", var))?;
                Ok(issuer.with_api_key(key))
            }
            None => Ok(issuer),
        }
    }

    pub fn negotiator(&self) -> Result<HttpNegotiator> {
        Ok(HttpNegotiator::new(
            &self.realtime.negotiation_url,
            &self.realtime.model,
            Duration::from_secs(self.realtime.negotiation_timeout_secs),
        )?)
    }

    pub fn ledger(&self) -> InMemoryUsageLedger {
        InMemoryUsageLedger::new(self.budget.daily_seconds)
    }

    /// Wire the HTTP-backed collaborators around host-provided media and transport
    pub fn collaborators(
        &self,
        media: Arc<dyn MediaDevices>,
        transports: Arc<dyn TransportFactory>,
        playback: Option<Arc<dyn PlaybackSink>>,
    ) -> Result<Collaborators> {
        Ok(Collaborators {
            token_issuer: Arc::new(self.token_issuer()?),
            negotiator: Arc::new(self.negotiator()?),
            media,
            transports,
            ledger: Arc::new(self.ledger()),
            playback,
        })
    }
}

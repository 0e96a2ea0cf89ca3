use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::{info, warn};

use crate::error::{VoiceError, VoiceResult};

/// Single-use, short-lived credential for one negotiation
///
/// The value is consumed by [`super::Negotiator::exchange`] and never logged;
/// `Debug` redacts it. Not `Clone`, so it cannot outlive its one exchange.
pub struct EphemeralCredential {
    value: String,
    expires_at: DateTime<Utc>,
}

impl EphemeralCredential {
    pub fn new(value: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            value: value.into(),
            expires_at,
        }
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Consume the credential, yielding the bearer value
    pub fn into_bearer(self) -> String {
        self.value
    }
}

impl fmt::Debug for EphemeralCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EphemeralCredential")
            .field("value", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Issues ephemeral credentials for the remote peer
#[async_trait::async_trait]
pub trait TokenIssuer: Send + Sync {
    async fn request_ephemeral_credential(&self) -> VoiceResult<EphemeralCredential>;
}

#[derive(Debug, Serialize)]
struct TokenRequest<'a> {
    model: &'a str,
    voice: &'a str,
}

#[derive(Debug, Deserialize)]
struct SecretBody {
    value: String,
    expires_at: i64,
}

/// Issuers either wrap the secret in `client_secret` or return it bare
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TokenResponse {
    Wrapped { client_secret: SecretBody },
    Bare(SecretBody),
}

impl TokenResponse {
    fn into_secret(self) -> SecretBody {
        match self {
            TokenResponse::Wrapped { client_secret } => client_secret,
            TokenResponse::Bare(secret) => secret,
        }
    }
}

/// Token issuer reached over HTTP
pub struct HttpTokenIssuer {
    client: reqwest::Client,
    url: String,
    api_key: Option<String>,
    model: String,
    voice: String,
}

impl HttpTokenIssuer {
    pub fn new(
        url: impl Into<String>,
        model: impl Into<String>,
        voice: impl Into<String>,
        timeout: Duration,
    ) -> VoiceResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| VoiceError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url: url.into(),
            api_key: None,
            model: model.into(),
            voice: voice.into(),
        })
    }

    /// Authenticate against the issuer itself
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }
}

#[async_trait::async_trait]
impl TokenIssuer for HttpTokenIssuer {
    async fn request_ephemeral_credential(&self) -> VoiceResult<EphemeralCredential> {
        info!("Requesting ephemeral credential from {}", self.url);

        let mut request = self.client.post(&self.url).json(&TokenRequest {
            model: &self.model,
            voice: &self.voice,
        });
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| VoiceError::Token(format!("Token issuer unreachable: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            warn!("Token issuer returned HTTP {}", status);
            return Err(VoiceError::Token(format!("Token issuer returned HTTP {}", status)));
        }

        let secret = response
            .json::<TokenResponse>()
            .await
            .map_err(|e| VoiceError::Token(format!("Malformed token response: {}", e)))?
            .into_secret();

        if secret.value.is_empty() {
            return Err(VoiceError::Token("Token issuer returned no credential".to_string()));
        }

        let expires_at = Utc
            .timestamp_opt(secret.expires_at, 0)
            .single()
            .ok_or_else(|| {
                VoiceError::Token(format!("Invalid credential expiry: {}", secret.expires_at))
            })?;

        info!("Ephemeral credential issued (expires {})", expires_at);

        Ok(EphemeralCredential::new(secret.value, expires_at))
    }
}

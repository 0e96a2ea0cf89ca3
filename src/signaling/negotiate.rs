use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, warn};

use super::token::EphemeralCredential;
use crate::error::{VoiceError, VoiceResult};

/// Role of a session description in the offer/answer exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpType {
    Offer,
    Answer,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub kind: SdpType,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpType::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpType::Answer,
            sdp: sdp.into(),
        }
    }
}

/// Exchanges a local offer for the remote peer's answer
#[async_trait::async_trait]
pub trait Negotiator: Send + Sync {
    /// Send `offer` authorised by `credential`, returning the remote answer
    ///
    /// Fails with `Negotiation` on transport failure and `RemoteRejection`
    /// when the peer answers with a non-success status.
    async fn exchange(
        &self,
        offer: &SessionDescription,
        credential: EphemeralCredential,
    ) -> VoiceResult<SessionDescription>;
}

/// Negotiation over the remote peer's HTTP SDP endpoint
pub struct HttpNegotiator {
    client: reqwest::Client,
    url: String,
    model: String,
}

impl HttpNegotiator {
    pub fn new(
        url: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> VoiceResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| VoiceError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url: url.into(),
            model: model.into(),
        })
    }
}

#[async_trait::async_trait]
impl Negotiator for HttpNegotiator {
    async fn exchange(
        &self,
        offer: &SessionDescription,
        credential: EphemeralCredential,
    ) -> VoiceResult<SessionDescription> {
        if offer.kind != SdpType::Offer {
            return Err(VoiceError::Negotiation(
                "Local description is not an offer".to_string(),
            ));
        }

        info!("Sending SDP offer to {} (model={})", self.url, self.model);

        let response = self
            .client
            .post(&self.url)
            .query(&[("model", self.model.as_str())])
            .bearer_auth(credential.into_bearer())
            .header(reqwest::header::CONTENT_TYPE, "application/sdp")
            .body(offer.sdp.clone())
            .send()
            .await
            .map_err(|e| VoiceError::Negotiation(format!("SDP exchange failed: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| VoiceError::Negotiation(format!("Failed to read SDP answer: {}", e)))?;

        if !status.is_success() {
            warn!("Remote peer rejected offer with HTTP {}", status);
            return Err(VoiceError::RemoteRejection {
                status: status.as_u16(),
                body,
            });
        }

        if body.trim().is_empty() {
            return Err(VoiceError::Negotiation("Remote peer returned an empty answer".to_string()));
        }

        info!("Received SDP answer ({} bytes)", body.len());

        Ok(SessionDescription::answer(body))
    }
}

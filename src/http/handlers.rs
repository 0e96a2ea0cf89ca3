use super::state::AppState;
use crate::error::{ErrorKind, VoiceError};
use crate::events::Utterance;
use crate::session::{SessionState, SessionStats};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct StartSessionResponse {
    pub session_id: String,
    pub status: SessionState,
}

#[derive(Debug, Serialize)]
pub struct StopSessionResponse {
    pub status: String,
    /// Absent when stop cancelled a connection attempt
    pub stats: Option<SessionStats>,
}

#[derive(Debug, Deserialize)]
pub struct SendTextRequest {
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct TranscriptResponse {
    pub user_id: String,
    pub utterances: Vec<Utterance>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub kind: Option<ErrorKind>,
}

fn status_for(err: &VoiceError) -> StatusCode {
    match err {
        VoiceError::BudgetExhausted => StatusCode::TOO_MANY_REQUESTS,
        VoiceError::InvalidState(_) | VoiceError::NotActive | VoiceError::Cancelled => {
            StatusCode::CONFLICT
        }
        VoiceError::MediaPermission(_) => StatusCode::FORBIDDEN,
        VoiceError::Token(_)
        | VoiceError::Negotiation(_)
        | VoiceError::RemoteRejection { .. }
        | VoiceError::TransportLost(_) => StatusCode::BAD_GATEWAY,
        VoiceError::Protocol(_) => StatusCode::BAD_REQUEST,
        VoiceError::AudioDevice(_) | VoiceError::Persistence(_) | VoiceError::Config(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

fn voice_error(err: VoiceError) -> Response {
    let status = status_for(&err);
    if status.is_server_error() {
        error!("Voice request failed: {}", err);
    } else {
        warn!("Voice request rejected: {}", err);
    }
    (
        status,
        Json(ErrorResponse {
            error: err.to_string(),
            kind: Some(err.kind()),
        }),
    )
        .into_response()
}

fn not_found(user_id: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse {
            error: format!("No voice session for {}", user_id),
            kind: None,
        }),
    )
        .into_response()
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /voice/:user_id/start
pub async fn start_session(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Response {
    info!("Starting voice session for {}", user_id);

    let manager = state.manager_for(&user_id).await;
    match manager.start(&user_id).await {
        Ok(session_id) => (
            StatusCode::OK,
            Json(StartSessionResponse {
                session_id,
                status: SessionState::Active,
            }),
        )
            .into_response(),
        Err(e) => voice_error(e),
    }
}

/// POST /voice/:user_id/stop
pub async fn stop_session(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Response {
    let Some(manager) = state.manager(&user_id).await else {
        return not_found(&user_id);
    };

    match manager.stop().await {
        Ok(Some(stats)) => {
            info!("Voice session {} stopped", stats.session_id);
            (
                StatusCode::OK,
                Json(StopSessionResponse {
                    status: "stopped".to_string(),
                    stats: Some(stats),
                }),
            )
                .into_response()
        }
        Ok(None) => (
            StatusCode::OK,
            Json(StopSessionResponse {
                status: "cancelled".to_string(),
                stats: None,
            }),
        )
            .into_response(),
        Err(e) => voice_error(e),
    }
}

/// GET /voice/:user_id/status
pub async fn get_session_status(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Response {
    let Some(manager) = state.manager(&user_id).await else {
        return not_found(&user_id);
    };

    match manager.stats().await {
        Some(stats) => (StatusCode::OK, Json(stats)).into_response(),
        None => not_found(&user_id),
    }
}

/// GET /voice/:user_id/transcript
pub async fn get_session_transcript(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Response {
    if state.manager(&user_id).await.is_none() {
        return not_found(&user_id);
    }

    let utterances = state.transcript(&user_id).await;
    (StatusCode::OK, Json(TranscriptResponse { user_id, utterances })).into_response()
}

/// POST /voice/:user_id/text
pub async fn send_text(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(req): Json<SendTextRequest>,
) -> Response {
    let Some(manager) = state.manager(&user_id).await else {
        return not_found(&user_id);
    };

    match manager.send_out_of_band_text(&req.text).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => voice_error(e),
    }
}

/// DELETE /voice/:user_id
pub async fn evict_user(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Response {
    match state.evict(&user_id).await {
        Ok(true) => {
            info!("Released voice manager for {}", user_id);
            StatusCode::NO_CONTENT.into_response()
        }
        Ok(false) => not_found(&user_id),
        Err(e) => voice_error(e),
    }
}

/// GET /health
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

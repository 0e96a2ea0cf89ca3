use super::handlers;
use super::state::AppState;
use axum::{
    routing::{delete, get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Create the HTTP router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        // Session control
        .route("/voice/:user_id", delete(handlers::evict_user))
        .route("/voice/:user_id/start", post(handlers::start_session))
        .route("/voice/:user_id/stop", post(handlers::stop_session))
        .route("/voice/:user_id/text", post(handlers::send_text))
        // Session queries
        .route("/voice/:user_id/status", get(handlers::get_session_status))
        .route(
            "/voice/:user_id/transcript",
            get(handlers::get_session_transcript),
        )
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

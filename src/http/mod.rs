//! HTTP control API over per-user voice sessions
//!
//! - POST /voice/:user_id/start - Start a session
//! - POST /voice/:user_id/stop - Stop (or cancel) the session
//! - POST /voice/:user_id/text - Inject out-of-band text
//! - GET /voice/:user_id/status - Live or final session stats
//! - GET /voice/:user_id/transcript - Finalised utterances
//! - GET /health - Health check

mod handlers;
mod routes;
mod state;

pub use handlers::{ErrorResponse, SendTextRequest, StartSessionResponse, StopSessionResponse};
pub use routes::create_router;
pub use state::AppState;

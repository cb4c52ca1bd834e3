//! HTTP surface of the pipeline: media-server hooks in, annotated playlists
//! and incident clips out.

pub mod accident;
pub mod detect;
pub mod diagnostics;
pub mod error;
pub mod hooks;
pub mod state;

use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

pub use error::{AppError, AppResult};
pub use state::AppState;

/// Assemble the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/hooks/srs/verify", post(hooks::srs_verify))
        .route("/hooks/srs/hls", post(hooks::srs_hls))
        .route("/detect/hls/{*path}", get(detect::detect_hls))
        .route("/accident/hls/{uuid}/index.mp4", get(accident::accident_clip))
        .route("/debug/tasks", get(diagnostics::tasks))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

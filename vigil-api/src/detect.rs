//! Per-stream annotated playlist and TS segment endpoints.

use axum::{
    body::Body,
    extract::{Path, State},
    http::header,
    response::Response,
};

use vigil_core::playlist::PLAYLIST_CONTENT_TYPE;

use crate::error::{AppError, AppResult};
use crate::state::AppState;

/// GET `/detect/hls/<stream key…>/index.m3u8` and
/// GET `/detect/hls/<stream key…>/<ts id>.ts`.
///
/// The stream key is everything before the file name, e.g.
/// `/detect/hls/live/main/index.m3u8` resolves the `live/main` processor.
pub async fn detect_hls(
    State(state): State<AppState>,
    Path(path): Path<String>,
) -> AppResult<Response> {
    if let Some(stream) = path.strip_suffix("/index.m3u8") {
        return serve_playlist(&state, stream);
    }
    if let Some(rest) = path.strip_suffix(".ts") {
        let (stream, ts_id) = rest
            .rsplit_once('/')
            .ok_or_else(|| AppError::bad_request(format!("invalid segment path {path}")))?;
        return serve_ts(&state, stream, ts_id).await;
    }
    Err(AppError::bad_request(format!("invalid detect path {path}")))
}

fn serve_playlist(state: &AppState, stream: &str) -> AppResult<Response> {
    let processor = state
        .registry
        .get(stream)
        .ok_or_else(|| AppError::not_found(format!("no active stream {stream}")))?;

    let playlist = processor.live_playlist();
    tracing::debug!(stream, duration = playlist.duration, "served live playlist");

    Response::builder()
        .header(header::CONTENT_TYPE, playlist.content_type)
        .body(Body::from(playlist.body))
        .map_err(|e| AppError::internal(e.to_string()))
}

async fn serve_ts(state: &AppState, stream: &str, ts_id: &str) -> AppResult<Response> {
    let processor = state
        .registry
        .get(stream)
        .ok_or_else(|| AppError::not_found(format!("no active stream {stream}")))?;

    let ts_path = processor
        .ts_path(ts_id)
        .ok_or_else(|| AppError::bad_request(format!("invalid ts id {ts_id}")))?;

    let data = tokio::fs::read(&ts_path)
        .await
        .map_err(|_| AppError::not_found(format!("no ts file {ts_id}")))?;

    // TODO: switch to video/mp2t once downstream players are re-qualified;
    // the playlist media type is inherited behavior.
    Response::builder()
        .header(header::CONTENT_TYPE, PLAYLIST_CONTENT_TYPE)
        .body(Body::from(data))
        .map_err(|e| AppError::internal(e.to_string()))
}

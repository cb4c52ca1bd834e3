//! Callbacks from the upstream media server.

use std::sync::atomic::Ordering;

use axum::{extract::State, Json};

use vigil_core::models::{
    HlsCallback, StreamCallback, ACTION_ON_HLS, ACTION_ON_PLAY, ACTION_ON_PUBLISH,
    ACTION_ON_UNPUBLISH,
};
use vigil_core::store::{self, STREAM_ACTIVE_HASH};

use crate::error::{ok_response, AppError, AppResult};
use crate::state::AppState;

/// POST `/hooks/srs/verify` — stream lifecycle notifications.
pub async fn srs_verify(
    State(state): State<AppState>,
    Json(msg): Json<StreamCallback>,
) -> AppResult<Json<serde_json::Value>> {
    let key = msg.stream_key();
    match msg.action.as_str() {
        ACTION_ON_PUBLISH => {
            state.inference.stream_started(&key.canonical()).await?;
            store::persist(&*state.store, STREAM_ACTIVE_HASH, &key.canonical(), &msg).await;
            tracing::info!(stream = %key, "stream published");
        }
        ACTION_ON_UNPUBLISH => {
            store::forget(&*state.store, STREAM_ACTIVE_HASH, &key.canonical()).await;
            state.inference.stream_ended(&key.canonical()).await?;
            tracing::info!(stream = %key, "stream unpublished");
        }
        ACTION_ON_PLAY => {
            state.play_counter.fetch_add(1, Ordering::Relaxed);
        }
        // Remaining lifecycle actions are acknowledged without side effects.
        _ => {}
    }

    Ok(ok_response(serde_json::Value::Null))
}

/// POST `/hooks/srs/hls` — one new TS segment is ready on disk.
pub async fn srs_hls(
    State(state): State<AppState>,
    Json(msg): Json<HlsCallback>,
) -> AppResult<Json<serde_json::Value>> {
    if msg.action != ACTION_ON_HLS {
        return Err(AppError::bad_request(format!(
            "invalid action {}",
            msg.action
        )));
    }
    if tokio::fs::metadata(&msg.file).await.is_err() {
        return Err(AppError::bad_request(format!(
            "invalid ts file {}",
            msg.file
        )));
    }

    state
        .intake_tx
        .send(msg)
        .await
        .map_err(|_| AppError::internal("segment intake is not running"))?;

    Ok(ok_response(serde_json::Value::Null))
}

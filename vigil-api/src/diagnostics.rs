//! Runtime diagnostics.

use std::sync::atomic::Ordering;

use axum::{extract::State, Json};

use crate::error::ok_response;
use crate::state::AppState;

/// GET `/debug/tasks` — what the pipeline is running right now: runtime task
/// counters plus the live processor and incident-group indices.
pub async fn tasks(State(state): State<AppState>) -> Json<serde_json::Value> {
    let metrics = tokio::runtime::Handle::current().metrics();

    let mut processors = state.registry.stream_keys();
    processors.sort();
    let mut groups = state.assembler.group_keys();
    groups.sort();

    ok_response(serde_json::json!({
        "workers": metrics.num_workers(),
        "alive_tasks": metrics.num_alive_tasks(),
        "processors": processors,
        "incident_groups": groups,
        "plays": state.play_counter.load(Ordering::Relaxed),
    }))
}

use std::sync::atomic::AtomicU64;
use std::sync::Arc;

use tokio::sync::mpsc;

use vigil_core::client::InferenceClient;
use vigil_core::models::HlsCallback;
use vigil_core::store::SnapshotStore;
use vigil_pipeline::incident::IncidentAssembler;
use vigil_pipeline::registry::ProcessorRegistry;

/// Shared state behind every HTTP handler.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<ProcessorRegistry>,
    pub assembler: Arc<IncidentAssembler>,
    /// Feeds the intake drain; a full channel back-pressures the hook.
    pub intake_tx: mpsc::Sender<HlsCallback>,
    pub inference: InferenceClient,
    pub store: Arc<dyn SnapshotStore>,
    /// `on_play` counter, surfaced through the debug endpoint.
    pub play_counter: Arc<AtomicU64>,
}

impl AppState {
    #[must_use]
    pub fn new(
        registry: Arc<ProcessorRegistry>,
        assembler: Arc<IncidentAssembler>,
        intake_tx: mpsc::Sender<HlsCallback>,
        inference: InferenceClient,
        store: Arc<dyn SnapshotStore>,
    ) -> Self {
        Self {
            registry,
            assembler,
            intake_tx,
            inference,
            store,
            play_counter: Arc::new(AtomicU64::new(0)),
        }
    }
}

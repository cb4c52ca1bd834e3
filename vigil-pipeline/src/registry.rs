//! Per-stream processor registry: load-or-create routing of staged segments,
//! plus the idle reaper that retires processors for streams that went quiet.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use vigil_core::client::InferenceClient;
use vigil_core::error::Result;
use vigil_core::models::StreamKey;
use vigil_core::store::SnapshotStore;

use crate::incident::IncidentSubmission;
use crate::processor::StreamProcessor;
use crate::StagedSegment;

/// How often the reaper scans for idle processors.
const REAP_SCAN_INTERVAL: Duration = Duration::from_secs(60);

pub struct ProcessorRegistry {
    processors: DashMap<String, Arc<StreamProcessor>>,
    workdir: PathBuf,
    inference: InferenceClient,
    assembler_tx: mpsc::Sender<IncidentSubmission>,
    store: Arc<dyn SnapshotStore>,
    cancel: CancellationToken,
}

impl ProcessorRegistry {
    #[must_use]
    pub fn new(
        workdir: PathBuf,
        inference: InferenceClient,
        assembler_tx: mpsc::Sender<IncidentSubmission>,
        store: Arc<dyn SnapshotStore>,
        cancel: CancellationToken,
    ) -> Arc<Self> {
        Arc::new(Self {
            processors: DashMap::new(),
            workdir,
            inference,
            assembler_tx,
            store,
            cancel,
        })
    }

    #[must_use]
    pub fn get(&self, canonical_key: &str) -> Option<Arc<StreamProcessor>> {
        self.processors.get(canonical_key).map(|p| p.clone())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.processors.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.processors.is_empty()
    }

    #[must_use]
    pub fn stream_keys(&self) -> Vec<String> {
        self.processors.iter().map(|e| e.key().clone()).collect()
    }

    /// Look up the processor for a stream, creating and starting it on the
    /// first arrival. The map entry is the single synchronization point:
    /// concurrent first arrivals agree on one winner.
    pub async fn load_or_create(&self, key: &StreamKey) -> Result<Arc<StreamProcessor>> {
        let canonical = key.canonical();

        if let Some(existing) = self.get(&canonical) {
            return Ok(existing);
        }

        // The processor's image directory must exist before its tasks run.
        // Racing first arrivals may both create it; mkdir is idempotent.
        tokio::fs::create_dir_all(self.workdir.join(&canonical)).await?;

        let (processor, fresh) = match self.processors.entry(canonical) {
            Entry::Occupied(entry) => (entry.get().clone(), false),
            Entry::Vacant(entry) => {
                let processor = StreamProcessor::new(
                    key.clone(),
                    self.workdir.clone(),
                    self.inference.clone(),
                    self.assembler_tx.clone(),
                    self.store.clone(),
                    self.cancel.child_token(),
                );
                entry.insert(processor.clone());
                (processor, true)
            }
        };

        if fresh {
            processor.clone().spawn();
        }
        Ok(processor)
    }

    /// The dispatch drain: route every staged segment into its processor.
    pub async fn run_dispatch(self: Arc<Self>, mut rx: mpsc::Receiver<StagedSegment>) {
        loop {
            let staged = tokio::select! {
                () = self.cancel.cancelled() => break,
                staged = rx.recv() => match staged {
                    Some(staged) => staged,
                    None => break,
                },
            };

            match self.load_or_create(&staged.stream_key).await {
                Ok(processor) => processor.submit_staged(staged).await,
                Err(e) => tracing::warn!(
                    stream = %staged.stream_key,
                    "dropping segment, processor creation failed: {e}"
                ),
            }
        }
        tracing::debug!("dispatch drain stopped");
    }

    /// Retire processors whose streams have gone quiet. A retired stream
    /// simply gets a fresh processor on its next segment.
    pub async fn run_reaper(self: Arc<Self>, idle_ttl: Duration) {
        if idle_ttl.is_zero() {
            return;
        }
        let scan = REAP_SCAN_INTERVAL.min(idle_ttl);
        loop {
            tokio::select! {
                () = self.cancel.cancelled() => break,
                () = tokio::time::sleep(scan) => {}
            }
            if self.cancel.is_cancelled() {
                break;
            }
            self.reap_idle(idle_ttl);
        }
    }

    fn reap_idle(&self, idle_ttl: Duration) {
        let idle: Vec<String> = self
            .processors
            .iter()
            .filter(|entry| entry.value().idle_for() > idle_ttl)
            .map(|entry| entry.key().clone())
            .collect();

        for key in idle {
            if let Some((_, processor)) = self.processors.remove(&key) {
                processor.shutdown();
                tracing::info!(stream = %key, "retired idle processor");
            }
        }
    }
}

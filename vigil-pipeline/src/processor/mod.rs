//! Per-stream processing: each published stream gets one `StreamProcessor`
//! owning the Live → Detect → Finish queue machine and the six tasks that
//! drive it.

mod queue;
mod segment;

pub use queue::ProcessQueue;
pub use segment::{ImageFile, ProcessSegment};

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use base64::Engine;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::{mpsc, Notify};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use vigil_core::client::InferenceClient;
use vigil_core::error::Result;
use vigil_core::media;
use vigil_core::models::{HlsCallback, StreamKey};
use vigil_core::playlist::{build_live_playlist, Playlist};
use vigil_core::store::{self, SnapshotStore, PROCESS_TASK_HASH};

use crate::incident::IncidentSubmission;
use crate::intake;
use crate::{StagedSegment, CHANNEL_CAPACITY};

/// Rolling window served by the live playlist; older Finish entries are
/// evicted, which also bounds the per-stream disk footprint.
pub const MAX_FINISH_SEGMENTS: usize = 9;

/// Live stalls toward Detect once this many segments await inference.
const DETECT_BACKLOG_LIMIT: usize = MAX_FINISH_SEGMENTS + 1;

const DRIVE_TICK: Duration = Duration::from_millis(200);
const DRIVE_BACKOFF: Duration = Duration::from_secs(10);
const FINISH_IDLE: Duration = Duration::from_secs(1);

/// Queue state guarded by the processor's single mutex. A segment lives in
/// exactly one queue; stage moves dequeue and enqueue under one lock.
#[derive(Debug, Default, Serialize)]
struct ProcessorState {
    live: ProcessQueue,
    detect: ProcessQueue,
    /// Reserved stage, kept in the snapshot schema; nothing feeds it.
    fix: ProcessQueue,
    finish: ProcessQueue,
    /// Reserved: running context handed to the inference service.
    last_inference: String,
}

#[derive(Serialize)]
struct ProcessorSnapshot<'a> {
    uuid: &'a str,
    stream: String,
    #[serde(flatten)]
    state: &'a ProcessorState,
}

struct ProcessorChannels {
    msgs_rx: mpsc::Receiver<HlsCallback>,
    tsfiles_rx: mpsc::Receiver<StagedSegment>,
}

pub struct StreamProcessor {
    uuid: String,
    stream_key: StreamKey,
    /// Staging root; TS copies live here.
    workdir: PathBuf,
    /// `<workdir>/<stream key>/`, owned exclusively by this processor.
    dir: PathBuf,

    state: Mutex<ProcessorState>,
    persist_signal: Notify,
    last_segment_at: Mutex<Instant>,

    msgs_tx: mpsc::Sender<HlsCallback>,
    tsfiles_tx: mpsc::Sender<StagedSegment>,
    channels: Mutex<Option<ProcessorChannels>>,

    inference: InferenceClient,
    assembler_tx: mpsc::Sender<IncidentSubmission>,
    store: Arc<dyn SnapshotStore>,
    cancel: CancellationToken,
}

impl StreamProcessor {
    pub fn new(
        stream_key: StreamKey,
        workdir: PathBuf,
        inference: InferenceClient,
        assembler_tx: mpsc::Sender<IncidentSubmission>,
        store: Arc<dyn SnapshotStore>,
        cancel: CancellationToken,
    ) -> Arc<Self> {
        let (msgs_tx, msgs_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (tsfiles_tx, tsfiles_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let dir = workdir.join(stream_key.canonical());

        Arc::new(Self {
            uuid: Uuid::new_v4().to_string(),
            stream_key,
            workdir,
            dir,
            state: Mutex::new(ProcessorState::default()),
            persist_signal: Notify::new(),
            last_segment_at: Mutex::new(Instant::now()),
            msgs_tx,
            tsfiles_tx,
            channels: Mutex::new(Some(ProcessorChannels { msgs_rx, tsfiles_rx })),
            inference,
            assembler_tx,
            store,
            cancel,
        })
    }

    #[must_use]
    pub fn uuid(&self) -> &str {
        &self.uuid
    }

    #[must_use]
    pub fn stream_key(&self) -> &StreamKey {
        &self.stream_key
    }

    #[must_use]
    pub fn idle_for(&self) -> Duration {
        self.last_segment_at.lock().elapsed()
    }

    /// (live, detect, finish) depths, for diagnostics and tests.
    #[must_use]
    pub fn queue_depths(&self) -> (usize, usize, usize) {
        let state = self.state.lock();
        (
            state.live.count(),
            state.detect.count(),
            state.finish.count(),
        )
    }

    /// Stop every task belonging to this processor.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Start the processor's six tasks. Called once by the registry right
    /// after creation.
    pub fn spawn(self: Arc<Self>) {
        let Some(channels) = self.channels.lock().take() else {
            tracing::warn!(stream = %self.stream_key, "processor tasks already running");
            return;
        };

        tokio::spawn(self.clone().run_persistence());
        tokio::spawn(self.clone().run_copier(channels.msgs_rx));
        tokio::spawn(self.clone().run_enqueue(channels.tsfiles_rx));
        tokio::spawn(self.clone().run_drive_live());
        tokio::spawn(self.clone().run_drive_detect());
        tokio::spawn(self.clone().run_drive_finish());

        tracing::info!(stream = %self.stream_key, uuid = %self.uuid, "processor started");
    }

    /// Hand over a segment that intake already staged.
    pub async fn submit_staged(&self, staged: StagedSegment) {
        let _ = self.tsfiles_tx.send(staged).await;
    }

    /// Hand over a raw callback; the processor's copier stages it itself.
    pub async fn submit_callback(&self, msg: HlsCallback) {
        let _ = self.msgs_tx.send(msg).await;
    }

    /// Render the live annotated playlist from the current Finish window.
    #[must_use]
    pub fn live_playlist(&self) -> Playlist {
        let (segments, metadata): (Vec<_>, Vec<_>) = {
            let state = self.state.lock();
            state
                .finish
                .snapshot()
                .iter()
                .map(|s| (s.ts.clone(), s.detections_json()))
                .unzip()
        };
        let prefix = format!("/detect/hls/{}/", self.stream_key.canonical());
        build_live_playlist(&segments, &prefix, &metadata)
    }

    /// Resolve a TS id to its staged file, rejecting path-shaped ids.
    #[must_use]
    pub fn ts_path(&self, ts_id: &str) -> Option<PathBuf> {
        if ts_id.is_empty() || ts_id.contains(['/', '\\']) || ts_id.contains("..") {
            return None;
        }
        Some(self.workdir.join(format!("{ts_id}.ts")))
    }

    fn notify_persist(&self) {
        self.persist_signal.notify_one();
    }

    async fn save_snapshot(&self) {
        let value = {
            let state = self.state.lock();
            let snapshot = ProcessorSnapshot {
                uuid: &self.uuid,
                stream: self.stream_key.canonical(),
                state: &state,
            };
            serde_json::to_value(&snapshot)
        };
        match value {
            Ok(value) => store::persist(&*self.store, PROCESS_TASK_HASH, &self.uuid, &value).await,
            Err(e) => tracing::warn!(uuid = %self.uuid, "failed to serialize processor: {e}"),
        }
    }

    async fn run_persistence(self: Arc<Self>) {
        loop {
            tokio::select! {
                () = self.cancel.cancelled() => break,
                () = self.persist_signal.notified() => self.save_snapshot().await,
            }
        }
    }

    /// Stage raw callbacks addressed directly to this processor and feed the
    /// staged descriptors into the enqueue channel.
    async fn run_copier(self: Arc<Self>, mut rx: mpsc::Receiver<HlsCallback>) {
        loop {
            let msg = tokio::select! {
                () = self.cancel.cancelled() => break,
                msg = rx.recv() => match msg {
                    Some(msg) => msg,
                    None => break,
                },
            };

            match intake::stage_segment(&self.workdir, &msg, &self.cancel).await {
                Ok(ts) => {
                    let staged = StagedSegment {
                        stream_key: msg.stream_key(),
                        callback: msg,
                        ts,
                    };
                    if self.tsfiles_tx.send(staged).await.is_err() {
                        break;
                    }
                }
                Err(e) => tracing::warn!(
                    stream = %self.stream_key,
                    seq_no = msg.seq_no,
                    "dropping segment, staging failed: {e}"
                ),
            }
        }
    }

    async fn run_enqueue(self: Arc<Self>, mut rx: mpsc::Receiver<StagedSegment>) {
        loop {
            let staged = tokio::select! {
                () = self.cancel.cancelled() => break,
                staged = rx.recv() => match staged {
                    Some(staged) => staged,
                    None => break,
                },
            };

            self.state.lock().live.enqueue(ProcessSegment::new(staged.ts));
            *self.last_segment_at.lock() = Instant::now();
            self.notify_persist();
        }
    }

    async fn run_drive_live(self: Arc<Self>) {
        while !self.cancel.is_cancelled() {
            let delay = match self.drive_live().await {
                Ok(()) => DRIVE_TICK,
                Err(e) => {
                    tracing::warn!(stream = %self.stream_key, "live drive failed: {e}");
                    DRIVE_BACKOFF
                }
            };
            tokio::select! {
                () = self.cancel.cancelled() => break,
                () = tokio::time::sleep(delay) => {}
            }
        }
    }

    async fn run_drive_detect(self: Arc<Self>) {
        while !self.cancel.is_cancelled() {
            let delay = match self.drive_detect().await {
                Ok(()) => DRIVE_TICK,
                Err(e) => {
                    tracing::warn!(stream = %self.stream_key, "detect drive failed: {e}");
                    DRIVE_BACKOFF
                }
            };
            tokio::select! {
                () = self.cancel.cancelled() => break,
                () = tokio::time::sleep(delay) => {}
            }
        }
    }

    async fn run_drive_finish(self: Arc<Self>) {
        while !self.cancel.is_cancelled() {
            let delay = match self.drive_finish().await {
                Ok(()) => DRIVE_TICK,
                Err(e) => {
                    tracing::warn!(stream = %self.stream_key, "finish drive failed: {e}");
                    DRIVE_BACKOFF
                }
            };
            tokio::select! {
                () = self.cancel.cancelled() => break,
                () = tokio::time::sleep(delay) => {}
            }
        }
    }

    /// Live stage: extract one still from the head segment and move it into
    /// Detect. Stalls while the Detect backlog is full.
    async fn drive_live(&self) -> Result<()> {
        let Some(head) = self.state.lock().live.first().cloned() else {
            return Ok(());
        };

        // Source vanished between callback and processing: drop it.
        if tokio::fs::metadata(&head.ts.source_path).await.is_err() {
            let removed = self.state.lock().live.dequeue(&head.ts.ts_id);
            if let Some(segment) = removed {
                segment.dispose().await;
            }
            tracing::warn!(stream = %self.stream_key, ts_id = %head.ts.ts_id, "dropped vanished live segment");
            self.notify_persist();
            return Ok(());
        }

        if self.state.lock().detect.count() >= DETECT_BACKLOG_LIMIT {
            return Ok(());
        }

        let image_id = format!("{}-image-{}", head.ts.seq_no, Uuid::new_v4());
        let image_path = self.dir.join(format!("{image_id}.jpg"));
        let started = Instant::now();

        media::extract_frame(&head.ts.source_path, &image_path, &self.cancel).await?;
        let size_bytes = tokio::fs::metadata(&image_path).await?.len();

        {
            let mut state = self.state.lock();
            if let Some(mut segment) = state.live.dequeue(&head.ts.ts_id) {
                segment.image = Some(ImageFile {
                    image_id,
                    path: image_path,
                    size_bytes,
                });
                segment.extract_cost_ms = started.elapsed().as_millis() as u64;
                state.detect.enqueue(segment);
            }
        }

        self.notify_persist();
        Ok(())
    }

    /// Detect stage: run inference on the head image, probe the container
    /// start time, move into Finish, and feed recognized detections to the
    /// incident assembler.
    async fn drive_detect(&self) -> Result<()> {
        let Some(head) = self.state.lock().detect.first().cloned() else {
            return Ok(());
        };
        let Some(image) = head.image.clone() else {
            // A detect-stage entry always carries an image; treat a bare one
            // like a vanished file and drop it.
            let removed = self.state.lock().detect.dequeue(&head.ts.ts_id);
            if let Some(segment) = removed {
                segment.dispose().await;
            }
            return Ok(());
        };

        if tokio::fs::metadata(&image.path).await.is_err() {
            let removed = self.state.lock().detect.dequeue(&head.ts.ts_id);
            if let Some(segment) = removed {
                segment.dispose().await;
            }
            tracing::warn!(stream = %self.stream_key, ts_id = %head.ts.ts_id, "dropped segment with vanished image");
            self.notify_persist();
            return Ok(());
        }

        let started = Instant::now();
        let image_data = tokio::fs::read(&image.path).await?;
        let encoded = base64::engine::general_purpose::STANDARD.encode(image_data);
        let detections = self.inference.detect(&encoded).await?;
        let stream_start = media::probe_start_time(&head.ts.source_path, &self.cancel).await?;

        let moved = {
            let mut state = self.state.lock();
            state.detect.dequeue(&head.ts.ts_id).map(|mut segment| {
                segment.detections = detections;
                segment.stream_start_secs = stream_start;
                segment.detect_cost_ms = started.elapsed().as_millis() as u64;
                state.finish.enqueue(segment.clone());
                segment
            })
        };
        self.notify_persist();

        if let Some(segment) = moved {
            for detection in &segment.detections {
                if vigil_core::models::is_recognized_category(detection.category_id) {
                    let submission = IncidentSubmission {
                        detection: detection.clone(),
                        ts: segment.ts.clone(),
                        stream_key: self.stream_key.clone(),
                    };
                    if self.assembler_tx.send(submission).await.is_err() {
                        tracing::warn!(stream = %self.stream_key, "assembler channel closed");
                    }
                }
            }
        }

        Ok(())
    }

    /// Finish stage: evict and dispose the oldest segment once the rolling
    /// window exceeds its cap.
    async fn drive_finish(&self) -> Result<()> {
        if self.state.lock().finish.count() <= MAX_FINISH_SEGMENTS {
            tokio::select! {
                () = self.cancel.cancelled() => {}
                () = tokio::time::sleep(FINISH_IDLE) => {}
            }
            return Ok(());
        }

        let evicted = {
            let mut state = self.state.lock();
            let oldest = state.finish.first().map(|s| s.ts.ts_id.clone());
            oldest.and_then(|ts_id| state.finish.dequeue(&ts_id))
        };

        if let Some(segment) = evicted {
            tracing::debug!(stream = %self.stream_key, ts_id = %segment.ts.ts_id, "evicting finished segment");
            segment.dispose().await;
            self.notify_persist();
        }
        Ok(())
    }
}

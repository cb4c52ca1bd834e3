use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use vigil_core::client::IncidentClient;
use vigil_core::error::Result;
use vigil_core::media;
use vigil_core::models::{StreamKey, VodArtifact};
use vigil_core::playlist::build_vod_playlist;
use vigil_core::store::{self, SnapshotStore, INCIDENT_ARTIFACT_HASH, INCIDENT_WORKING_HASH};

use super::{AssemblerTiming, IncidentAssembler, IncidentSegment};

const TICK_BACKOFF: Duration = Duration::from_secs(10);

/// Mutable group state under the group's single mutex. The mutex is held
/// across a whole append (segment push plus `update_time` refresh) so the
/// expiry check never observes one without the other.
struct GroupState {
    pending: Vec<IncidentSegment>,
    artifact: VodArtifact,
    update_time: DateTime<Utc>,
    expired: bool,
    incident_id: Option<i64>,
}

#[derive(Serialize)]
struct GroupSnapshot<'a> {
    uuid: &'a str,
    #[serde(rename = "m3u8")]
    key: &'a str,
    stream: &'a str,
    category: i32,
    nn: usize,
    update: DateTime<Utc>,
    expired: bool,
    #[serde(rename = "accidentId")]
    incident_id: i64,
    segments: &'a [IncidentSegment],
}

/// One active incident: the segments collected for a `(stream, category)`
/// pair while detections of that category keep arriving. Goes idle, closes
/// into a packaged clip, and is gone.
pub struct IncidentGroup {
    uuid: String,
    /// `stream/categoryId`, the index key in the active-group map.
    key: String,
    stream_key: StreamKey,
    category_id: i32,
    category: &'static str,
    /// `<accident root>/<uuid>/`, owned exclusively by this group.
    dir: PathBuf,
    created_at: Instant,

    state: Mutex<GroupState>,
    finished: AtomicBool,

    client: IncidentClient,
    store: Arc<dyn SnapshotStore>,
    assembler: Weak<IncidentAssembler>,
    cancel: CancellationToken,
    timing: AssemblerTiming,
}

impl IncidentGroup {
    #[allow(clippy::too_many_arguments)]
    pub(super) fn new(
        key: String,
        stream_key: StreamKey,
        category_id: i32,
        category: &'static str,
        root: PathBuf,
        client: IncidentClient,
        store: Arc<dyn SnapshotStore>,
        assembler: Weak<IncidentAssembler>,
        cancel: CancellationToken,
        timing: AssemblerTiming,
    ) -> Arc<Self> {
        let uuid = Uuid::new_v4().to_string();
        let dir = root.join(&uuid);
        let mut artifact = VodArtifact::new(uuid.clone(), key.clone());
        artifact.vhost = stream_key.vhost.clone();
        artifact.app = stream_key.app.clone();
        artifact.stream = stream_key.stream.clone();

        Arc::new(Self {
            uuid,
            key,
            stream_key,
            category_id,
            category,
            dir,
            created_at: Instant::now(),
            state: Mutex::new(GroupState {
                pending: Vec::new(),
                artifact,
                update_time: Utc::now(),
                expired: false,
                incident_id: None,
            }),
            finished: AtomicBool::new(false),
            client,
            store,
            assembler,
            cancel,
            timing,
        })
    }

    #[must_use]
    pub fn uuid(&self) -> &str {
        &self.uuid
    }

    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    #[must_use]
    pub fn incident_id(&self) -> Option<i64> {
        self.state.lock().incident_id
    }

    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.state.lock().pending.len()
    }

    #[must_use]
    pub fn adopted_count(&self) -> usize {
        self.state.lock().artifact.files.len()
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    /// Force expiry, as an operator would.
    pub fn expire_now(&self) {
        self.state.lock().expired = true;
    }

    /// First-sight setup: persist the fresh artifact and try to open the
    /// incident with the external service. An open failure is transient;
    /// the serve loop keeps retrying within its deadline.
    pub(super) async fn initialize(&self) {
        self.save_artifact().await;
        self.try_open().await;
    }

    async fn try_open(&self) {
        match self
            .client
            .open(self.stream_key.stream_name(), self.category)
            .await
        {
            Ok(incident_id) => {
                self.state.lock().incident_id = Some(incident_id);
                tracing::info!(key = %self.key, incident_id, "incident opened");
                self.save_snapshot().await;
            }
            Err(e) => {
                tracing::warn!(key = %self.key, "incident open failed: {e}");
            }
        }
    }

    /// Append one staged segment. The group mutex covers both the push and
    /// the `update_time` refresh.
    pub(super) async fn append(&self, segment: IncidentSegment) {
        {
            let mut state = self.state.lock();
            state.pending.push(segment);
            state.update_time = Utc::now();
        }
        self.save_snapshot().await;
    }

    #[must_use]
    pub fn expired(&self) -> bool {
        let state = self.state.lock();
        if state.expired {
            return true;
        }
        let idle = chrono::Duration::from_std(self.timing.idle_timeout)
            .unwrap_or_else(|_| chrono::Duration::seconds(30));
        state.update_time + idle < Utc::now()
    }

    /// The group serve loop: adopt pending segments, then close once the
    /// group is both drained and expired.
    pub(super) async fn run(self: Arc<Self>) {
        loop {
            tokio::select! {
                () = self.cancel.cancelled() => break,
                () = tokio::time::sleep(self.timing.serve_interval) => {}
            }

            match self.tick().await {
                Ok(true) => break,
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(key = %self.key, "group serve failed: {e}");
                    tokio::select! {
                        () = self.cancel.cancelled() => break,
                        () = tokio::time::sleep(TICK_BACKOFF) => {}
                    }
                }
            }
        }
        tracing::debug!(key = %self.key, "group serve loop stopped");
    }

    /// One serve iteration. Returns `Ok(true)` once the group has closed.
    async fn tick(&self) -> Result<bool> {
        if self.incident_id().is_none()
            && self.created_at.elapsed() <= self.timing.open_retry_deadline
        {
            self.try_open().await;
        }

        let pending = self.state.lock().pending.clone();
        for segment in &pending {
            if let Err(e) = self.adopt(segment).await {
                tracing::warn!(key = %self.key, ts_id = %segment.ts.ts_id, "failed to adopt segment: {e}");
            }
        }
        if !pending.is_empty() {
            self.save_snapshot().await;
        }

        if !self.state.lock().pending.is_empty() {
            return Ok(false);
        }
        if !self.expired() {
            return Ok(false);
        }

        self.finish().await?;
        Ok(true)
    }

    /// Move one pending segment into the group directory and record it on
    /// the artifact. The pending entry is consumed either way; a segment
    /// that cannot be adopted is not retried.
    async fn adopt(&self, segment: &IncidentSegment) -> Result<()> {
        let outcome = self.adopt_file(segment).await;
        if outcome.is_err() {
            self.state
                .lock()
                .pending
                .retain(|p| p.ts.ts_id != segment.ts.ts_id);
        }
        outcome
    }

    async fn adopt_file(&self, segment: &IncidentSegment) -> Result<()> {
        tokio::fs::metadata(&segment.ts.source_path).await?;
        tokio::fs::create_dir_all(&self.dir).await?;

        let stored = self.dir.join(segment.ts.file_name());
        tokio::fs::rename(&segment.ts.source_path, &stored).await?;

        {
            let mut state = self.state.lock();
            state.pending.retain(|p| p.ts.ts_id != segment.ts.ts_id);

            let mut adopted = segment.ts.clone();
            adopted.source_path = stored.clone();
            adopted.stored_key = Some(stored);

            state.artifact.vhost = segment.stream_key.vhost.clone();
            state.artifact.app = segment.stream_key.app.clone();
            state.artifact.stream = segment.stream_key.stream.clone();
            state.artifact.files.push(adopted);
            state.artifact.file_count = state.artifact.files.len();
            state.artifact.update_time = Utc::now();
        }

        self.save_artifact().await;
        Ok(())
    }

    /// Close the group: render the VoD playlist, package the clip, drop out
    /// of the active index, notify the incident service, and settle the
    /// artifact. Removal from the index happens before any external call, so
    /// a repeated trigger cannot start a second close.
    async fn finish(&self) -> Result<()> {
        let files = self.state.lock().artifact.files.clone();
        let playlist = build_vod_playlist(&files);

        tokio::fs::create_dir_all(&self.dir).await?;
        let m3u8_path = self.dir.join("index.m3u8");
        tokio::fs::write(&m3u8_path, &playlist.body).await?;

        let mp4_path = self.dir.join("index.mp4");
        media::remux_to_mp4(&m3u8_path, &mp4_path, &self.cancel).await?;

        if let Some(assembler) = self.assembler.upgrade() {
            assembler.remove_group(&self.key);
        }

        let incident_id = self.incident_id().unwrap_or(0);
        let video_url = mp4_path.to_string_lossy();
        if let Err(e) = self.client.close(incident_id, &video_url).await {
            tracing::warn!(key = %self.key, incident_id, "incident close failed: {e}");
        }

        {
            let mut state = self.state.lock();
            let now = Utc::now();
            state.artifact.processing = false;
            state.artifact.update_time = now;
            state.artifact.done_time = Some(now);
        }
        self.save_artifact().await;
        store::forget(&*self.store, INCIDENT_WORKING_HASH, &self.key).await;

        // Segments that raced in while the remux was running have nowhere to
        // go; drop them.
        let stragglers = std::mem::take(&mut self.state.lock().pending);
        for straggler in stragglers {
            straggler.ts.dispose().await;
        }

        self.finished.store(true, Ordering::Release);
        tracing::info!(key = %self.key, uuid = %self.uuid, clip = %video_url, "incident group closed");
        Ok(())
    }

    async fn save_snapshot(&self) {
        let value = {
            let state = self.state.lock();
            let snapshot = GroupSnapshot {
                uuid: &self.uuid,
                key: &self.key,
                stream: self.stream_key.stream_name(),
                category: self.category_id,
                nn: state.pending.len(),
                update: state.update_time,
                expired: state.expired,
                incident_id: state.incident_id.unwrap_or(0),
                segments: &state.pending,
            };
            serde_json::to_value(&snapshot)
        };
        match value {
            Ok(value) => {
                store::persist(&*self.store, INCIDENT_WORKING_HASH, &self.key, &value).await;
            }
            Err(e) => tracing::warn!(key = %self.key, "failed to serialize group: {e}"),
        }
    }

    async fn save_artifact(&self) {
        let value = {
            let state = self.state.lock();
            serde_json::to_value(&state.artifact)
        };
        match value {
            Ok(value) => {
                store::persist(&*self.store, INCIDENT_ARTIFACT_HASH, &self.uuid, &value).await;
            }
            Err(e) => tracing::warn!(key = %self.key, "failed to serialize artifact: {e}"),
        }
    }
}

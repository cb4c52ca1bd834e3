//! Incident assembly: recognized detections pull their segments into
//! per-(stream, category) groups, which expire into packaged VoD clips.

mod group;

pub use group::IncidentGroup;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use vigil_core::client::IncidentClient;
use vigil_core::error::{Error, Result};
use vigil_core::media;
use vigil_core::models::{category_name, Detection, StreamKey, TsSegment};
use vigil_core::store::SnapshotStore;

use crate::CHANNEL_CAPACITY;

/// A recognized detection handed over by a per-stream processor, still
/// pointing at the processor's copy of the segment.
#[derive(Debug, Clone)]
pub struct IncidentSubmission {
    pub detection: Detection,
    pub ts: TsSegment,
    pub stream_key: StreamKey,
}

/// A submission after the assembler staged its own copy of the segment. The
/// processor will eventually dispose its copy; this one is ours.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncidentSegment {
    pub detection: Detection,
    pub ts: TsSegment,
    pub stream_key: StreamKey,
}

/// Group timing knobs; tests shrink these.
#[derive(Debug, Clone, Copy)]
pub struct AssemblerTiming {
    /// Group serve-loop tick.
    pub serve_interval: Duration,
    /// Segment silence after which a group expires.
    pub idle_timeout: Duration,
    /// How long a group keeps retrying the open call before giving up and
    /// closing with id 0.
    pub open_retry_deadline: Duration,
}

impl Default for AssemblerTiming {
    fn default() -> Self {
        Self {
            serve_interval: Duration::from_millis(300),
            idle_timeout: Duration::from_secs(30),
            open_retry_deadline: Duration::from_secs(60),
        }
    }
}

struct AssemblerChannels {
    msgs_rx: mpsc::Receiver<IncidentSubmission>,
    tsfiles_rx: mpsc::Receiver<IncidentSegment>,
}

pub struct IncidentAssembler {
    root: PathBuf,
    groups: DashMap<String, Arc<IncidentGroup>>,
    client: IncidentClient,
    store: Arc<dyn SnapshotStore>,
    cancel: CancellationToken,
    timing: AssemblerTiming,

    msgs_tx: mpsc::Sender<IncidentSubmission>,
    tsfiles_tx: mpsc::Sender<IncidentSegment>,
    channels: Mutex<Option<AssemblerChannels>>,
}

impl IncidentAssembler {
    #[must_use]
    pub fn new(
        root: PathBuf,
        client: IncidentClient,
        store: Arc<dyn SnapshotStore>,
        cancel: CancellationToken,
    ) -> Arc<Self> {
        Self::with_timing(root, client, store, cancel, AssemblerTiming::default())
    }

    #[must_use]
    pub fn with_timing(
        root: PathBuf,
        client: IncidentClient,
        store: Arc<dyn SnapshotStore>,
        cancel: CancellationToken,
        timing: AssemblerTiming,
    ) -> Arc<Self> {
        let (msgs_tx, msgs_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (tsfiles_tx, tsfiles_rx) = mpsc::channel(CHANNEL_CAPACITY);
        Arc::new(Self {
            root,
            groups: DashMap::new(),
            client,
            store,
            cancel,
            timing,
            msgs_tx,
            tsfiles_tx,
            channels: Mutex::new(Some(AssemblerChannels { msgs_rx, tsfiles_rx })),
        })
    }

    /// The sender processors use to submit recognized detections.
    #[must_use]
    pub fn submission_sender(&self) -> mpsc::Sender<IncidentSubmission> {
        self.msgs_tx.clone()
    }

    #[must_use]
    pub fn group(&self, key: &str) -> Option<Arc<IncidentGroup>> {
        self.groups.get(key).map(|g| g.clone())
    }

    #[must_use]
    pub fn group_keys(&self) -> Vec<String> {
        self.groups.iter().map(|e| e.key().clone()).collect()
    }

    /// Resolve a group uuid to its packaged clip, rejecting path-shaped ids.
    #[must_use]
    pub fn clip_path(&self, uuid: &str) -> Option<PathBuf> {
        if uuid.is_empty() || uuid.contains(['/', '\\']) || uuid.contains("..") {
            return None;
        }
        Some(self.root.join(uuid).join("index.mp4"))
    }

    pub(crate) fn remove_group(&self, key: &str) {
        self.groups.remove(key);
    }

    /// Start the staging and routing drains. Called once at bootstrap.
    pub fn spawn(self: Arc<Self>) {
        let Some(channels) = self.channels.lock().take() else {
            tracing::warn!("assembler drains already running");
            return;
        };
        tokio::spawn(self.clone().run_staging(channels.msgs_rx));
        tokio::spawn(self.clone().run_routing(channels.tsfiles_rx));
    }

    /// Stage the assembler's own copy of a submitted segment under the
    /// incident root.
    async fn stage(&self, submission: IncidentSubmission) -> Result<IncidentSegment> {
        let ts_id = Uuid::new_v4().to_string();
        let target = self.root.join(format!("{ts_id}.ts"));
        media::copy_file(&submission.ts.source_path, &target, &self.cancel).await?;
        let meta = tokio::fs::metadata(&target).await?;

        Ok(IncidentSegment {
            detection: submission.detection,
            ts: TsSegment {
                ts_id,
                source_path: target,
                seq_no: submission.ts.seq_no,
                duration: submission.ts.duration,
                size_bytes: meta.len(),
                origin_url: submission.ts.origin_url.clone(),
                stored_key: None,
            },
            stream_key: submission.stream_key,
        })
    }

    async fn run_staging(self: Arc<Self>, mut rx: mpsc::Receiver<IncidentSubmission>) {
        loop {
            let submission = tokio::select! {
                () = self.cancel.cancelled() => break,
                submission = rx.recv() => match submission {
                    Some(submission) => submission,
                    None => break,
                },
            };

            match self.stage(submission).await {
                Ok(segment) => {
                    if self.tsfiles_tx.send(segment).await.is_err() {
                        break;
                    }
                }
                Err(e) => tracing::warn!("dropping incident segment, staging failed: {e}"),
            }
        }
        tracing::debug!("assembler staging drain stopped");
    }

    async fn run_routing(self: Arc<Self>, mut rx: mpsc::Receiver<IncidentSegment>) {
        loop {
            let segment = tokio::select! {
                () = self.cancel.cancelled() => break,
                segment = rx.recv() => match segment {
                    Some(segment) => segment,
                    None => break,
                },
            };

            if let Err(e) = self.clone().route(segment).await {
                tracing::warn!("failed to route incident segment: {e}");
            }
        }
        tracing::debug!("assembler routing drain stopped");
    }

    /// Route one staged segment into its `(stream, category)` group,
    /// creating and starting the group on first sight. The map entry is the
    /// single synchronization point, so at most one group per key is active.
    async fn route(self: Arc<Self>, segment: IncidentSegment) -> Result<()> {
        let Some(category) = category_name(segment.detection.category_id) else {
            segment.ts.dispose().await;
            return Err(Error::InvalidInput(format!(
                "unknown category {}",
                segment.detection.category_id
            )));
        };

        let key = format!(
            "{}/{}",
            segment.stream_key.stream_name(),
            segment.detection.category_id
        );

        let (group, fresh) = match self.groups.entry(key.clone()) {
            Entry::Occupied(entry) => (entry.get().clone(), false),
            Entry::Vacant(entry) => {
                let group = IncidentGroup::new(
                    key,
                    segment.stream_key.clone(),
                    segment.detection.category_id,
                    category,
                    self.root.clone(),
                    self.client.clone(),
                    self.store.clone(),
                    Arc::downgrade(&self),
                    self.cancel.child_token(),
                    self.timing,
                );
                entry.insert(group.clone());
                (group, true)
            }
        };

        if fresh {
            group.initialize().await;
            tokio::spawn(group.clone().run());
        }

        group.append(segment).await;
        Ok(())
    }
}

//! Segment intake: the single consumer that stages every announced TS file
//! into the working directory before anything downstream touches it.

use std::path::{Path, PathBuf};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use vigil_core::error::{Error, Result};
use vigil_core::media;
use vigil_core::models::HlsCallback;
use vigil_core::models::TsSegment;

use crate::{StagedSegment, CHANNEL_CAPACITY};

/// Mint the staged segment id for a callback: the upstream sequence number
/// plus a fresh uuid, so replayed callbacks never collide.
fn mint_ts_id(seq_no: u64) -> String {
    format!("{seq_no}-org-{}", Uuid::new_v4())
}

/// Stage one announced segment: copy the source into `workdir` (the origin
/// file is never moved or mutated), stat the copy, and build the descriptor.
pub async fn stage_segment(
    workdir: &Path,
    msg: &HlsCallback,
    cancel: &CancellationToken,
) -> Result<TsSegment> {
    let source = Path::new(&msg.file);
    if tokio::fs::metadata(source).await.is_err() {
        return Err(Error::InvalidInput(format!(
            "segment file {} does not exist",
            msg.file
        )));
    }

    let ts_id = mint_ts_id(msg.seq_no);
    let target = workdir.join(format!("{ts_id}.ts"));
    media::copy_file(source, &target, cancel).await?;

    let meta = tokio::fs::metadata(&target).await?;

    Ok(TsSegment {
        ts_id,
        source_path: target,
        seq_no: msg.seq_no,
        duration: msg.duration,
        size_bytes: meta.len(),
        origin_url: msg.url.clone(),
        stored_key: None,
    })
}

/// The intake drain. Owns the bounded callback channel; back-pressure on a
/// full channel is applied to the HTTP handler feeding it.
pub struct IntakeWorker {
    workdir: PathBuf,
    staged_tx: mpsc::Sender<StagedSegment>,
}

impl IntakeWorker {
    #[must_use]
    pub fn new(workdir: PathBuf, staged_tx: mpsc::Sender<StagedSegment>) -> Self {
        Self { workdir, staged_tx }
    }

    #[must_use]
    pub fn channel() -> (mpsc::Sender<HlsCallback>, mpsc::Receiver<HlsCallback>) {
        mpsc::channel(CHANNEL_CAPACITY)
    }

    /// Drain callbacks until cancelled. Staging failures are transient: the
    /// segment is dropped with a warning and the next one carries on.
    pub async fn run(self, mut rx: mpsc::Receiver<HlsCallback>, cancel: CancellationToken) {
        loop {
            let msg = tokio::select! {
                () = cancel.cancelled() => break,
                msg = rx.recv() => match msg {
                    Some(msg) => msg,
                    None => break,
                },
            };

            match stage_segment(&self.workdir, &msg, &cancel).await {
                Ok(ts) => {
                    let staged = StagedSegment {
                        stream_key: msg.stream_key(),
                        callback: msg,
                        ts,
                    };
                    if self.staged_tx.send(staged).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        stream = %msg.stream_key(),
                        seq_no = msg.seq_no,
                        "dropping segment, staging failed: {e}"
                    );
                }
            }
        }
        tracing::debug!("intake drain stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn callback(dir: &Path, seq_no: u64) -> HlsCallback {
        HlsCallback {
            action: "on_hls".to_string(),
            app: "live".to_string(),
            stream: "main".to_string(),
            duration: 4.0,
            file: dir.join(format!("{seq_no}.ts")).to_string_lossy().into_owned(),
            url: format!("live/main-{seq_no}.ts"),
            seq_no,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn stages_a_copy_and_keeps_the_origin() {
        let dir = tempfile::tempdir().expect("tempdir");
        let workdir = dir.path().join("work");
        tokio::fs::create_dir_all(&workdir).await.expect("mkdir");
        tokio::fs::write(dir.path().join("7.ts"), b"ts-bytes")
            .await
            .expect("write");

        let msg = callback(dir.path(), 7);
        let cancel = CancellationToken::new();
        let ts = stage_segment(&workdir, &msg, &cancel).await.expect("stage");

        assert!(ts.ts_id.starts_with("7-org-"));
        assert_eq!(ts.seq_no, 7);
        assert_eq!(ts.size_bytes, 8);
        assert!(ts.stored_key.is_none());
        assert!(tokio::fs::metadata(&ts.source_path).await.is_ok());
        assert!(tokio::fs::metadata(dir.path().join("7.ts")).await.is_ok());
    }

    #[tokio::test]
    async fn missing_source_is_invalid_input() {
        let dir = tempfile::tempdir().expect("tempdir");
        let msg = callback(dir.path(), 9);
        let cancel = CancellationToken::new();
        let err = stage_segment(dir.path(), &msg, &cancel)
            .await
            .expect_err("must fail");
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[tokio::test]
    async fn duplicate_callbacks_stage_distinct_copies() {
        let dir = tempfile::tempdir().expect("tempdir");
        tokio::fs::write(dir.path().join("3.ts"), b"dup")
            .await
            .expect("write");

        let msg = callback(dir.path(), 3);
        let cancel = CancellationToken::new();
        let first = stage_segment(dir.path(), &msg, &cancel).await.expect("first");
        let second = stage_segment(dir.path(), &msg, &cancel).await.expect("second");

        assert_ne!(first.ts_id, second.ts_id);
        assert_ne!(first.source_path, second.source_path);
        assert!(tokio::fs::metadata(&first.source_path).await.is_ok());
        assert!(tokio::fs::metadata(&second.source_path).await.is_ok());
    }

    #[tokio::test]
    async fn worker_emits_staged_descriptors() {
        let dir = tempfile::tempdir().expect("tempdir");
        tokio::fs::write(dir.path().join("5.ts"), b"ts")
            .await
            .expect("write");

        let (msg_tx, msg_rx) = IntakeWorker::channel();
        let (staged_tx, mut staged_rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();
        let worker = IntakeWorker::new(dir.path().to_path_buf(), staged_tx);
        let handle = tokio::spawn(worker.run(msg_rx, cancel.clone()));

        msg_tx.send(callback(dir.path(), 5)).await.expect("send");
        let staged = staged_rx.recv().await.expect("staged");
        assert_eq!(staged.stream_key.canonical(), "live/main");
        assert_eq!(staged.ts.seq_no, 5);

        cancel.cancel();
        handle.await.expect("join");
    }
}

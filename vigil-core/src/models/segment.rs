use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// One staged transport-stream segment.
///
/// Immutable after intake; `stored_key` is assigned only when the segment is
/// adopted into a persistent directory (an incident group's working dir).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TsSegment {
    #[serde(rename = "tsid")]
    pub ts_id: String,
    /// The staged file on disk.
    #[serde(rename = "file")]
    pub source_path: PathBuf,
    /// Monotonic per stream, assigned by the upstream server.
    #[serde(rename = "seqno")]
    pub seq_no: u64,
    /// Seconds.
    pub duration: f64,
    #[serde(rename = "size")]
    pub size_bytes: u64,
    #[serde(rename = "url")]
    pub origin_url: String,
    #[serde(rename = "key", default, skip_serializing_if = "Option::is_none")]
    pub stored_key: Option<PathBuf>,
}

impl TsSegment {
    /// File name (`<ts_id>.ts`) of the staged copy.
    #[must_use]
    pub fn file_name(&self) -> String {
        format!("{}.ts", self.ts_id)
    }

    /// Remove the staged file, ignoring a file that is already gone.
    pub async fn dispose(&self) {
        if tokio::fs::metadata(&self.source_path).await.is_ok() {
            if let Err(e) = tokio::fs::remove_file(&self.source_path).await {
                tracing::warn!(file = %self.source_path.display(), "failed to remove segment: {e}");
            }
        }
    }
}

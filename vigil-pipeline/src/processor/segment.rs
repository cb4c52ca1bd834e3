use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use vigil_core::models::{Detection, TsSegment};

/// The still image derived from one segment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageFile {
    pub image_id: String,
    pub path: PathBuf,
    pub size_bytes: u64,
}

/// A segment travelling through the Live → Detect → Finish stages, together
/// with everything the stages derive from it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessSegment {
    pub ts: TsSegment,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<ImageFile>,
    #[serde(default)]
    pub detections: Vec<Detection>,
    /// Container start time of the segment, seconds, from the media probe.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream_start_secs: Option<f64>,
    /// Milliseconds spent extracting the still.
    #[serde(default)]
    pub extract_cost_ms: u64,
    /// Milliseconds spent on inference plus the probe.
    #[serde(default)]
    pub detect_cost_ms: u64,
}

impl ProcessSegment {
    #[must_use]
    pub fn new(ts: TsSegment) -> Self {
        Self {
            ts,
            image: None,
            detections: Vec::new(),
            stream_start_secs: None,
            extract_cost_ms: 0,
            detect_cost_ms: 0,
        }
    }

    /// Remove the staged TS file and the derived image, tolerating files
    /// that are already gone.
    pub async fn dispose(&self) {
        self.ts.dispose().await;
        if let Some(image) = &self.image {
            if tokio::fs::metadata(&image.path).await.is_ok() {
                if let Err(e) = tokio::fs::remove_file(&image.path).await {
                    tracing::warn!(file = %image.path.display(), "failed to remove image: {e}");
                }
            }
        }
    }

    /// The serialized detection list for the playlist metadata line.
    #[must_use]
    pub fn detections_json(&self) -> String {
        serde_json::to_string(&self.detections).unwrap_or_else(|_| "[]".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detections_json_is_playlist_ready() {
        let mut segment = ProcessSegment::new(TsSegment::default());
        assert_eq!(segment.detections_json(), "[]");

        segment.detections.push(Detection {
            bbox: vec![1.0, 2.0, 3.0, 4.0],
            score: 0.8,
            category_id: 7,
            image_id: "i".to_string(),
        });
        let json = segment.detections_json();
        assert!(json.contains("\"category_id\":7"));
    }

    #[tokio::test]
    async fn dispose_removes_ts_and_image() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ts_path = dir.path().join("seg.ts");
        let img_path = dir.path().join("seg.jpg");
        tokio::fs::write(&ts_path, b"ts").await.expect("write ts");
        tokio::fs::write(&img_path, b"img").await.expect("write img");

        let mut segment = ProcessSegment::new(TsSegment {
            ts_id: "seg".to_string(),
            source_path: ts_path.clone(),
            ..Default::default()
        });
        segment.image = Some(ImageFile {
            image_id: "seg-img".to_string(),
            path: img_path.clone(),
            size_bytes: 3,
        });

        segment.dispose().await;
        assert!(tokio::fs::metadata(&ts_path).await.is_err());
        assert!(tokio::fs::metadata(&img_path).await.is_err());
    }
}

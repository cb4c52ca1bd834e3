use serde::{Deserialize, Serialize};

use super::StreamKey;

pub const ACTION_ON_PUBLISH: &str = "on_publish";
pub const ACTION_ON_UNPUBLISH: &str = "on_unpublish";
pub const ACTION_ON_PLAY: &str = "on_play";
pub const ACTION_ON_HLS: &str = "on_hls";

/// Stream-lifecycle callback body (`/hooks/srs/verify`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StreamCallback {
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub vhost: String,
    #[serde(default)]
    pub app: String,
    #[serde(default)]
    pub stream: String,
    #[serde(default)]
    pub param: String,
}

impl StreamCallback {
    #[must_use]
    pub fn stream_key(&self) -> StreamKey {
        StreamKey::new(self.vhost.clone(), self.app.clone(), self.stream.clone())
    }
}

/// Segment-ready callback body (`/hooks/srs/hls`): the upstream server just
/// finished writing one TS file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HlsCallback {
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub vhost: String,
    #[serde(default)]
    pub app: String,
    #[serde(default)]
    pub stream: String,
    #[serde(default)]
    pub param: String,
    /// Seconds of media in the segment.
    #[serde(default)]
    pub duration: f64,
    /// The TS file on the shared filesystem.
    #[serde(default)]
    pub file: String,
    /// Origin URL of the segment as published.
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub m3u8_url: String,
    #[serde(default)]
    pub seq_no: u64,
}

impl HlsCallback {
    #[must_use]
    pub fn stream_key(&self) -> StreamKey {
        StreamKey::new(self.vhost.clone(), self.app.clone(), self.stream.clone())
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::TsSegment;

/// The VoD recording an incident group builds up and finally packages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VodArtifact {
    pub uuid: String,
    #[serde(rename = "m3u8")]
    pub m3u8_url: String,
    pub processing: bool,
    #[serde(rename = "update")]
    pub update_time: DateTime<Utc>,
    #[serde(rename = "done", default, skip_serializing_if = "Option::is_none")]
    pub done_time: Option<DateTime<Utc>>,
    /// Segments adopted into the group's working directory, in order.
    #[serde(default)]
    pub files: Vec<TsSegment>,
    #[serde(rename = "nn", default)]
    pub file_count: usize,
    #[serde(default)]
    pub vhost: String,
    #[serde(default)]
    pub app: String,
    #[serde(default)]
    pub stream: String,
}

impl VodArtifact {
    #[must_use]
    pub fn new(uuid: String, m3u8_url: String) -> Self {
        Self {
            uuid,
            m3u8_url,
            processing: true,
            update_time: Utc::now(),
            done_time: None,
            files: Vec::new(),
            file_count: 0,
            vhost: String::new(),
            app: String::new(),
            stream: String::new(),
        }
    }
}

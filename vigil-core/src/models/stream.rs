use serde::{Deserialize, Serialize};

/// The default vhost name used by the upstream media server when a publisher
/// does not name one explicitly.
pub const DEFAULT_VHOST: &str = "__defaultVhost__";

/// Identity of one published stream: `(vhost, app, stream)`.
///
/// The canonical string form is `vhost/app/stream`, shortened to
/// `app/stream` when the vhost is the default. That form indexes the
/// per-stream processor registry and prefixes the annotated-playlist URLs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StreamKey {
    #[serde(default)]
    pub vhost: String,
    #[serde(default)]
    pub app: String,
    #[serde(default)]
    pub stream: String,
}

impl StreamKey {
    #[must_use]
    pub fn new(
        vhost: impl Into<String>,
        app: impl Into<String>,
        stream: impl Into<String>,
    ) -> Self {
        Self {
            vhost: vhost.into(),
            app: app.into(),
            stream: stream.into(),
        }
    }

    /// Canonical index form, e.g. `live/main`.
    #[must_use]
    pub fn canonical(&self) -> String {
        if self.vhost.is_empty() || self.vhost == DEFAULT_VHOST {
            format!("{}/{}", self.app, self.stream)
        } else {
            format!("{}/{}/{}", self.vhost, self.app, self.stream)
        }
    }

    /// The bare stream name, used to key incident groups and in the
    /// incident-service callbacks.
    #[must_use]
    pub fn stream_name(&self) -> &str {
        &self.stream
    }
}

impl std::fmt::Display for StreamKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.canonical())
    }
}

use config::{Config as ConfigBuilder, ConfigError, Environment};
use serde::{Deserialize, Serialize};

/// Application configuration.
///
/// Every field maps to one environment variable (the flat names the upstream
/// media-server deployment already exports), with the historical defaults
/// applied when unset.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP listen port for the platform API (hooks, playlists, clips).
    pub platform_listen: u16,
    /// Management listen port, accepted for deployment compatibility.
    pub mgmt_listen: u16,
    /// HTTPS listen port, accepted for deployment compatibility.
    pub https_listen: u16,

    pub redis_host: String,
    pub redis_port: u16,
    pub redis_password: String,
    pub redis_database: i64,

    /// RTMP port of the upstream media server, advertised back in URLs.
    pub rtmp_port: u16,
    /// Optional public HTTP port of the upstream media server.
    pub http_port: String,
    /// Legacy profiling toggle, accepted and ignored.
    pub go_pprof: String,

    /// Root of the segment staging area; processors write images under
    /// `<workdir>/<stream key>/`.
    pub workdir: String,
    /// Root of the incident staging area; groups write under
    /// `<accident_root>/<group uuid>/`.
    pub accident_root: String,

    /// Base URL of the visual-inference service.
    pub inference_url: String,
    /// Base URL of the incident-notification service.
    pub incident_url: String,

    pub log_level: String,
    pub log_format: String,
    pub log_file: String,

    /// Seconds of segment silence after which an idle per-stream processor
    /// is retired. Zero disables the reaper.
    pub pipeline_idle_ttl_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            platform_listen: 2024,
            mgmt_listen: 2022,
            https_listen: 2443,
            redis_host: "127.0.0.1".to_string(),
            redis_port: 6379,
            redis_password: String::new(),
            redis_database: 0,
            rtmp_port: 1935,
            http_port: String::new(),
            go_pprof: String::new(),
            workdir: "process".to_string(),
            accident_root: "accident".to_string(),
            inference_url: "http://127.0.0.1:10080".to_string(),
            incident_url: "http://127.0.0.1:5000".to_string(),
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            log_file: String::new(),
            pipeline_idle_ttl_secs: 3600,
        }
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("platform_listen", &self.platform_listen)
            .field("mgmt_listen", &self.mgmt_listen)
            .field("https_listen", &self.https_listen)
            .field("redis_host", &self.redis_host)
            .field("redis_port", &self.redis_port)
            .field("redis_password", &"<redacted>")
            .field("redis_database", &self.redis_database)
            .field("rtmp_port", &self.rtmp_port)
            .field("workdir", &self.workdir)
            .field("accident_root", &self.accident_root)
            .field("inference_url", &self.inference_url)
            .field("incident_url", &self.incident_url)
            .field("log_level", &self.log_level)
            .field("log_format", &self.log_format)
            .field("pipeline_idle_ttl_secs", &self.pipeline_idle_ttl_secs)
            .finish()
    }
}

impl Config {
    /// Load configuration from the process environment.
    pub fn load() -> Result<Self, ConfigError> {
        let builder = ConfigBuilder::builder()
            .add_source(Environment::default())
            .build()?;
        builder.try_deserialize()
    }

    #[must_use]
    pub fn listen_addr(&self) -> String {
        format!("0.0.0.0:{}", self.platform_listen)
    }

    #[must_use]
    pub fn redis_url(&self) -> String {
        if self.redis_password.is_empty() {
            format!(
                "redis://{}:{}/{}",
                self.redis_host, self.redis_port, self.redis_database
            )
        } else {
            format!(
                "redis://:{}@{}:{}/{}",
                self.redis_password, self.redis_host, self.redis_port, self.redis_database
            )
        }
    }

    #[must_use]
    pub fn logging(&self) -> LoggingConfig {
        LoggingConfig {
            level: self.log_level.clone(),
            format: self.log_format.clone(),
            file_path: if self.log_file.is_empty() {
                None
            } else {
                Some(self.log_file.clone())
            },
        }
    }
}

/// Logging configuration derived from the flat environment fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
    pub file_path: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_deployment_expectations() {
        let config = Config::default();
        assert_eq!(config.platform_listen, 2024);
        assert_eq!(config.redis_host, "127.0.0.1");
        assert_eq!(config.redis_port, 6379);
        assert_eq!(config.workdir, "process");
        assert_eq!(config.accident_root, "accident");
        assert_eq!(config.pipeline_idle_ttl_secs, 3600);
    }

    #[test]
    fn redis_url_with_and_without_password() {
        let mut config = Config::default();
        assert_eq!(config.redis_url(), "redis://127.0.0.1:6379/0");

        config.redis_password = "secret".to_string();
        config.redis_database = 2;
        assert_eq!(config.redis_url(), "redis://:secret@127.0.0.1:6379/2");
    }

    #[test]
    fn debug_redacts_password() {
        let mut config = Config::default();
        config.redis_password = "secret".to_string();
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("secret"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn logging_config_empty_file_is_none() {
        let config = Config::default();
        assert!(config.logging().file_path.is_none());
    }
}

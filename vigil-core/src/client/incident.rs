use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Client for the incident-notification service: one call opens an incident
/// when a group forms, one closes it with the packaged clip.
#[derive(Debug, Clone)]
pub struct IncidentClient {
    http: reqwest::Client,
    base_url: String,
}

#[derive(Serialize)]
struct OpenRequest<'a> {
    #[serde(rename = "streamKey")]
    stream_key: &'a str,
    #[serde(rename = "type")]
    category: &'a str,
}

#[derive(Deserialize)]
struct OpenResponse {
    #[serde(rename = "accidentId", default)]
    incident_id: i64,
}

#[derive(Serialize)]
struct CloseRequest<'a> {
    id: i64,
    #[serde(rename = "videoUrl")]
    video_url: &'a str,
}

impl IncidentClient {
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    /// Open an incident for `(stream, category)`; returns the service's id.
    pub async fn open(&self, stream_key: &str, category: &str) -> Result<i64> {
        let url = format!("{}/accident", self.base_url);
        let response = self
            .http
            .post(&url)
            .json(&OpenRequest {
                stream_key,
                category,
            })
            .send()
            .await?;

        let status = response.status().as_u16();
        if status != 201 {
            return Err(Error::UpstreamStatus { url, status });
        }

        let body: OpenResponse = response.json().await?;
        Ok(body.incident_id)
    }

    /// Close an incident, pointing the service at the packaged clip.
    pub async fn close(&self, incident_id: i64, video_url: &str) -> Result<()> {
        let url = format!("{}/accident/end", self.base_url);
        let response = self
            .http
            .post(&url)
            .json(&CloseRequest {
                id: incident_id,
                video_url,
            })
            .send()
            .await?;

        let status = response.status().as_u16();
        if status != 201 {
            return Err(Error::UpstreamStatus { url, status });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn open_returns_incident_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/accident"))
            .and(body_json(serde_json::json!({"streamKey": "main", "type": "FALL"})))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({"accidentId": 42})))
            .mount(&server)
            .await;

        let client = IncidentClient::new(server.uri());
        let id = client.open("main", "FALL").await.expect("open");
        assert_eq!(id, 42);
    }

    #[tokio::test]
    async fn open_rejects_non_created() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/accident"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"accidentId": 1})))
            .mount(&server)
            .await;

        let client = IncidentClient::new(server.uri());
        assert!(client.open("main", "FALL").await.is_err());
    }

    #[tokio::test]
    async fn close_posts_clip_location() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/accident/end"))
            .and(body_json(serde_json::json!({"id": 42, "videoUrl": "accident/u-1/index.mp4"})))
            .respond_with(ResponseTemplate::new(201))
            .mount(&server)
            .await;

        let client = IncidentClient::new(server.uri());
        client
            .close(42, "accident/u-1/index.mp4")
            .await
            .expect("close");
    }
}

use serde::Serialize;

use crate::error::{Error, Result};
use crate::models::Detection;

/// Client for the visual-inference service.
///
/// `detect` posts one base64 jpg and gets back the detection list; the
/// stream-lifecycle notifications let the service warm up and tear down its
/// per-stream models.
#[derive(Debug, Clone)]
pub struct InferenceClient {
    http: reqwest::Client,
    base_url: String,
}

#[derive(Serialize)]
struct DetectRequest<'a> {
    content: &'a str,
}

#[derive(Serialize)]
struct StreamRequest<'a> {
    #[serde(rename = "streamKey")]
    stream_key: &'a str,
}

impl InferenceClient {
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    /// Submit one still image (base64 jpg) and return the detections.
    pub async fn detect(&self, image_base64: &str) -> Result<Vec<Detection>> {
        let url = format!("{}/ai", self.base_url);
        let response = self
            .http
            .post(&url)
            .json(&DetectRequest {
                content: image_base64,
            })
            .send()
            .await?;

        let status = response.status().as_u16();
        if status != 200 && status != 201 {
            return Err(Error::UpstreamStatus { url, status });
        }

        Ok(response.json().await?)
    }

    pub async fn stream_started(&self, stream_key: &str) -> Result<()> {
        self.notify("stream/verify", stream_key).await
    }

    pub async fn stream_ended(&self, stream_key: &str) -> Result<()> {
        self.notify("stream/end", stream_key).await
    }

    async fn notify(&self, endpoint: &str, stream_key: &str) -> Result<()> {
        let url = format!("{}/{endpoint}", self.base_url);
        let response = self
            .http
            .post(&url)
            .json(&StreamRequest { stream_key })
            .send()
            .await?;

        let status = response.status().as_u16();
        if status != 201 {
            return Err(Error::UpstreamStatus { url, status });
        }
        Ok(())
    }
}

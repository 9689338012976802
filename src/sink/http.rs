// src/sink/http.rs
use anyhow::{anyhow, Result};
use reqwest::{Client, StatusCode};
use std::time::Duration;

use super::{Artifact, TableFormat};
use crate::harvest::types::{Batch, SinkUploader};

/// Uploads artifacts to an ingress endpoint: `PUT {base}/{dataset}/{artifact}`.
///
/// Only `201 Created` counts as stored. Timeouts and transient failures
/// (transport errors, 429, 5xx) are retried here with exponential backoff;
/// other statuses fail immediately.
#[derive(Clone)]
pub struct HttpUploader {
    base_url: String,
    dataset: String,
    token: Option<String>,
    client: Client,
    timeout: Duration,
    max_attempts: u8,
    backoff: Duration,
    table_format: TableFormat,
}

impl HttpUploader {
    pub fn new(base_url: &str, dataset: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            dataset: dataset.to_string(),
            token: None,
            client: Client::new(),
            timeout: Duration::from_secs(30),
            max_attempts: 3,
            backoff: Duration::from_millis(500),
            table_format: TableFormat::Csv,
        }
    }

    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_attempts(mut self, attempts: u8) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// Base delay; doubles after every failed attempt.
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_table_format(mut self, table_format: TableFormat) -> Self {
        self.table_format = table_format;
        self
    }

    pub fn artifact_url(&self, artifact_name: &str) -> String {
        format!("{}/{}/{}", self.base_url, self.dataset, artifact_name)
    }

    async fn pause(&self, attempt: u8) {
        let factor = 1u32 << u32::from(attempt.saturating_sub(1)).min(6);
        tokio::time::sleep(self.backoff.saturating_mul(factor)).await;
    }
}

fn is_transient(status: StatusCode) -> bool {
    status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS
}

#[async_trait::async_trait]
impl SinkUploader for HttpUploader {
    async fn upload(&self, batch: &Batch) -> Result<()> {
        let artifact = Artifact::encode(batch, self.table_format)?;
        let url = self.artifact_url(&artifact.name);

        let mut attempt: u8 = 0;
        loop {
            attempt += 1;
            let mut req = self
                .client
                .put(&url)
                .timeout(self.timeout)
                .header(reqwest::header::CONTENT_TYPE, artifact.content_type)
                .body(artifact.bytes.clone());
            if let Some(t) = &self.token {
                req = req.bearer_auth(t);
            }

            match req.send().await {
                Ok(rsp) if rsp.status() == StatusCode::CREATED => {
                    tracing::info!(
                        artifact = %artifact.name,
                        bytes = artifact.bytes.len(),
                        attempt,
                        "data successfully uploaded"
                    );
                    return Ok(());
                }
                Ok(rsp) => {
                    let status = rsp.status();
                    if is_transient(status) && attempt < self.max_attempts {
                        tracing::warn!(%status, artifact = %artifact.name, attempt, "ingress busy, retrying");
                        self.pause(attempt).await;
                        continue;
                    }
                    let body = rsp.text().await.unwrap_or_default();
                    return Err(anyhow!(
                        "ingress rejected {} with HTTP {status}: {}",
                        artifact.name,
                        body.trim()
                    ));
                }
                Err(e) => {
                    if attempt < self.max_attempts {
                        tracing::warn!(error = %e, artifact = %artifact.name, attempt, "upload request failed, retrying");
                        self.pause(attempt).await;
                        continue;
                    }
                    return Err(anyhow!("upload of {} failed: {e}", artifact.name));
                }
            }
        }
    }

    fn name(&self) -> &str {
        "http"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_artifact_url_without_double_slash() {
        let u = HttpUploader::new("https://ingress.example/api/", "dataset-1");
        assert_eq!(
            u.artifact_url("a--b.csv"),
            "https://ingress.example/api/dataset-1/a--b.csv"
        );
    }

    #[test]
    fn only_server_errors_and_throttling_are_transient() {
        assert!(is_transient(StatusCode::BAD_GATEWAY));
        assert!(is_transient(StatusCode::TOO_MANY_REQUESTS));
        assert!(!is_transient(StatusCode::BAD_REQUEST));
        assert!(!is_transient(StatusCode::OK));
    }
}

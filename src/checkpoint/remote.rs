// src/checkpoint/remote.rs
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder, StatusCode};
use std::time::Duration;

use super::{Checkpoint, CheckpointStore, StateCodec};

/// Checkpoint kept as a state blob next to the dataset on the ingress service:
/// `GET`/`PUT {base}/{dataset}/state`.
#[derive(Clone)]
pub struct HttpCheckpointStore {
    state_url: String,
    token: Option<String>,
    client: Client,
    timeout: Duration,
    codec: StateCodec,
    initial: DateTime<Utc>,
}

impl HttpCheckpointStore {
    pub fn new(base_url: &str, dataset: &str) -> Self {
        Self {
            state_url: format!("{}/{}/state", base_url.trim_end_matches('/'), dataset),
            token: None,
            client: Client::new(),
            timeout: Duration::from_secs(30),
            codec: StateCodec::default(),
            initial: DateTime::<Utc>::UNIX_EPOCH,
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

    pub fn with_codec(mut self, codec: StateCodec) -> Self {
        self.codec = codec;
        self
    }

    pub fn with_initial_position(mut self, initial: DateTime<Utc>) -> Self {
        self.initial = initial;
        self
    }

    pub fn state_url(&self) -> &str {
        &self.state_url
    }

    fn authorized(&self, req: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(t) => req.bearer_auth(t),
            None => req,
        }
    }
}

#[async_trait::async_trait]
impl CheckpointStore for HttpCheckpointStore {
    async fn load(&self) -> Result<Checkpoint> {
        let rsp = self
            .authorized(self.client.get(&self.state_url).timeout(self.timeout))
            .send()
            .await
            .with_context(|| format!("GET {}", self.state_url))?;

        if rsp.status() == StatusCode::NOT_FOUND {
            tracing::info!(url = %self.state_url, initial = %self.initial, "no remote state yet");
            return Ok(Checkpoint::initial(self.initial));
        }
        let rsp = rsp
            .error_for_status()
            .with_context(|| format!("GET {}", self.state_url))?;
        let body = rsp.bytes().await.context("reading state body")?;
        self.codec
            .decode(&body)
            .with_context(|| format!("decoding state from {}", self.state_url))
    }

    async fn save(&self, checkpoint: &Checkpoint) -> Result<()> {
        let body = self.codec.encode(checkpoint)?;
        self.authorized(
            self.client
                .put(&self.state_url)
                .timeout(self.timeout)
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .body(body),
        )
        .send()
        .await
        .with_context(|| format!("PUT {}", self.state_url))?
        .error_for_status()
        .with_context(|| format!("PUT {}", self.state_url))?;
        Ok(())
    }

    fn name(&self) -> &str {
        "http"
    }
}

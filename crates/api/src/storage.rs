use std::path::Path;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::info;

/// Destination for finished session recordings.
///
/// Implementations return a durable URI; the collaborating meeting service
/// owns updating the meeting record's audio-URL column.
#[async_trait]
pub trait AudioStore: Send + Sync + 'static {
    async fn store(&self, local_path: &Path, meeting_id: &str) -> anyhow::Result<String>;

    /// Human-readable store name.
    fn name(&self) -> &str;
}

/// Keeps recordings on the local filesystem. Development default and the
/// fallback recorded when blob storage is unreachable.
pub struct LocalAudioStore;

#[async_trait]
impl AudioStore for LocalAudioStore {
    async fn store(&self, local_path: &Path, meeting_id: &str) -> anyhow::Result<String> {
        let uri = local_path.display().to_string();
        info!(%meeting_id, %uri, "Recording kept on local filesystem");
        Ok(uri)
    }

    fn name(&self) -> &str {
        "local"
    }
}

/// Uploads recordings to the blob-store HTTP service.
pub struct HttpAudioStore {
    client: reqwest::Client,
    endpoint: String,
}

#[derive(Deserialize)]
struct StoreResponse {
    uri: String,
}

impl HttpAudioStore {
    pub fn new(endpoint: &str) -> anyhow::Result<Self> {
        Ok(Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl AudioStore for HttpAudioStore {
    async fn store(&self, local_path: &Path, meeting_id: &str) -> anyhow::Result<String> {
        let bytes = tokio::fs::read(local_path).await.map_err(|e| {
            anyhow::anyhow!("Failed to read recording '{}': {}", local_path.display(), e)
        })?;

        let response = self
            .client
            .post(format!("{}/meetings/{}/audio", self.endpoint, meeting_id))
            .header("content-type", "audio/wav")
            .body(bytes)
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("Audio upload to '{}' failed: {}", self.endpoint, e))?
            .error_for_status()
            .map_err(|e| anyhow::anyhow!("Audio store returned error: {}", e))?;

        let parsed: StoreResponse = response
            .json()
            .await
            .map_err(|e| anyhow::anyhow!("Bad audio store response: {}", e))?;

        info!(%meeting_id, uri = %parsed.uri, "Recording uploaded");
        Ok(parsed.uri)
    }

    fn name(&self) -> &str {
        "remote_http"
    }
}

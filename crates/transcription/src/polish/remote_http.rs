use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use super::{PolishBackend, PolishRequest, PolishedText};

/// Remote timeout for one polish call.
const POLISH_TIMEOUT: Duration = Duration::from_secs(30);

/// LLM polish/translate backend over HTTP.
///
/// POSTs the request to `{endpoint}/polish`. The LLM service occasionally
/// returns nested objects where strings belong; those are coerced to their
/// `content` field or stringified rather than failing the segment.
pub struct HttpPolishBackend {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpPolishBackend {
    pub fn new(endpoint: &str) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(POLISH_TIMEOUT)
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build polish HTTP client: {}", e))?;
        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl PolishBackend for HttpPolishBackend {
    async fn polish(&self, request: PolishRequest) -> anyhow::Result<PolishedText> {
        let fallback = request.text.clone();

        let response = self
            .client
            .post(format!("{}/polish", self.endpoint))
            .json(&request)
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("Polish request to '{}' failed: {}", self.endpoint, e))?
            .error_for_status()
            .map_err(|e| anyhow::anyhow!("Polish service returned error: {}", e))?;

        let body: Value = response
            .json()
            .await
            .map_err(|e| anyhow::anyhow!("Bad polish response body: {}", e))?;

        let refined = body
            .get("refined")
            .or_else(|| body.get("polished_text"))
            .map(coerce_text)
            .unwrap_or(fallback);
        let translated = body.get("translated").map(coerce_text).unwrap_or_default();

        debug!(refined_len = refined.len(), translated_len = translated.len(), "Polish complete");

        Ok(PolishedText {
            refined,
            translated,
        })
    }

    fn name(&self) -> &str {
        "remote_http"
    }
}

/// Coerces a response field to a plain string: nested objects yield their
/// `content` field (or their JSON rendering), scalars stringify.
fn coerce_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Object(map) => map
            .get("content")
            .and_then(Value::as_str)
            .map(str::to_owned)
            .unwrap_or_else(|| value.to_string()),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

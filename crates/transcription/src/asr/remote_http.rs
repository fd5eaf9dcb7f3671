use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use serde::Deserialize;
use tracing::debug;

use super::{AsrBackend, AsrRequest, AsrSegment};

/// Remote ASR backend speaking the GPU service's HTTP contract.
///
/// POSTs `{audio_b64, language, initial_prompt}` (f32 LE PCM, base64) to
/// `{endpoint}/transcribe` and expects `{"segments": [{text,
/// no_speech_prob}]}`. No client-side timeout here — the session enforces
/// its own partial/final deadlines.
pub struct RemoteHttpBackend {
    client: reqwest::Client,
    endpoint: String,
}

#[derive(Deserialize)]
struct TranscribeResponse {
    segments: Vec<AsrSegment>,
}

impl RemoteHttpBackend {
    pub fn new(endpoint: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.trim_end_matches('/').to_string(),
        }
    }

    fn pcm_f32_to_bytes(samples: &[f32]) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(samples.len() * 4);
        for sample in samples {
            bytes.extend_from_slice(&sample.to_le_bytes());
        }
        bytes
    }
}

#[async_trait]
impl AsrBackend for RemoteHttpBackend {
    async fn transcribe(&self, request: AsrRequest) -> anyhow::Result<Vec<AsrSegment>> {
        let audio_b64 = BASE64.encode(Self::pcm_f32_to_bytes(&request.audio_pcm_16k_mono));
        debug!(
            samples = request.audio_pcm_16k_mono.len(),
            language = %request.language,
            "Dispatching window to remote ASR"
        );

        let response = self
            .client
            .post(format!("{}/transcribe", self.endpoint))
            .json(&serde_json::json!({
                "audio_b64": audio_b64,
                "language": request.language,
                "initial_prompt": request.initial_prompt,
            }))
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("ASR request to '{}' failed: {}", self.endpoint, e))?
            .error_for_status()
            .map_err(|e| anyhow::anyhow!("ASR service returned error: {}", e))?;

        let parsed: TranscribeResponse = response
            .json()
            .await
            .map_err(|e| anyhow::anyhow!("Bad ASR response body: {}", e))?;

        Ok(parsed.segments)
    }

    fn name(&self) -> &str {
        "remote_http"
    }
}

pub mod remote_http;
pub mod stub;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Request to refine and translate one finalised transcript.
#[derive(Debug, Clone, Serialize)]
pub struct PolishRequest {
    pub text: String,
    /// Previous finalised transcript, for cross-segment coherence.
    pub previous_context: String,
    pub source_lang: String,
    pub target_lang: String,
}

/// Refined transcript plus its translation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolishedText {
    pub refined: String,
    pub translated: String,
}

/// Trait for pluggable polish/translate backends.
#[async_trait]
pub trait PolishBackend: Send + Sync + 'static {
    async fn polish(&self, request: PolishRequest) -> anyhow::Result<PolishedText>;

    /// Human-readable backend name.
    fn name(&self) -> &str;
}

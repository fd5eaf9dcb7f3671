pub mod remote_http;
pub mod stub;

#[cfg(feature = "local-whisper")]
pub mod local_whisper;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::corrections::CorrectionMap;
use crate::hallucination::HallucinationFilter;

/// Request to transcribe an audio window.
pub struct AsrRequest {
    /// PCM audio at 16 kHz mono, f32 normalized [-1.0, 1.0].
    pub audio_pcm_16k_mono: Vec<f32>,
    /// ISO 639-1 language code (e.g. "zh", "en").
    pub language: String,
    /// Context prompt guiding the decoder.
    pub initial_prompt: String,
}

/// One decoded sub-segment as reported by the backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AsrSegment {
    pub text: String,
    /// Backend-reported probability that the segment is not speech.
    #[serde(default)]
    pub no_speech_prob: f64,
}

/// Trait for pluggable ASR backends.
#[async_trait]
pub trait AsrBackend: Send + Sync + 'static {
    /// Transcribes one audio window into decoder sub-segments.
    async fn transcribe(&self, request: AsrRequest) -> anyhow::Result<Vec<AsrSegment>>;

    /// Human-readable backend name.
    fn name(&self) -> &str;
}

/// Sub-segments at or above this no-speech probability are dropped.
const NO_SPEECH_MAX: f64 = 0.85;

/// Decoder instruction prepended for Traditional Chinese sessions: output
/// in Taiwan Traditional Chinese with full-width punctuation, keep English
/// terms verbatim with half-width spaces around them.
const ZH_SYSTEM_INSTRUCTION: &str = "請將語音精準轉錄為流暢的台灣正體中文，\
依語氣與停頓加入正確的全形標點符號（，。？！）。英文術語保留原文，\
中英之間加入半形空格。禁止出現簡體字。以下為本次對話的背景知識：";

/// Front door to ASR: wraps a backend with prompt composition, no-speech
/// filtering, keyword corrections and the hallucination filter.
///
/// Never errors — any backend failure degrades to an empty string so the
/// session loop can treat "nothing transcribed" uniformly.
#[derive(Clone)]
pub struct AsrClient {
    backend: Arc<dyn AsrBackend>,
    corrections: Arc<CorrectionMap>,
    filter: Arc<HallucinationFilter>,
}

impl AsrClient {
    pub fn new(
        backend: Arc<dyn AsrBackend>,
        corrections: Arc<CorrectionMap>,
        filter: Arc<HallucinationFilter>,
    ) -> Self {
        Self {
            backend,
            corrections,
            filter,
        }
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Transcribes a window, returning "" on failure or filtered output.
    ///
    /// `skip_hallucination_filter` is set by alignment-mode sessions so
    /// short fragments reach the script aligner verbatim.
    pub async fn transcribe(
        &self,
        audio_pcm_16k_mono: Vec<f32>,
        language: &str,
        initial_prompt: &str,
        skip_hallucination_filter: bool,
    ) -> String {
        let prompt = if language == "zh" {
            format!("{} {}", ZH_SYSTEM_INSTRUCTION, initial_prompt)
                .trim()
                .to_string()
        } else {
            initial_prompt.to_string()
        };

        let request = AsrRequest {
            audio_pcm_16k_mono,
            language: language.to_string(),
            initial_prompt: prompt,
        };

        let segments = match self.backend.transcribe(request).await {
            Ok(segments) => segments,
            Err(e) => {
                warn!(backend = self.backend.name(), error = %e, "ASR backend failed");
                return String::new();
            }
        };

        let text = segments
            .iter()
            .filter(|s| s.no_speech_prob < NO_SPEECH_MAX)
            .map(|s| s.text.trim())
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join(" ");

        if text.is_empty() {
            return String::new();
        }

        let text = self.corrections.apply(&text);

        if !skip_hallucination_filter && self.filter.is_hallucination(&text) {
            debug!(%text, "Dropped hallucinated transcript");
            return String::new();
        }

        text
    }
}

use async_trait::async_trait;
use tracing::{debug, info};
use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

use super::{AsrBackend, AsrRequest, AsrSegment};

/// In-process Whisper ASR backend via whisper.cpp.
///
/// The model is loaded once and owned by this value; inference runs on the
/// blocking thread pool so the session loop is never stalled.
pub struct LocalWhisperBackend {
    ctx: WhisperContext,
}

impl LocalWhisperBackend {
    /// Loads a GGML Whisper model from disk.
    pub fn new(model_path: &str) -> anyhow::Result<Self> {
        info!(model_path, "Loading Whisper model");
        let ctx = WhisperContext::new_with_params(model_path, WhisperContextParameters::default())
            .map_err(|e| anyhow::anyhow!("Failed to load Whisper model '{}': {}", model_path, e))?;
        info!("Whisper model loaded");
        Ok(Self { ctx })
    }
}

#[async_trait]
impl AsrBackend for LocalWhisperBackend {
    async fn transcribe(&self, request: AsrRequest) -> anyhow::Result<Vec<AsrSegment>> {
        let audio = request.audio_pcm_16k_mono;
        let language = request.language;
        let prompt = request.initial_prompt;

        // whisper-rs is CPU-bound; run on the blocking thread pool
        let ctx_ptr = &self.ctx as *const WhisperContext;
        // SAFETY: WhisperContext is Send+Sync and a fresh state is created
        // per call; the backend outlives the blocking task because the
        // caller awaits it.
        let ctx_ref = unsafe { &*ctx_ptr };

        let segments = tokio::task::spawn_blocking(move || -> anyhow::Result<Vec<AsrSegment>> {
            let mut state = ctx_ref
                .create_state()
                .map_err(|e| anyhow::anyhow!("Failed to create Whisper state: {}", e))?;

            let mut params = FullParams::new(SamplingStrategy::BeamSearch {
                beam_size: 5,
                patience: 1.0,
            });
            params.set_language(Some(&language));
            params.set_translate(false);
            if !prompt.is_empty() {
                params.set_initial_prompt(&prompt);
            }
            params.set_print_progress(false);
            params.set_print_special(false);
            params.set_print_realtime(false);
            params.set_print_timestamps(false);
            params.set_single_segment(false);
            // Non-speech suppression happens inside whisper.cpp; segments
            // that survive decoding are reported with probability 0.
            params.set_no_speech_thold(0.6);
            params.set_suppress_blank(true);

            state
                .full(params, &audio)
                .map_err(|e| anyhow::anyhow!("Whisper transcription failed: {}", e))?;

            let n_segments = state.full_n_segments();
            let mut out = Vec::with_capacity(n_segments as usize);
            for i in 0..n_segments {
                if let Some(segment) = state.get_segment(i)
                    && let Ok(text) = segment.to_str()
                {
                    out.push(AsrSegment {
                        text: text.to_string(),
                        no_speech_prob: 0.0,
                    });
                }
            }

            debug!(segments = out.len(), "Whisper transcription complete");
            Ok(out)
        })
        .await
        .map_err(|e| anyhow::anyhow!("Whisper task join error: {}", e))??;

        Ok(segments)
    }

    fn name(&self) -> &str {
        "local_whisper"
    }
}

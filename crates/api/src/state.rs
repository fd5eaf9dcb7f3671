use std::sync::Arc;

use tracing::{info, warn};

use meetflow_config::Settings;
use meetflow_transcription::asr::AsrBackend;
use meetflow_transcription::asr::remote_http::RemoteHttpBackend;
use meetflow_transcription::asr::stub::StubAsrBackend;
use meetflow_transcription::polish::PolishBackend;
use meetflow_transcription::polish::remote_http::HttpPolishBackend;
use meetflow_transcription::polish::stub::StubPolishBackend;
use meetflow_transcription::{AsrClient, CorrectionMap, HallucinationFilter};

use crate::storage::{AudioStore, HttpAudioStore, LocalAudioStore};

/// Shared application state handed to every WebSocket session.
///
/// Sessions depend only on the capability seams (ASR client, polish
/// backend, audio store), never on a concrete backend.
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub asr: AsrClient,
    pub polish: Arc<dyn PolishBackend>,
    pub audio_store: Arc<dyn AudioStore>,
}

impl AppState {
    /// Assembles state from explicit parts. Tests use this to inject stubs.
    pub fn new(
        settings: Settings,
        asr: AsrClient,
        polish: Arc<dyn PolishBackend>,
        audio_store: Arc<dyn AudioStore>,
    ) -> Self {
        Self {
            settings: Arc::new(settings),
            asr,
            polish,
            audio_store,
        }
    }

    /// Builds state from settings, selecting backends by configuration.
    pub fn from_settings(settings: Settings) -> anyhow::Result<Self> {
        let corrections = match &settings.asr.corrections_path {
            Some(path) => Arc::new(CorrectionMap::load(path)?),
            None => Arc::new(CorrectionMap::empty()),
        };
        let filter = Arc::new(HallucinationFilter::new(
            &settings.asr.extra_substring_blacklist,
            &settings.asr.extra_exact_blacklist,
        ));

        let backend: Arc<dyn AsrBackend> = match settings.asr.backend.as_str() {
            "remote_http" => {
                let endpoint = settings.asr.endpoint.as_deref().ok_or_else(|| {
                    anyhow::anyhow!("asr.endpoint is required for the remote_http backend")
                })?;
                Arc::new(RemoteHttpBackend::new(endpoint))
            }
            #[cfg(feature = "local-whisper")]
            "local_whisper" => {
                let model_path = settings.asr.model_path.as_deref().ok_or_else(|| {
                    anyhow::anyhow!("asr.model_path is required for the local_whisper backend")
                })?;
                Arc::new(
                    meetflow_transcription::asr::local_whisper::LocalWhisperBackend::new(
                        model_path,
                    )?,
                )
            }
            "stub" => {
                warn!("Using the stub ASR backend; transcripts will be empty");
                Arc::new(StubAsrBackend::with_segments(Vec::new()))
            }
            other => anyhow::bail!("Unknown ASR backend '{}'", other),
        };

        info!(backend = backend.name(), "ASR backend selected");
        let asr = AsrClient::new(backend, corrections, filter);

        let polish: Arc<dyn PolishBackend> = match &settings.polish.endpoint {
            Some(endpoint) => Arc::new(HttpPolishBackend::new(endpoint)?),
            None => {
                warn!("No polish endpoint configured; using the echo stub");
                Arc::new(StubPolishBackend::echo())
            }
        };

        let audio_store: Arc<dyn AudioStore> = match &settings.audio.store_endpoint {
            Some(endpoint) => Arc::new(HttpAudioStore::new(endpoint)?),
            None => Arc::new(LocalAudioStore),
        };

        Ok(Self {
            settings: Arc::new(settings),
            asr,
            polish,
            audio_store,
        })
    }
}

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

/// Top-level application settings.
///
/// Loaded from `config/default.toml` (optional) with `MEETFLOW__`-prefixed
/// environment variables layered on top, e.g. `MEETFLOW__SERVER__PORT=9000`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub server: ServerSettings,
    pub asr: AsrSettings,
    pub polish: PolishSettings,
    pub vad: VadSettings,
    pub audio: AudioSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AsrSettings {
    /// ASR backend to use: "remote_http", "local_whisper", "stub".
    pub backend: String,
    /// Remote ASR service base URL (for the remote_http backend).
    pub endpoint: Option<String>,
    /// Path to a Whisper GGML model (for the local_whisper backend).
    pub model_path: Option<String>,
    /// Path to the keyword-correction JSON map. None disables corrections.
    pub corrections_path: Option<String>,
    /// Extra substring-blacklist entries for the hallucination filter.
    #[serde(default)]
    pub extra_substring_blacklist: Vec<String>,
    /// Extra exact-match-blacklist entries for the hallucination filter.
    #[serde(default)]
    pub extra_exact_blacklist: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolishSettings {
    /// LLM polish/translate service base URL. None selects the stub backend.
    pub endpoint: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VadSettings {
    /// Speech probability threshold for the neural scorer (0.0-1.0).
    pub silence_threshold: f32,
    /// Seconds of silence that close an utterance.
    pub min_silence_secs: f64,
    /// Windows shorter than this are discarded at flush.
    pub min_speech_secs: f64,
    /// Maximum window length before a forced split.
    pub max_window_secs: f64,
    /// Seconds after the first audio frame during which every chunk is
    /// treated as speech (suppresses initial clipping). 0 disables.
    pub clip_guard_secs: f64,
    /// Path to the Silero VAD ONNX model (silero-vad feature builds only).
    pub model_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioSettings {
    /// Directory where session WAV recordings are written.
    pub save_dir: String,
    /// Blob-store base URL for uploading recordings at session close.
    /// None keeps recordings on the local filesystem only.
    pub store_endpoint: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerSettings {
                host: "0.0.0.0".to_string(),
                port: 8080,
            },
            asr: AsrSettings {
                backend: "remote_http".to_string(),
                endpoint: None,
                model_path: None,
                corrections_path: None,
                extra_substring_blacklist: Vec::new(),
                extra_exact_blacklist: Vec::new(),
            },
            polish: PolishSettings { endpoint: None },
            vad: VadSettings {
                silence_threshold: 0.3,
                min_silence_secs: 0.6,
                min_speech_secs: 0.5,
                max_window_secs: 7.0,
                clip_guard_secs: 3.0,
                model_path: None,
            },
            audio: AudioSettings {
                save_dir: "recordings".to_string(),
                store_endpoint: None,
            },
        }
    }
}

impl Settings {
    /// Loads settings from the optional config file and the environment.
    pub fn load() -> Result<Self, ConfigError> {
        let defaults = Config::try_from(&Settings::default())?;

        Config::builder()
            .add_source(defaults)
            .add_source(File::with_name("config/default").required(false))
            .add_source(
                Environment::with_prefix("MEETFLOW")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()
    }
}

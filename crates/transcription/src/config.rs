use serde::{Deserialize, Serialize};

/// Tunables for the VAD segmentation buffer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VadConfig {
    /// Input sample rate. The WS protocol fixes this at 16 kHz.
    pub sample_rate: u32,
    /// Speech probability threshold for the neural scorer (0.0-1.0).
    pub silence_threshold: f32,
    /// Seconds of continuous silence that close an utterance.
    pub min_silence_secs: f64,
    /// Windows shorter than this are discarded at flush.
    pub min_speech_secs: f64,
    /// Maximum window length in seconds before a forced split.
    pub max_window_secs: f64,
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16000,
            silence_threshold: 0.3,
            min_silence_secs: 0.6,
            min_speech_secs: 0.5,
            max_window_secs: 7.0,
        }
    }
}

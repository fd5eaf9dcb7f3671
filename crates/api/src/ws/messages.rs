use serde::{Deserialize, Serialize};

/// Session operating mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionMode {
    /// Finalised transcripts are polished and translated by the LLM.
    #[default]
    Transcription,
    /// Finalised transcripts are matched against a pre-loaded script.
    Alignment,
}

/// Client → server control frames (text frames; audio arrives as binary).
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Sticky session configuration; all fields optional.
    Config(ConfigUpdate),
    /// Client keepalive; answered with `pong`.
    Ping,
    /// Reply to a server ping; consumed silently.
    Pong,
    /// Alignment mode: jump to the next speaker zone.
    AdvanceSpeaker,
    /// Alignment mode: jump back to the previous speaker zone.
    PreviousSpeaker,
}

#[derive(Debug, Default, Deserialize)]
pub struct ConfigUpdate {
    pub source_lang: Option<String>,
    pub target_lang: Option<String>,
    /// Context prompt; in alignment mode this carries the script text.
    pub initial_prompt: Option<String>,
    pub meeting_id: Option<String>,
    /// Seconds of the previous window prepended to the next final ASR call.
    pub overlap_duration: Option<f64>,
    pub mode: Option<SessionMode>,
}

/// Server → client events.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// In-flight best-effort transcript for the current segment.
    Partial { id: String, content: String },
    /// Finalised ASR output; empty content clears a displayed partial.
    Raw { id: String, content: String },
    /// Refined + translated text, or a matched script line.
    Polished {
        id: String,
        content: String,
        translated: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        low_confidence: Option<bool>,
        #[serde(skip_serializing_if = "Option::is_none")]
        speaker: Option<String>,
    },
    Error { id: String, content: String },
    /// Server keepalive.
    Ping,
    /// Reply to a client ping.
    Pong,
}

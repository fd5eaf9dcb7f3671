use thiserror::Error;

/// Session-scoped failure kinds.
///
/// None of these are process-fatal. The session loop applies a per-kind
/// policy: disconnects drain the session, ASR failures degrade to an empty
/// transcript, polish failures surface a typed error event, and storage
/// failures fall back to the local recording path.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("client disconnected")]
    ClientDisconnect,

    #[error("ASR backend unavailable: {0}")]
    AsrUnavailable(String),

    #[error("ASR call exceeded its deadline")]
    AsrTimeout,

    #[error("polishing failed: {0}")]
    PolishFailed(String),

    #[error("bad config frame: {0}")]
    BadConfig(String),

    #[error("script parsed to zero segments")]
    ScriptParseEmpty,

    #[error("audio storage unavailable: {0}")]
    StorageUnavailable(String),
}

use async_trait::async_trait;

use super::{PolishBackend, PolishRequest, PolishedText};

/// In-process polish backend for tests and offline development.
pub enum StubPolishBackend {
    /// Echoes the input text, tagging the translation with the target lang.
    Echo,
    /// Always returns the same refined/translated pair.
    Fixed { refined: String, translated: String },
    /// Fails every call.
    Failing,
}

impl StubPolishBackend {
    pub fn echo() -> Self {
        Self::Echo
    }

    pub fn fixed(refined: &str, translated: &str) -> Self {
        Self::Fixed {
            refined: refined.to_string(),
            translated: translated.to_string(),
        }
    }

    pub fn failing() -> Self {
        Self::Failing
    }
}

#[async_trait]
impl PolishBackend for StubPolishBackend {
    async fn polish(&self, request: PolishRequest) -> anyhow::Result<PolishedText> {
        match self {
            Self::Echo => Ok(PolishedText {
                refined: request.text.clone(),
                translated: format!("[{}] {}", request.target_lang, request.text),
            }),
            Self::Fixed {
                refined,
                translated,
            } => Ok(PolishedText {
                refined: refined.clone(),
                translated: translated.clone(),
            }),
            Self::Failing => anyhow::bail!("stub polish backend configured to fail"),
        }
    }

    fn name(&self) -> &str {
        "stub"
    }
}

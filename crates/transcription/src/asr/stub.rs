use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::{AsrBackend, AsrRequest, AsrSegment};

/// Deterministic in-process ASR backend for tests and offline development.
///
/// Serves scripted responses in order, then a fixed fallback. Records the
/// last prompt it received so tests can assert on prompt composition.
pub struct StubAsrBackend {
    script: Mutex<VecDeque<Vec<AsrSegment>>>,
    fallback: Option<Vec<AsrSegment>>,
    fail: bool,
    last_prompt: Arc<Mutex<String>>,
}

impl StubAsrBackend {
    /// Always returns the same single-segment text.
    pub fn fixed(text: &str) -> Self {
        Self::with_segments(vec![AsrSegment {
            text: text.to_string(),
            no_speech_prob: 0.0,
        }])
    }

    /// Always returns the given segments.
    pub fn with_segments(segments: Vec<AsrSegment>) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: Some(segments),
            fail: false,
            last_prompt: Arc::new(Mutex::new(String::new())),
        }
    }

    /// Returns each text once in order, then empty results.
    pub fn scripted<I, S>(texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let script = texts
            .into_iter()
            .map(|t| {
                vec![AsrSegment {
                    text: t.into(),
                    no_speech_prob: 0.0,
                }]
            })
            .collect();
        Self {
            script: Mutex::new(script),
            fallback: None,
            fail: false,
            last_prompt: Arc::new(Mutex::new(String::new())),
        }
    }

    /// Fails every call.
    pub fn failing() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: None,
            fail: true,
            last_prompt: Arc::new(Mutex::new(String::new())),
        }
    }

    /// Handle observing the most recent prompt passed to `transcribe`.
    pub fn prompt_probe(&self) -> Arc<Mutex<String>> {
        Arc::clone(&self.last_prompt)
    }
}

#[async_trait]
impl AsrBackend for StubAsrBackend {
    async fn transcribe(&self, request: AsrRequest) -> anyhow::Result<Vec<AsrSegment>> {
        if let Ok(mut prompt) = self.last_prompt.lock() {
            *prompt = request.initial_prompt;
        }

        if self.fail {
            anyhow::bail!("stub backend configured to fail");
        }

        if let Ok(mut script) = self.script.lock()
            && let Some(next) = script.pop_front()
        {
            return Ok(next);
        }

        Ok(self.fallback.clone().unwrap_or_default())
    }

    fn name(&self) -> &str {
        "stub"
    }
}

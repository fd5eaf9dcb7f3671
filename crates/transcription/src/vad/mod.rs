pub mod scorer;

pub use scorer::SpeechScorer;

#[cfg(feature = "silero-vad")]
pub use scorer::SileroScorer;

use tracing::{debug, warn};

use crate::config::VadConfig;

/// Samples per scorer sub-window (32 ms at 16 kHz).
const SCORER_WINDOW: usize = 512;
/// Chunks quieter than this are silence even when the scorer says speech.
const SPEECH_RMS_FLOOR: f32 = 0.001;
/// Energy-fallback speech threshold.
const ENERGY_SPEECH_RMS: f32 = 0.005;
/// Flushed windows quieter than this are discarded.
const SILENT_WINDOW_RMS: f32 = 1e-4;

/// Converts little-endian PCM16 bytes to f32 samples in [-1.0, 1.0].
///
/// A trailing odd byte is ignored; callers validate frame parity upstream.
pub fn pcm16le_to_f32(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / 32768.0)
        .collect()
}

/// Root-mean-square level of a sample slice.
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f32 = samples.iter().map(|s| s * s).sum();
    (sum_sq / samples.len() as f32).sqrt()
}

/// Voice-activity segmentation buffer.
///
/// Accumulates raw PCM16LE chunks, classifies each chunk as speech or
/// silence, and emits the accumulated window when a silence gap or the
/// maximum window length is reached. `snapshot` exposes the in-flight
/// buffer for partial transcription without disturbing state.
pub struct VadBuffer {
    config: VadConfig,
    buf: Vec<u8>,
    silence_duration: f64,
    total_duration: f64,
    scorer: Option<Box<dyn SpeechScorer>>,
    /// Set once the primary scorer has failed; the buffer then runs on the
    /// energy fallback for the rest of the session.
    scorer_poisoned: bool,
}

impl VadBuffer {
    /// Creates a buffer using the energy fallback only.
    pub fn new(config: VadConfig) -> Self {
        Self::with_scorer(config, None)
    }

    /// Creates a buffer with a primary speech scorer. The energy fallback
    /// takes over permanently if the scorer ever errors.
    pub fn with_scorer(config: VadConfig, scorer: Option<Box<dyn SpeechScorer>>) -> Self {
        Self {
            config,
            buf: Vec::new(),
            silence_duration: 0.0,
            total_duration: 0.0,
            scorer,
            scorer_poisoned: false,
        }
    }

    /// Seconds of audio currently buffered.
    pub fn buffered_secs(&self) -> f64 {
        self.total_duration
    }

    /// Appends one chunk and returns the closed window when a split point
    /// is reached.
    ///
    /// The chunk is buffered regardless of its speech verdict. An empty
    /// chunk leaves all state untouched.
    pub fn process_chunk(&mut self, chunk: &[u8], force_speech: bool) -> Option<Vec<u8>> {
        if chunk.is_empty() {
            return None;
        }

        self.buf.extend_from_slice(chunk);

        let samples = pcm16le_to_f32(chunk);
        let chunk_rms = rms(&samples);
        let chunk_duration = samples.len() as f64 / self.config.sample_rate as f64;
        self.total_duration += chunk_duration;

        let is_speech = if force_speech {
            true
        } else {
            self.classify(&samples, chunk_rms)
        };

        if is_speech {
            self.silence_duration = 0.0;
        } else {
            self.silence_duration += chunk_duration;
        }

        let silence_split = self.total_duration > 1.0
            && self.silence_duration >= self.config.min_silence_secs;
        let max_split = self.total_duration >= self.config.max_window_secs;

        if silence_split || max_split {
            debug!(
                total_secs = self.total_duration,
                silence_secs = self.silence_duration,
                by_silence = silence_split,
                "VAD split"
            );
            return self.flush();
        }

        None
    }

    /// Returns the buffered window and resets state.
    ///
    /// Windows shorter than `min_speech_secs` or quieter than the silent
    /// floor are discarded: both are reliable hallucination sources.
    pub fn flush(&mut self) -> Option<Vec<u8>> {
        if self.buf.is_empty() {
            return None;
        }

        let samples = pcm16le_to_f32(&self.buf);
        let window_rms = rms(&samples);
        let duration = samples.len() as f64 / self.config.sample_rate as f64;

        self.silence_duration = 0.0;
        self.total_duration = 0.0;

        if duration < self.config.min_speech_secs {
            debug!(duration_secs = duration, rms = window_rms, "Window too short, discarded");
            self.buf.clear();
            return None;
        }

        if window_rms < SILENT_WINDOW_RMS {
            debug!(duration_secs = duration, rms = window_rms, "Window silent, discarded");
            self.buf.clear();
            return None;
        }

        Some(std::mem::take(&mut self.buf))
    }

    /// Copy of the in-flight buffer, or `None` when empty. Never mutates.
    pub fn snapshot(&self) -> Option<Vec<u8>> {
        if self.buf.is_empty() {
            None
        } else {
            Some(self.buf.clone())
        }
    }

    /// Per-chunk speech verdict: primary scorer OR'd over 512-sample
    /// sub-windows, with an RMS floor that vetoes near-silent "speech".
    fn classify(&mut self, samples: &[f32], chunk_rms: f32) -> bool {
        if !self.scorer_poisoned
            && let Some(scorer) = self.scorer.as_mut()
        {
            match score_windows(scorer.as_mut(), samples, self.config.silence_threshold) {
                Ok(speech) => return speech && chunk_rms >= SPEECH_RMS_FLOOR,
                Err(e) => {
                    warn!(error = %e, "Speech scorer failed, falling back to energy VAD");
                    self.scorer_poisoned = true;
                }
            }
        }
        chunk_rms > ENERGY_SPEECH_RMS
    }
}

/// OR over 512-sample sub-windows; the tail window is zero-padded.
fn score_windows(
    scorer: &mut dyn SpeechScorer,
    samples: &[f32],
    threshold: f32,
) -> anyhow::Result<bool> {
    let mut padded = [0.0f32; SCORER_WINDOW];
    for window in samples.chunks(SCORER_WINDOW) {
        let frame: &[f32] = if window.len() == SCORER_WINDOW {
            window
        } else {
            padded[..window.len()].copy_from_slice(window);
            padded[window.len()..].fill(0.0);
            &padded
        };
        if scorer.score(frame)? > threshold {
            return Ok(true);
        }
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    const RATE: usize = 16000;

    /// 250 ms of PCM16 at a given amplitude (sine burst for speech, zeros
    /// for silence).
    fn chunk(amplitude: f32) -> Vec<u8> {
        let samples = RATE / 4;
        let mut bytes = Vec::with_capacity(samples * 2);
        for n in 0..samples {
            let v = if amplitude == 0.0 {
                0.0
            } else {
                // RMS of a sine is amplitude / sqrt(2)
                amplitude * std::f32::consts::SQRT_2
                    * (2.0 * std::f32::consts::PI * 440.0 * n as f32 / RATE as f32).sin()
            };
            bytes.extend_from_slice(&((v * 32767.0) as i16).to_le_bytes());
        }
        bytes
    }

    fn default_buffer() -> VadBuffer {
        VadBuffer::new(VadConfig::default())
    }

    #[test]
    fn splits_on_silence_gap() {
        let mut vad = default_buffer();

        // 3.0 s of speech
        let mut window = None;
        for _ in 0..12 {
            window = vad.process_chunk(&chunk(0.1), false);
            assert!(window.is_none(), "no split during continuous speech");
        }
        // 0.8 s of silence; the split fires once 0.6 s have accumulated
        for _ in 0..4 {
            if let Some(w) = vad.process_chunk(&chunk(0.0), false) {
                window = Some(w);
                break;
            }
        }

        let window = window.expect("silence gap should close the window");
        let duration = window.len() as f64 / (RATE as f64 * 2.0);
        assert!(
            (3.0..=3.8).contains(&duration),
            "window duration {duration:.2}s out of range"
        );
        assert!(vad.snapshot().is_none(), "buffer must be empty after emission");
    }

    #[test]
    fn splits_on_max_duration() {
        let mut vad = default_buffer();

        let mut first = None;
        for _ in 0..32 {
            // 8.0 s of continuous speech
            if let Some(w) = vad.process_chunk(&chunk(0.1), false) {
                first = Some(w);
                break;
            }
        }

        let first = first.expect("max-duration split expected");
        let duration = first.len() as f64 / (RATE as f64 * 2.0);
        assert!(
            (6.8..=7.0).contains(&duration),
            "first window duration {duration:.2}s out of range"
        );

        // Remainder stays buffered and is visible via snapshot
        for _ in 0..4 {
            assert!(vad.process_chunk(&chunk(0.1), false).is_none());
        }
        let rest = vad.snapshot().expect("remainder should be buffered");
        let rest_secs = rest.len() as f64 / (RATE as f64 * 2.0);
        assert!(rest_secs >= 1.0);
    }

    #[test]
    fn exact_max_duration_triggers_split() {
        let mut vad = default_buffer();
        // 28 x 250 ms = exactly 7.0 s
        for i in 0..27 {
            assert!(
                vad.process_chunk(&chunk(0.1), false).is_none(),
                "premature split at chunk {i}"
            );
        }
        assert!(vad.process_chunk(&chunk(0.1), false).is_some());
    }

    #[test]
    fn empty_chunk_is_a_no_op() {
        let mut vad = default_buffer();
        vad.process_chunk(&chunk(0.1), false);
        let before = vad.buffered_secs();
        assert!(vad.process_chunk(&[], false).is_none());
        assert_eq!(vad.buffered_secs(), before);
    }

    #[test]
    fn short_window_is_discarded() {
        let mut vad = default_buffer();
        vad.process_chunk(&chunk(0.1), false);
        // 0.25 s < min_speech_secs
        assert!(vad.flush().is_none());
        assert!(vad.snapshot().is_none());
    }

    #[test]
    fn silent_window_is_discarded() {
        let mut vad = default_buffer();
        for _ in 0..8 {
            // 2 s of pure zeros never classifies as speech, but force the
            // buffer to hold it and flush manually
            vad.process_chunk(&chunk(0.0), true);
        }
        assert!(vad.flush().is_none());
    }

    #[test]
    fn force_speech_overrides_silence() {
        let mut vad = default_buffer();
        for _ in 0..8 {
            assert!(vad.process_chunk(&chunk(0.0), true).is_none());
        }
        // Without forcing, 2 s of zeros would have split after 0.6 s
        assert!(vad.buffered_secs() > 1.9);
    }

    #[test]
    fn snapshot_does_not_mutate() {
        let mut vad = default_buffer();
        vad.process_chunk(&chunk(0.1), false);
        let a = vad.snapshot().unwrap();
        let b = vad.snapshot().unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), RATE / 4 * 2);
    }

    struct FailingScorer;

    impl SpeechScorer for FailingScorer {
        fn score(&mut self, _frame: &[f32]) -> anyhow::Result<f32> {
            anyhow::bail!("model exploded")
        }

        fn name(&self) -> &'static str {
            "failing"
        }
    }

    #[test]
    fn scorer_failure_falls_back_to_energy() {
        let mut vad = VadBuffer::with_scorer(VadConfig::default(), Some(Box::new(FailingScorer)));

        // Speech via the energy fallback, then silence closes the window
        for _ in 0..12 {
            assert!(vad.process_chunk(&chunk(0.1), false).is_none());
        }
        let mut window = None;
        for _ in 0..4 {
            if let Some(w) = vad.process_chunk(&chunk(0.0), false) {
                window = Some(w);
                break;
            }
        }
        assert!(window.is_some(), "energy fallback should still split");
    }

    struct QuietSpeechScorer;

    impl SpeechScorer for QuietSpeechScorer {
        fn score(&mut self, _frame: &[f32]) -> anyhow::Result<f32> {
            Ok(0.99)
        }

        fn name(&self) -> &'static str {
            "always-speech"
        }
    }

    #[test]
    fn rms_floor_vetoes_near_silent_speech_verdicts() {
        let mut vad =
            VadBuffer::with_scorer(VadConfig::default(), Some(Box::new(QuietSpeechScorer)));

        // Scorer claims speech on pure zeros; the RMS floor overrides it,
        // so silence accumulates and splits after 1 s + 0.6 s
        let mut split = false;
        for _ in 0..8 {
            if vad.process_chunk(&chunk(0.0), false).is_some() {
                split = true;
                break;
            }
        }
        // The window itself is silent, so flush discards it; what matters
        // is that silence accumulated at all (no split means flush ran and
        // discarded, which also proves the override)
        assert!(!split, "silent window must be discarded at flush");
        assert!(vad.snapshot().is_none() || vad.buffered_secs() < 2.0);
    }
}

/// Per-frame speech probability source for the VAD buffer.
///
/// Implementations score one 512-sample 16 kHz frame at a time and may keep
/// recurrent state across calls. Errors poison the scorer: the buffer
/// switches to its energy fallback for the rest of the session.
pub trait SpeechScorer: Send + Sync {
    /// Speech probability in [0.0, 1.0] for one 512-sample frame.
    fn score(&mut self, frame: &[f32]) -> anyhow::Result<f32>;

    /// Human-readable scorer name.
    fn name(&self) -> &'static str;
}

#[cfg(feature = "silero-vad")]
pub use silero::SileroScorer;

#[cfg(feature = "silero-vad")]
mod silero {
    use ndarray::{Array1, Array2, Array3};
    use ort::session::Session;
    use ort::value::Tensor;
    use tracing::info;

    use super::SpeechScorer;

    /// Silero VAD v5 via ONNX Runtime.
    ///
    /// The model takes the raw waveform directly (no filterbank) and keeps
    /// an LSTM state of shape [2, 1, 128] across frames.
    pub struct SileroScorer {
        session: Session,
        state: Array3<f32>,
    }

    impl SileroScorer {
        pub fn new(model_path: &str) -> anyhow::Result<Self> {
            info!(model_path, "Loading Silero VAD model");
            let session = Session::builder()
                .map_err(|e| anyhow::anyhow!("Failed to create ONNX session builder: {}", e))?
                .with_intra_threads(1)
                .map_err(|e| anyhow::anyhow!("Failed to configure ONNX session: {}", e))?
                .commit_from_file(model_path)
                .map_err(|e| {
                    anyhow::anyhow!("Failed to load VAD model '{}': {}", model_path, e)
                })?;

            Ok(Self {
                session,
                state: Array3::zeros((2, 1, 128)),
            })
        }
    }

    impl SpeechScorer for SileroScorer {
        fn score(&mut self, frame: &[f32]) -> anyhow::Result<f32> {
            let input = Array2::from_shape_vec((1, frame.len()), frame.to_vec())
                .map_err(|e| anyhow::anyhow!("Bad VAD input shape: {}", e))?;
            let sr = Array1::from_vec(vec![16000i64]);

            let outputs = self
                .session
                .run(ort::inputs![
                    "input" => Tensor::from_array(input)
                        .map_err(|e| anyhow::anyhow!("VAD input tensor: {}", e))?,
                    "state" => Tensor::from_array(self.state.clone())
                        .map_err(|e| anyhow::anyhow!("VAD state tensor: {}", e))?,
                    "sr" => Tensor::from_array(sr)
                        .map_err(|e| anyhow::anyhow!("VAD sr tensor: {}", e))?,
                ])
                .map_err(|e| anyhow::anyhow!("VAD inference failed: {}", e))?;

            let (_, probs) = outputs["output"]
                .try_extract_tensor::<f32>()
                .map_err(|e| anyhow::anyhow!("VAD output tensor: {}", e))?;
            let prob = probs
                .first()
                .copied()
                .ok_or_else(|| anyhow::anyhow!("VAD model returned no probability"))?;

            let (state_shape, state_data) = outputs["stateN"]
                .try_extract_tensor::<f32>()
                .map_err(|e| anyhow::anyhow!("VAD stateN tensor: {}", e))?;
            let dims: Vec<usize> = state_shape.iter().map(|d| *d as usize).collect();
            if dims == [2, 1, 128] {
                self.state = Array3::from_shape_vec((2, 1, 128), state_data.to_vec())
                    .map_err(|e| anyhow::anyhow!("Bad VAD state shape: {}", e))?;
            }

            Ok(prob)
        }

        fn name(&self) -> &'static str {
            "silero"
        }
    }
}

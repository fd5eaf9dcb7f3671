pub mod asr;
pub mod config;
pub mod corrections;
pub mod hallucination;
pub mod polish;
pub mod vad;

pub use asr::{AsrBackend, AsrClient, AsrRequest, AsrSegment};
pub use config::VadConfig;
pub use corrections::CorrectionMap;
pub use hallucination::HallucinationFilter;
pub use polish::{PolishBackend, PolishRequest, PolishedText};
pub use vad::VadBuffer;

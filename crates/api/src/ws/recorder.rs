use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use hound::{SampleFormat, WavSpec, WavWriter};

/// WAV sink for the raw client audio.
///
/// Bytes are written as received without transcoding; the WS protocol
/// contracts the client to PCM16LE mono at 16 kHz. Frame parity is
/// validated by the session before bytes reach the recorder.
pub struct WavRecorder {
    writer: WavWriter<BufWriter<File>>,
    path: PathBuf,
}

impl WavRecorder {
    pub fn create(path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                anyhow::anyhow!("Failed to create recording dir '{}': {}", parent.display(), e)
            })?;
        }

        let spec = WavSpec {
            channels: 1,
            sample_rate: 16000,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let writer = WavWriter::create(&path, spec).map_err(|e| {
            anyhow::anyhow!("Failed to open WAV '{}': {}", path.display(), e)
        })?;

        Ok(Self { writer, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends raw PCM16LE bytes.
    pub fn write_bytes(&mut self, bytes: &[u8]) -> anyhow::Result<()> {
        for pair in bytes.chunks_exact(2) {
            self.writer
                .write_sample(i16::from_le_bytes([pair[0], pair[1]]))
                .map_err(|e| anyhow::anyhow!("WAV write failed: {}", e))?;
        }
        Ok(())
    }

    /// Finalises the WAV header and returns the file path.
    pub fn finalize(self) -> anyhow::Result<PathBuf> {
        let path = self.path;
        self.writer
            .finalize()
            .map_err(|e| anyhow::anyhow!("Failed to finalise WAV '{}': {}", path.display(), e))?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn written_bytes_survive_a_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.wav");

        let samples: Vec<i16> = vec![0, 1000, -1000, i16::MAX, i16::MIN];
        let bytes: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();

        let mut recorder = WavRecorder::create(&path).unwrap();
        recorder.write_bytes(&bytes).unwrap();
        let written = recorder.finalize().unwrap();

        let mut reader = hound::WavReader::open(&written).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.channels, 1);
        assert_eq!(spec.sample_rate, 16000);
        assert_eq!(spec.bits_per_sample, 16);
        let read: Vec<i16> = reader.samples::<i16>().map(Result::unwrap).collect();
        assert_eq!(read, samples);
    }

    #[test]
    fn creates_missing_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("deep").join("session.wav");
        let recorder = WavRecorder::create(&path).unwrap();
        assert!(recorder.path().parent().unwrap().exists());
    }
}

use std::collections::BTreeMap;
use std::path::Path;

use tracing::info;

/// Keyword-correction map applied to raw ASR output.
///
/// Plain substring substitution, loaded once at startup from a JSON object
/// file (`{"wrong": "right", ...}`). Loading rejects maps where any
/// replacement value contains a key: such rewrites would cascade across
/// applications, and a valid map applies idempotently.
#[derive(Debug, Default)]
pub struct CorrectionMap {
    entries: Vec<(String, String)>,
}

impl CorrectionMap {
    /// An empty map; `apply` is the identity.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Loads a correction map from a JSON object file.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            anyhow::anyhow!(
                "Failed to read corrections '{}': {}",
                path.as_ref().display(),
                e
            )
        })?;
        let raw: BTreeMap<String, String> = serde_json::from_str(&content).map_err(|e| {
            anyhow::anyhow!(
                "Failed to parse corrections '{}': {}",
                path.as_ref().display(),
                e
            )
        })?;
        let map = Self::from_pairs(raw)?;
        info!(entries = map.len(), "Keyword corrections loaded");
        Ok(map)
    }

    /// Builds a map from pairs, validating against cyclic rewrites.
    pub fn from_pairs(pairs: impl IntoIterator<Item = (String, String)>) -> anyhow::Result<Self> {
        let entries: Vec<(String, String)> = pairs
            .into_iter()
            .filter(|(k, _)| !k.is_empty())
            .collect();

        for (_, replacement) in &entries {
            for (key, _) in &entries {
                if replacement.contains(key.as_str()) {
                    anyhow::bail!(
                        "Cyclic keyword correction: replacement '{}' contains key '{}'",
                        replacement,
                        key
                    );
                }
            }
        }

        Ok(Self { entries })
    }

    /// Applies every correction to the text.
    pub fn apply(&self, text: &str) -> String {
        let mut out = text.to_string();
        for (wrong, right) in &self.entries {
            if out.contains(wrong.as_str()) {
                out = out.replace(wrong.as_str(), right);
            }
        }
        out
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

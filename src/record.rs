//! Persisted reference outputs of the original model.

use std::{
    collections::BTreeMap,
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::logits::{Logits, LogitsError};

/// File name of the reference record inside a save directory.
pub const REFERENCE_FILE: &str = "config.json";

/// Errors raised while reading or writing a [`ReferenceRecord`].
#[derive(Debug, Error)]
pub enum RecordError {
    #[error("reference record not found at {path}")]
    MissingReference { path: PathBuf },
    #[error("failed to access reference record {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("reference record {path} is not valid JSON: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("reference logits are malformed: {0}")]
    Logits(#[from] LogitsError),
}

/// Outputs of the original model on the canonical probe, plus provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceRecord {
    /// Identifier of the model the reference came from.
    pub original_model_name: String,
    /// Architecture tag declared by that model.
    pub architecture_type: String,
    /// Batch-major logits, rounded to four decimal places.
    pub original_logits: Vec<Vec<f32>>,
    /// SHA-256 digests of the artifacts written alongside the record.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub artifacts: BTreeMap<String, String>,
}

impl ReferenceRecord {
    /// Path of the record inside `dir`.
    #[must_use]
    pub fn path_in(dir: &Path) -> PathBuf {
        dir.join(REFERENCE_FILE)
    }

    /// Reference logits as a tensor.
    ///
    /// # Errors
    ///
    /// Returns [`RecordError::Logits`] when the stored rows are ragged.
    pub fn logits(&self) -> Result<Logits, RecordError> {
        Ok(Logits::from_rows(&self.original_logits)?)
    }

    /// Recorded digest for the artifact called `name`.
    #[must_use]
    pub fn checksum(&self, name: &str) -> Option<&str> {
        self.artifacts.get(name).map(String::as_str)
    }

    /// Read the record stored in `dir`.
    ///
    /// # Errors
    ///
    /// Returns [`RecordError::MissingReference`] when `dir` holds no record,
    /// and [`RecordError::Io`] or [`RecordError::Json`] when it cannot be read.
    pub fn load(dir: &Path) -> Result<Self, RecordError> {
        let path = Self::path_in(dir);
        let raw = fs::read_to_string(&path).map_err(|source| {
            if source.kind() == ErrorKind::NotFound {
                RecordError::MissingReference { path: path.clone() }
            } else {
                RecordError::Io {
                    path: path.clone(),
                    source,
                }
            }
        })?;
        let record = serde_json::from_str(&raw).map_err(|source| RecordError::Json {
            path: path.clone(),
            source,
        })?;
        debug!(path = %path.display(), "loaded reference record");
        Ok(record)
    }

    /// Write the record to `dir` as pretty-printed JSON, returning its path.
    ///
    /// # Errors
    ///
    /// Returns [`RecordError::Io`] when the file cannot be written.
    pub fn save(&self, dir: &Path) -> Result<PathBuf, RecordError> {
        let path = Self::path_in(dir);
        let body = serde_json::to_string_pretty(self).map_err(|source| RecordError::Json {
            path: path.clone(),
            source,
        })?;
        fs::write(&path, body).map_err(|source| RecordError::Io {
            path: path.clone(),
            source,
        })?;
        debug!(path = %path.display(), "wrote reference record");
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};
    use tempfile::TempDir;

    #[fixture]
    fn record() -> ReferenceRecord {
        ReferenceRecord {
            original_model_name: "knowledgator/gliclass-base-v1.0".to_owned(),
            architecture_type: "uni-encoder".to_owned(),
            original_logits: vec![vec![1.2345, -0.5, 3.0, -7.25]],
            artifacts: BTreeMap::new(),
        }
    }

    #[fixture]
    fn dir() -> TempDir {
        TempDir::new().unwrap_or_else(|e| panic!("create temp dir: {e}"))
    }

    #[rstest]
    fn save_then_load_preserves_record(record: ReferenceRecord, dir: TempDir) {
        let path = record
            .save(dir.path())
            .unwrap_or_else(|e| panic!("save record: {e}"));
        assert!(path.ends_with(REFERENCE_FILE));
        let loaded =
            ReferenceRecord::load(dir.path()).unwrap_or_else(|e| panic!("load record: {e}"));
        assert_eq!(loaded, record);
    }

    #[rstest]
    fn empty_artifact_map_is_omitted(record: ReferenceRecord) {
        let json = serde_json::to_string(&record).unwrap_or_else(|e| panic!("serialise: {e}"));
        assert!(!json.contains("artifacts"));
    }

    #[rstest]
    fn records_without_artifacts_still_parse() {
        let json = r#"{
            "original_model_name": "m",
            "architecture_type": "uni-encoder",
            "original_logits": [[0.1, 0.2]]
        }"#;
        let record: ReferenceRecord =
            serde_json::from_str(json).unwrap_or_else(|e| panic!("parse: {e}"));
        assert!(record.artifacts.is_empty());
        assert_eq!(record.checksum("multi-label-model.onnx"), None);
    }

    #[rstest]
    fn missing_file_is_missing_reference(dir: TempDir) {
        let result = ReferenceRecord::load(dir.path());
        assert!(matches!(result, Err(RecordError::MissingReference { .. })));
    }

    #[rstest]
    fn malformed_file_is_a_json_error(dir: TempDir) {
        fs::write(dir.path().join(REFERENCE_FILE), "{ not json")
            .unwrap_or_else(|e| panic!("write: {e}"));
        let result = ReferenceRecord::load(dir.path());
        assert!(matches!(result, Err(RecordError::Json { .. })));
    }
}

//! Inference pipeline: texts and candidate labels through the tokenizer, an
//! inference backend and the decoder.
//!
//! Texts are processed in passes of `batch_size`. Each pass tokenises its
//! slice, runs the backend once and decodes the returned logits, so the
//! backend never sees more than one pass worth of examples.

use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::{
    backend::{BackendError, InferenceBackend},
    config::{ConfigurationError, DecoderConfig},
    decode::{DecodeError, Decoder, PredictionSet},
    labels::LabelSet,
    mode::ClassificationMode,
    tokenize::{PromptTokenizer, TokenizeError},
};

/// Errors raised while classifying texts.
#[derive(Debug, Error)]
pub enum ClassifyError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("`same_labels` is {declared} but `labels` holds {found}")]
    LabelShape { declared: bool, found: &'static str },
    #[error("{texts} texts were given but `labels` holds {rows} label lists")]
    RowCount { texts: usize, rows: usize },
    #[error(transparent)]
    Tokenize(#[from] TokenizeError),
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error(transparent)]
    Decode(#[from] DecodeError),
}

/// A classification job as read from disk.
///
/// `labels` is either one list shared by every text or one list per text.
/// `same_labels`, when present, must agree with that shape.
///
/// # Examples
///
/// ```
/// use gliclass_onnx::classify::ClassificationInput;
///
/// let input: ClassificationInput = serde_json::from_str(
///     r#"{"texts": ["a", "b"], "labels": [["x"], ["y", "z"]], "same_labels": false}"#,
/// )
/// .unwrap();
/// assert!(input.check().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClassificationInput {
    pub texts: Vec<String>,
    pub labels: LabelSet,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub same_labels: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classification_type: Option<ClassificationMode>,
}

impl ClassificationInput {
    /// Read and check a JSON job file.
    ///
    /// # Errors
    ///
    /// Returns [`ClassifyError::Io`] or [`ClassifyError::Json`] when the file
    /// cannot be read or parsed, and the errors of [`Self::check`].
    pub fn load(path: &Path) -> Result<Self, ClassifyError> {
        let raw = fs::read_to_string(path).map_err(|source| ClassifyError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let input: Self = serde_json::from_str(&raw).map_err(|source| ClassifyError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        input.check()?;
        Ok(input)
    }

    /// Ensure the label shape agrees with `same_labels` and the text count.
    ///
    /// # Errors
    ///
    /// Returns [`ClassifyError::LabelShape`] or [`ClassifyError::RowCount`].
    pub fn check(&self) -> Result<(), ClassifyError> {
        if let Some(declared) = self.same_labels {
            if declared != self.labels.is_shared() {
                return Err(ClassifyError::LabelShape {
                    declared,
                    found: if self.labels.is_shared() {
                        "one shared list"
                    } else {
                        "one list per text"
                    },
                });
            }
        }
        check_rows(self.texts.len(), &self.labels)
    }
}

fn check_rows(texts: usize, labels: &LabelSet) -> Result<(), ClassifyError> {
    match labels.rows() {
        Some(rows) if rows != texts => Err(ClassifyError::RowCount { texts, rows }),
        _ => Ok(()),
    }
}

/// Predictions for one text, as written by `gliclass-classify`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextPredictions {
    pub text: String,
    pub predictions: PredictionSet,
}

/// Owns a tokenizer, a backend and a decoder and runs texts through all three.
#[derive(Debug)]
pub struct Classifier<T, B> {
    tokenizer: T,
    backend: B,
    decoder: Decoder,
}

impl<T: PromptTokenizer, B: InferenceBackend> Classifier<T, B> {
    /// Build a classifier.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError`] when `config` is invalid.
    pub fn new(tokenizer: T, backend: B, config: DecoderConfig) -> Result<Self, ConfigurationError> {
        Ok(Self {
            tokenizer,
            backend,
            decoder: Decoder::new(config)?,
        })
    }

    #[must_use]
    pub const fn config(&self) -> &DecoderConfig {
        self.decoder.config()
    }

    #[must_use]
    pub const fn backend(&self) -> &B {
        &self.backend
    }

    /// Classify `texts` against `labels`, one prediction set per text.
    ///
    /// # Errors
    ///
    /// Returns [`ClassifyError::RowCount`] when a per-example label set does
    /// not match the texts, and propagates tokenizer, backend and decoder
    /// failures.
    pub fn classify<S: AsRef<str>>(
        &self,
        texts: &[S],
        labels: &LabelSet,
    ) -> Result<Vec<PredictionSet>, ClassifyError> {
        check_rows(texts.len(), labels)?;
        let batch_size = self.config().batch_size;
        let mut out = Vec::with_capacity(texts.len());
        for (pass, chunk) in texts.chunks(batch_size).enumerate() {
            let start = pass.saturating_mul(batch_size);
            let chunk: Vec<&str> = chunk.iter().map(AsRef::as_ref).collect();
            let pass_labels = labels.batch(start, chunk.len());
            let inputs = self.tokenizer.tokenize(&chunk, &pass_labels)?;
            debug!(start, len = chunk.len(), seq_len = inputs.seq_len, "running inference pass");
            let logits = self.backend.infer(&inputs)?;
            out.extend(self.decoder.decode(&chunk, &pass_labels, &logits)?);
        }
        info!(texts = texts.len(), model = %self.backend.model_id(), "classified texts");
        Ok(out)
    }

    /// Classify a job read from disk, pairing each text with its predictions.
    ///
    /// # Errors
    ///
    /// As for [`ClassificationInput::check`] and [`Self::classify`].
    pub fn classify_input(
        &self,
        input: &ClassificationInput,
    ) -> Result<Vec<TextPredictions>, ClassifyError> {
        input.check()?;
        let predictions = self.classify(&input.texts, &input.labels)?;
        Ok(input
            .texts
            .iter()
            .cloned()
            .zip(predictions)
            .map(|(text, predictions)| TextPredictions { text, predictions })
            .collect())
    }
}

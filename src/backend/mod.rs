//! Inference backends: anything that turns model inputs into logits.
//!
//! Two implementations exist. [`OnnxBackend`] runs an exported graph through
//! ONNX Runtime. [`ProcessBackend`] delegates to an external program, which is
//! how the original training runtime is reached.

#[cfg(feature = "onnx")]
mod onnx;
mod process;

#[cfg(feature = "onnx")]
pub use onnx::{OnnxBackend, OnnxBackendConfig};
pub use process::ProcessBackend;

use thiserror::Error;

use crate::{
    command::CommandError,
    logits::{Logits, LogitsError},
    tokenize::ModelInputs,
};

/// Name of the graph input carrying token ids.
pub const INPUT_IDS: &str = "input_ids";

/// Name of the graph input carrying the attention mask.
pub const ATTENTION_MASK: &str = "attention_mask";

/// Name of the graph output carrying logits.
pub const LOGITS: &str = "logits";

/// Errors raised by inference backends.
#[derive(Debug, Error)]
pub enum BackendError {
    #[cfg(feature = "onnx")]
    #[error("failed to construct ONNX session builder: {0}")]
    CreateSessionBuilder(#[source] ort::Error),
    #[cfg(feature = "onnx")]
    #[error("failed to create ONNX session from {path}: {source}")]
    CreateSession {
        path: std::path::PathBuf,
        #[source]
        source: ort::Error,
    },
    #[cfg(feature = "onnx")]
    #[error("failed to convert model inputs into tensors: {0}")]
    EncodeTensor(#[source] ort::Error),
    #[cfg(feature = "onnx")]
    #[error("failed to run inference: {0}")]
    Inference(#[source] ort::Error),
    #[error("session mutex was poisoned by a previous panic")]
    SessionPoisoned,
    #[error("output \"{name}\" missing from backend results")]
    OutputMissing { name: String },
    #[error("backend returned malformed logits: {0}")]
    Logits(#[from] LogitsError),
    #[error(transparent)]
    Command(#[from] CommandError),
    #[error("backend protocol error: {0}")]
    Protocol(#[source] serde_json::Error),
}

/// Executes a classification graph on tokenised inputs.
pub trait InferenceBackend {
    /// Identifier of the model this backend serves.
    fn model_id(&self) -> &str;

    /// Architecture tag declared by the model (for example `uni-encoder`).
    fn architecture(&self) -> &str;

    /// Run the model and return batch-major logits.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError`] when execution fails or the output is malformed.
    fn infer(&self, inputs: &ModelInputs) -> Result<Logits, BackendError>;
}

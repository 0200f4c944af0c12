use std::{path::PathBuf, sync::Mutex};

use ort::{session::Session, value::TensorRef};
use tracing::debug;

use super::{ATTENTION_MASK, BackendError, INPUT_IDS, InferenceBackend, LOGITS};
use crate::{
    logits::{AxisOrder, Logits},
    tokenize::ModelInputs,
};

/// Configuration for an exported-graph backend.
#[derive(Debug, Clone)]
pub struct OnnxBackendConfig {
    /// Graph file to load.
    pub model: PathBuf,
    /// Identifier reported by [`InferenceBackend::model_id`].
    pub model_id: String,
    /// Architecture tag of the exported model.
    pub architecture: String,
    /// Ordered input names: token ids, then attention mask.
    pub input_names: [String; 2],
    /// Output to read logits from.
    pub output_name: String,
    /// Native layout of the logits output.
    pub axis_order: AxisOrder,
}

impl OnnxBackendConfig {
    /// Configuration using the exported graph's standard tensor names.
    #[must_use]
    pub fn new(model: PathBuf, model_id: impl Into<String>, architecture: impl Into<String>) -> Self {
        Self {
            model,
            model_id: model_id.into(),
            architecture: architecture.into(),
            input_names: [INPUT_IDS.to_owned(), ATTENTION_MASK.to_owned()],
            output_name: LOGITS.to_owned(),
            axis_order: AxisOrder::BatchMajor,
        }
    }
}

/// Runs an exported graph with ONNX Runtime.
#[derive(Debug)]
pub struct OnnxBackend {
    session: Mutex<Session>,
    config: OnnxBackendConfig,
}

impl OnnxBackend {
    /// Load the graph named in `config`.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::CreateSessionBuilder`] or
    /// [`BackendError::CreateSession`] when ONNX Runtime rejects the graph.
    pub fn new(config: OnnxBackendConfig) -> Result<Self, BackendError> {
        let session = Session::builder()
            .map_err(BackendError::CreateSessionBuilder)?
            .commit_from_file(&config.model)
            .map_err(|source| BackendError::CreateSession {
                path: config.model.clone(),
                source,
            })?;
        debug!(model = %config.model.display(), "loaded ONNX session");
        Ok(Self {
            session: Mutex::new(session),
            config,
        })
    }
}

impl InferenceBackend for OnnxBackend {
    fn model_id(&self) -> &str {
        &self.config.model_id
    }

    fn architecture(&self) -> &str {
        &self.config.architecture
    }

    fn infer(&self, inputs: &ModelInputs) -> Result<Logits, BackendError> {
        let shape = inputs.shape();
        let ids_tensor = TensorRef::from_array_view((shape, inputs.input_ids.as_slice()))
            .map_err(BackendError::EncodeTensor)?;
        let attention_tensor =
            TensorRef::from_array_view((shape, inputs.attention_mask.as_slice()))
                .map_err(BackendError::EncodeTensor)?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| BackendError::SessionPoisoned)?;

        let [input_ids_name, attention_mask_name] = &self.config.input_names;
        let outputs = session
            .run(ort::inputs! {
                input_ids_name.as_str() => ids_tensor,
                attention_mask_name.as_str() => attention_tensor,
            })
            .map_err(BackendError::Inference)?;

        let output_name = &self.config.output_name;
        let logits_value =
            outputs
                .get(output_name.as_str())
                .ok_or_else(|| BackendError::OutputMissing {
                    name: output_name.clone(),
                })?;
        let (dims, values) = logits_value
            .try_extract_tensor::<f32>()
            .map_err(BackendError::Inference)?;
        let dims: Vec<i64> = dims.iter().copied().collect();
        debug!(?dims, "ONNX inference finished");

        Ok(Logits::from_dims(values.to_vec(), &dims, self.config.axis_order)?)
    }
}

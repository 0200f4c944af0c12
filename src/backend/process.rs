use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{BackendError, InferenceBackend, LOGITS};
use crate::{
    command::ExternalCommand,
    logits::{AxisOrder, Logits},
    tokenize::ModelInputs,
};

#[derive(Serialize)]
struct ProcessRequest {
    input_ids: Vec<Vec<i64>>,
    attention_mask: Vec<Vec<i64>>,
}

#[derive(Deserialize)]
struct ProcessResponse {
    logits: Option<Vec<Vec<f32>>>,
}

/// Backend that hands inputs to an external runtime over stdin and reads
/// logits from stdout.
///
/// The program receives `{"input_ids": [[..]], "attention_mask": [[..]]}` and
/// must print `{"logits": [[..]]}` laid out in `axis_order`.
#[derive(Debug, Clone)]
pub struct ProcessBackend {
    command: ExternalCommand,
    model_id: String,
    architecture: String,
    axis_order: AxisOrder,
}

impl ProcessBackend {
    /// Wrap `command` serving `model_id` of the given architecture.
    #[must_use]
    pub fn new(
        command: ExternalCommand,
        model_id: impl Into<String>,
        architecture: impl Into<String>,
    ) -> Self {
        Self {
            command,
            model_id: model_id.into(),
            architecture: architecture.into(),
            axis_order: AxisOrder::BatchMajor,
        }
    }

    /// Declare the layout of the logits the program prints.
    #[must_use]
    pub const fn with_axis_order(mut self, axis_order: AxisOrder) -> Self {
        self.axis_order = axis_order;
        self
    }
}

impl InferenceBackend for ProcessBackend {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn architecture(&self) -> &str {
        &self.architecture
    }

    fn infer(&self, inputs: &ModelInputs) -> Result<Logits, BackendError> {
        let request = ProcessRequest {
            input_ids: inputs.input_id_rows(),
            attention_mask: inputs.attention_mask_rows(),
        };
        let body = serde_json::to_vec(&request).map_err(BackendError::Protocol)?;
        let stdout = self.command.exchange(&body)?;
        let response: ProcessResponse =
            serde_json::from_slice(&stdout).map_err(BackendError::Protocol)?;
        let rows = response.logits.ok_or_else(|| BackendError::OutputMissing {
            name: LOGITS.to_owned(),
        })?;
        let native = Logits::from_rows(&rows)?;
        debug!(rows = native.batch(), cols = native.slots(), "external runtime responded");
        match self.axis_order {
            AxisOrder::BatchMajor => Ok(native),
            AxisOrder::SlotMajor => Ok(Logits::from_flat(
                native.values().to_vec(),
                [native.batch(), native.slots()],
                AxisOrder::SlotMajor,
            )?),
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use rstest::rstest;

    fn scripted(reply: &str) -> ProcessBackend {
        let script = format!("cat > /dev/null; printf '%s' '{reply}'");
        ProcessBackend::new(
            ExternalCommand::new("sh", ["-c", script.as_str()]),
            "knowledgator/gliclass-small-v1.0",
            "uni-encoder",
        )
    }

    fn inputs() -> ModelInputs {
        crate::tokenize::pad_batch(&[vec![1, 2], vec![3]], 16)
    }

    #[rstest]
    fn reads_batch_major_logits() {
        let backend = scripted(r#"{"logits": [[1.5, -2.0], [0.25, 3.0]]}"#);
        let logits = backend
            .infer(&inputs())
            .unwrap_or_else(|e| panic!("infer: {e}"));
        assert_eq!(logits.to_rows(), vec![vec![1.5, -2.0], vec![0.25, 3.0]]);
    }

    #[rstest]
    fn transposes_slot_major_logits() {
        let backend = scripted(r#"{"logits": [[1.0, 2.0], [3.0, 4.0], [5.0, 6.0]]}"#)
            .with_axis_order(AxisOrder::SlotMajor);
        let logits = backend
            .infer(&inputs())
            .unwrap_or_else(|e| panic!("infer: {e}"));
        assert_eq!(logits.to_rows(), vec![vec![1.0, 3.0, 5.0], vec![2.0, 4.0, 6.0]]);
    }

    #[rstest]
    fn missing_logits_is_reported() {
        let backend = scripted(r#"{"scores": []}"#);
        let result = backend.infer(&inputs());
        assert!(matches!(result, Err(BackendError::OutputMissing { .. })));
    }

    #[rstest]
    fn malformed_reply_is_a_protocol_error() {
        let backend = scripted("not json");
        let result = backend.infer(&inputs());
        assert!(matches!(result, Err(BackendError::Protocol(_))));
    }
}

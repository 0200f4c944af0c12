//! Deterministic stand-ins for the tokenizer and inference runtimes.

use std::{
    cell::{Cell, RefCell},
    collections::VecDeque,
};

use crate::{
    backend::{BackendError, InferenceBackend},
    labels::LabelSet,
    logits::Logits,
    tokenize::{ModelInputs, PromptFormat, PromptTokenizer, TokenizeError, format_prompts, pad_batch},
};

#[expect(clippy::float_arithmetic, reason = "tolerance comparison")]
#[must_use]
pub fn approx_eq(a: f32, b: f32, tol: f32) -> bool {
    (a - b).abs() < tol
}

/// Tokenizer mapping each byte of the rendered prompt to one id.
#[derive(Debug, Clone, Copy, Default)]
pub struct StubTokenizer {
    pub format: PromptFormat,
}

impl PromptTokenizer for StubTokenizer {
    fn tokenize(&self, texts: &[&str], labels: &LabelSet) -> Result<ModelInputs, TokenizeError> {
        let prompts = format_prompts(texts, labels, self.format.prompt_first)?;
        let sequences: Vec<Vec<u32>> = prompts
            .iter()
            .map(|prompt| prompt.bytes().map(u32::from).collect())
            .collect();
        Ok(pad_batch(&sequences, self.format.max_length))
    }
}

/// Backend returning the same logits for every call and counting calls.
#[derive(Debug)]
pub struct FixedBackend {
    model_id: String,
    architecture: String,
    rows: Vec<Vec<f32>>,
    calls: Cell<usize>,
}

impl FixedBackend {
    #[must_use]
    pub fn new(model_id: &str, architecture: &str, rows: &[Vec<f32>]) -> Self {
        Self {
            model_id: model_id.to_owned(),
            architecture: architecture.to_owned(),
            rows: rows.to_vec(),
            calls: Cell::new(0),
        }
    }

    /// Number of times [`InferenceBackend::infer`] ran.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.get()
    }
}

impl InferenceBackend for FixedBackend {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn architecture(&self) -> &str {
        &self.architecture
    }

    fn infer(&self, _inputs: &ModelInputs) -> Result<Logits, BackendError> {
        self.calls.set(self.calls.get().saturating_add(1));
        Ok(Logits::from_rows(&self.rows)?)
    }
}

/// Backend replaying one queued batch of logits per call.
#[derive(Debug)]
pub struct SequenceBackend {
    batches: RefCell<VecDeque<Vec<Vec<f32>>>>,
    calls: Cell<usize>,
}

impl SequenceBackend {
    pub fn new<I: IntoIterator<Item = Vec<Vec<f32>>>>(batches: I) -> Self {
        Self {
            batches: RefCell::new(batches.into_iter().collect()),
            calls: Cell::new(0),
        }
    }

    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.get()
    }
}

impl InferenceBackend for SequenceBackend {
    fn model_id(&self) -> &str {
        "sequence"
    }

    fn architecture(&self) -> &str {
        "uni-encoder"
    }

    fn infer(&self, _inputs: &ModelInputs) -> Result<Logits, BackendError> {
        self.calls.set(self.calls.get().saturating_add(1));
        let rows = self
            .batches
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| BackendError::OutputMissing {
                name: "logits".to_owned(),
            })?;
        Ok(Logits::from_rows(&rows)?)
    }
}

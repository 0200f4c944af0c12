//! Tokenisation adapter: text and candidate labels to model input tensors.
//!
//! GLiClass uni-encoders read the labels and the text as one sequence. Each
//! label is lower-cased and prefixed with [`LABEL_TAG`]; the label block is
//! closed with [`SEP_TAG`]. With `prompt_first` the label block precedes the
//! text, otherwise it follows it.

#[cfg(feature = "onnx")]
mod hf;

#[cfg(feature = "onnx")]
pub use hf::HfPromptTokenizer;

use std::path::PathBuf;

use thiserror::Error;

use crate::{config::DEFAULT_MAX_LENGTH, labels::LabelSet};

/// Marker preceding every label in a prompt.
pub const LABEL_TAG: &str = "<<LABEL>>";

/// Marker closing the label block.
pub const SEP_TAG: &str = "<<SEP>>";

/// Errors produced while turning text into model inputs.
#[derive(Debug, Error)]
pub enum TokenizeError {
    #[error("failed to load tokenizer from {path}: {message}")]
    LoadTokenizer { path: PathBuf, message: String },
    #[error("failed to configure tokenizer: {0}")]
    Configure(String),
    #[error("failed to encode text: {0}")]
    Encode(String),
    #[error("label lists cover {actual} examples but {expected} texts were given")]
    ShapeMismatch { expected: usize, actual: usize },
}

/// Prompt layout shared by conversion and validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PromptFormat {
    /// Place the label block before the text.
    pub prompt_first: bool,
    /// Maximum tokens per example; longer sequences are truncated.
    pub max_length: usize,
}

impl Default for PromptFormat {
    fn default() -> Self {
        Self {
            prompt_first: true,
            max_length: DEFAULT_MAX_LENGTH,
        }
    }
}

/// Padded, batch-major model inputs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelInputs {
    pub input_ids: Vec<i64>,
    pub attention_mask: Vec<i64>,
    pub batch: usize,
    pub seq_len: usize,
}

impl ModelInputs {
    /// `[batch, seq_len]` shape shared by both tensors.
    #[must_use]
    pub const fn shape(&self) -> [usize; 2] {
        [self.batch, self.seq_len]
    }

    /// Nested rows of `input_ids`.
    #[must_use]
    pub fn input_id_rows(&self) -> Vec<Vec<i64>> {
        rows(&self.input_ids, self.batch, self.seq_len)
    }

    /// Nested rows of `attention_mask`.
    #[must_use]
    pub fn attention_mask_rows(&self) -> Vec<Vec<i64>> {
        rows(&self.attention_mask, self.batch, self.seq_len)
    }
}

fn rows(values: &[i64], batch: usize, seq_len: usize) -> Vec<Vec<i64>> {
    if seq_len == 0 {
        return vec![Vec::new(); batch];
    }
    values.chunks(seq_len).map(<[i64]>::to_vec).collect()
}

/// Converts texts and their candidate labels into model inputs.
pub trait PromptTokenizer {
    /// Tokenise `texts` with the labels that apply to each.
    ///
    /// # Errors
    ///
    /// Returns an error if the label set does not cover the texts or encoding fails.
    fn tokenize(&self, texts: &[&str], labels: &LabelSet) -> Result<ModelInputs, TokenizeError>;
}

/// Render one prompt.
///
/// # Examples
///
/// ```
/// use gliclass_onnx::tokenize::format_prompt;
///
/// let prompt = format_prompt("Hi there", &["Greeting".into(), "Spam".into()], true);
/// assert_eq!(prompt, "<<LABEL>>greeting<<LABEL>>spam<<SEP>>Hi there");
/// ```
#[must_use]
pub fn format_prompt(text: &str, labels: &[String], prompt_first: bool) -> String {
    let block: String = labels
        .iter()
        .map(|label| format!("{LABEL_TAG}{}", label.to_lowercase()))
        .collect();
    if prompt_first {
        format!("{block}{SEP_TAG}{text}")
    } else {
        format!("{text}{block}{SEP_TAG}")
    }
}

/// Render one prompt per text.
///
/// # Errors
///
/// Returns [`TokenizeError::ShapeMismatch`] when a per-example label set does
/// not have exactly one row per text.
pub fn format_prompts(
    texts: &[&str],
    labels: &LabelSet,
    prompt_first: bool,
) -> Result<Vec<String>, TokenizeError> {
    if let Some(rows) = labels.rows() {
        if rows != texts.len() {
            return Err(TokenizeError::ShapeMismatch {
                expected: texts.len(),
                actual: rows,
            });
        }
    }
    Ok(texts
        .iter()
        .enumerate()
        .map(|(i, text)| format_prompt(text, labels.labels_for(i).unwrap_or(&[]), prompt_first))
        .collect())
}

/// Right-pad token sequences to the longest one, truncating at `max_length`.
///
/// Padding positions carry id `0` and mask `0`.
#[must_use]
pub fn pad_batch(sequences: &[Vec<u32>], max_length: usize) -> ModelInputs {
    let seq_len = sequences
        .iter()
        .map(Vec::len)
        .max()
        .unwrap_or(0)
        .min(max_length);
    let capacity = sequences.len().saturating_mul(seq_len);
    let mut input_ids = Vec::with_capacity(capacity);
    let mut attention_mask = Vec::with_capacity(capacity);
    for sequence in sequences {
        let kept = sequence.len().min(seq_len);
        input_ids.extend(sequence.iter().take(kept).map(|&id| i64::from(id)));
        attention_mask.extend(std::iter::repeat_n(1, kept));
        let padding = seq_len.saturating_sub(kept);
        input_ids.extend(std::iter::repeat_n(0, padding));
        attention_mask.extend(std::iter::repeat_n(0, padding));
    }
    ModelInputs {
        input_ids,
        attention_mask,
        batch: sequences.len(),
        seq_len,
    }
}

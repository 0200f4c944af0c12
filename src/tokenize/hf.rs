use std::path::{Path, PathBuf};

use tokenizers::{Tokenizer, TruncationDirection, TruncationParams, TruncationStrategy};

use super::{ModelInputs, PromptFormat, PromptTokenizer, TokenizeError, format_prompts, pad_batch};
use crate::labels::LabelSet;

/// [`PromptTokenizer`] backed by a Hugging Face `tokenizer.json`.
#[derive(Debug)]
pub struct HfPromptTokenizer {
    tokenizer: Tokenizer,
    format: PromptFormat,
    path: PathBuf,
}

impl HfPromptTokenizer {
    /// Load a tokenizer file and configure truncation for `format`.
    ///
    /// # Errors
    ///
    /// Returns [`TokenizeError::LoadTokenizer`] when the file cannot be parsed
    /// and [`TokenizeError::Configure`] when truncation cannot be applied.
    pub fn from_file(path: &Path, format: PromptFormat) -> Result<Self, TokenizeError> {
        let mut tokenizer =
            Tokenizer::from_file(path).map_err(|source| TokenizeError::LoadTokenizer {
                path: path.to_path_buf(),
                message: source.to_string(),
            })?;

        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length: format.max_length,
                strategy: TruncationStrategy::LongestFirst,
                stride: 0,
                direction: TruncationDirection::Right,
            }))
            .map_err(|source| TokenizeError::Configure(source.to_string()))?;
        tokenizer.with_padding(None);

        Ok(Self {
            tokenizer,
            format,
            path: path.to_path_buf(),
        })
    }

    /// File the tokenizer was loaded from.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PromptTokenizer for HfPromptTokenizer {
    fn tokenize(&self, texts: &[&str], labels: &LabelSet) -> Result<ModelInputs, TokenizeError> {
        let prompts = format_prompts(texts, labels, self.format.prompt_first)?;
        let sequences = prompts
            .iter()
            .map(|prompt| {
                self.tokenizer
                    .encode(prompt.as_str(), true)
                    .map(|encoding| encoding.get_ids().to_vec())
                    .map_err(|source| TokenizeError::Encode(source.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(pad_batch(&sequences, self.format.max_length))
    }
}

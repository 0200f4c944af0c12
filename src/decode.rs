//! Decoding engine: raw logits to labelled predictions.
//!
//! Single-label decoding applies a softmax over an example's valid slots and
//! keeps the most probable label (lowest slot wins ties). Multi-label
//! decoding applies an independent sigmoid per slot and keeps every label
//! whose probability strictly exceeds the threshold, in slot order.
//!
//! Slots past an example's own label count are never read. With a shared
//! label list and a wider logits tensor this simply stops emission early.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::{
    config::{ConfigurationError, DecoderConfig},
    labels::LabelSet,
    logits::Logits,
    mode::ClassificationMode,
};

/// A label with its probability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub label: String,
    /// Probability in `[0, 1]`.
    pub score: f32,
}

/// Predictions for one example.
pub type PredictionSet = Vec<Prediction>;

/// Errors returned by [`Decoder::decode`].
#[derive(Debug, Clone, Error, PartialEq)]
pub enum DecodeError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error("{what}: expected {expected} but found {actual}")]
    ShapeMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("example {example} has no candidate labels")]
    EmptyLabels { example: usize },
}

/// Decodes logits under a fixed classification mode.
///
/// # Examples
///
/// ```
/// use gliclass_onnx::{ClassificationMode, Decoder, DecoderConfig, LabelSet, Logits};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let decoder = Decoder::new(DecoderConfig::new(ClassificationMode::MultiLabel))?;
/// let logits = Logits::from_rows(&[vec![2.0, -3.0, 0.5]])?;
/// let labels = LabelSet::shared(["format", "cat", "tool"]);
/// let out = decoder.decode(&["ONNX is a format"], &labels, &logits)?;
/// let names: Vec<_> = out[0].iter().map(|p| p.label.as_str()).collect();
/// assert_eq!(names, ["format", "tool"]);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Decoder {
    config: DecoderConfig,
}

impl Decoder {
    /// Build a decoder from validated configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError`] when the threshold or batch size is invalid.
    pub fn new(config: DecoderConfig) -> Result<Self, ConfigurationError> {
        config.validate().map(|config| Self { config })
    }

    /// The decoder's configuration.
    #[must_use]
    pub const fn config(&self) -> &DecoderConfig {
        &self.config
    }

    /// Decode `logits` for `texts` against `labels`.
    ///
    /// `texts` only fixes the logical batch size; a single text is passed as a
    /// one-element slice. Results do not depend on the configured batch size.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::ShapeMismatch`] when the logits or a per-example
    /// label set do not cover exactly `texts.len()` examples, or when an
    /// example has more labels than the logits have slots, and
    /// [`DecodeError::EmptyLabels`] for a single-label example without labels.
    pub fn decode<T: AsRef<str>>(
        &self,
        texts: &[T],
        labels: &LabelSet,
        logits: &Logits,
    ) -> Result<Vec<PredictionSet>, DecodeError> {
        let count = texts.len();
        if logits.batch() != count {
            return Err(DecodeError::ShapeMismatch {
                what: "logits example axis",
                expected: count,
                actual: logits.batch(),
            });
        }
        if let Some(rows) = labels.rows() {
            if rows != count {
                return Err(DecodeError::ShapeMismatch {
                    what: "per-example label lists",
                    expected: count,
                    actual: rows,
                });
            }
        }
        if labels.max_len() > logits.slots() {
            return Err(DecodeError::ShapeMismatch {
                what: "logits slot axis",
                expected: labels.max_len(),
                actual: logits.slots(),
            });
        }

        let mut out = Vec::with_capacity(count);
        for start in (0..count).step_by(self.config.batch_size) {
            let len = self.config.batch_size.min(count.saturating_sub(start));
            debug!(start, len, mode = %self.config.mode, "decoding pass");
            for example in start..start.saturating_add(len) {
                let example_labels = labels.labels_for(example).unwrap_or(&[]);
                let scores = logits.row(example, example_labels.len());
                let set = match self.config.mode {
                    ClassificationMode::SingleLabel => {
                        vec![best_label(example, example_labels, scores)?]
                    }
                    ClassificationMode::MultiLabel => {
                        labels_above(example_labels, scores, self.config.threshold)
                    }
                };
                out.push(set);
            }
        }
        Ok(out)
    }
}

fn best_label(
    example: usize,
    labels: &[String],
    scores: &[f32],
) -> Result<Prediction, DecodeError> {
    let probabilities = softmax(scores);
    let (slot, score) = argmax(&probabilities).ok_or(DecodeError::EmptyLabels { example })?;
    let label = labels
        .get(slot)
        .cloned()
        .ok_or(DecodeError::EmptyLabels { example })?;
    Ok(Prediction { label, score })
}

fn labels_above(labels: &[String], scores: &[f32], threshold: f32) -> PredictionSet {
    labels
        .iter()
        .zip(scores)
        .filter_map(|(label, &logit)| {
            let score = sigmoid(logit);
            (score > threshold).then(|| Prediction {
                label: label.clone(),
                score,
            })
        })
        .collect()
}

/// Index and value of the largest element; the first one wins ties and NaN
/// never wins.
fn argmax(values: &[f32]) -> Option<(usize, f32)> {
    values
        .iter()
        .copied()
        .enumerate()
        .fold(None, |best, (i, v)| match best {
            Some((_, b)) if v <= b || (v.is_nan() && !b.is_nan()) => best,
            _ => Some((i, v)),
        })
}

/// Numerically stable softmax.
///
/// NaN logits get probability 0. When any logit is `+inf` the `+inf` slots
/// share the whole mass; when every logit is `-inf` (or NaN) the mass is
/// spread evenly.
#[must_use]
#[expect(
    clippy::float_arithmetic,
    clippy::cast_precision_loss,
    reason = "softmax requires float operations"
)]
pub fn softmax(logits: &[f32]) -> Vec<f32> {
    let cleaned: Vec<f32> = logits
        .iter()
        .map(|&v| if v.is_nan() { f32::NEG_INFINITY } else { v })
        .collect();
    let max = cleaned.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    if max.is_infinite() {
        let peak = |v: f32| v.is_infinite() && v.is_sign_positive() == max.is_sign_positive();
        let share = 1.0 / cleaned.iter().filter(|&&v| peak(v)).count() as f32;
        return cleaned
            .into_iter()
            .map(|v| if peak(v) { share } else { 0.0 })
            .collect();
    }
    let exps: Vec<f32> = cleaned.iter().map(|&v| (v - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

/// Logistic sigmoid mapping any real number to `[0, 1]`.
#[must_use]
#[expect(clippy::float_arithmetic, reason = "sigmoid requires float operations")]
pub fn sigmoid(value: f32) -> f32 {
    1.0 / (1.0 + (-value).exp())
}

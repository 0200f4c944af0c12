//! Decoder and validator settings, with the defaults the CLI tools use.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::mode::ClassificationMode;

/// Probability a multi-label slot must exceed to be emitted.
pub const DEFAULT_THRESHOLD: f32 = 0.5;

/// Examples decoded per pass.
pub const DEFAULT_BATCH_SIZE: usize = 8;

/// Absolute tolerance between reference and candidate logits.
pub const DEFAULT_TOLERANCE: f32 = 1e-4;

/// Maximum token count per example before truncation.
pub const DEFAULT_MAX_LENGTH: usize = 2048;

/// Invalid settings. Always fatal; never retried.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ConfigurationError {
    #[error("classification type `{0}` is not supported; use `single-label` or `multi-label`")]
    UnknownMode(String),
    #[error("threshold must lie in [0, 1] but was {0}")]
    ThresholdOutOfRange(f32),
    #[error("batch size must be greater than 0")]
    ZeroBatchSize,
    #[error("tolerance must be finite and non-negative but was {0}")]
    InvalidTolerance(f32),
    #[error("missing required setting `{0}`")]
    MissingSetting(&'static str),
}

/// Configuration for the decoding engine.
///
/// # Examples
///
/// ```
/// use gliclass_onnx::{ClassificationMode, DecoderConfig};
///
/// let cfg = DecoderConfig::new(ClassificationMode::MultiLabel);
/// assert!(cfg.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DecoderConfig {
    pub mode: ClassificationMode,
    /// Only consulted in multi-label mode.
    #[serde(default = "default_threshold")]
    pub threshold: f32,
    /// Throughput knob; never changes results.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

const fn default_threshold() -> f32 {
    DEFAULT_THRESHOLD
}

const fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

impl DecoderConfig {
    /// Configuration with the default threshold and batch size.
    #[must_use]
    pub const fn new(mode: ClassificationMode) -> Self {
        Self {
            mode,
            threshold: DEFAULT_THRESHOLD,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    /// Ensure the configuration values are within acceptable bounds.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::ThresholdOutOfRange`] when the threshold is
    /// outside `[0, 1]` or not a number, and [`ConfigurationError::ZeroBatchSize`]
    /// when `batch_size` is zero.
    #[must_use = "Validation should not be ignored"]
    pub fn validate(self) -> Result<Self, ConfigurationError> {
        if !(0.0..=1.0).contains(&self.threshold) {
            return Err(ConfigurationError::ThresholdOutOfRange(self.threshold));
        }
        if self.batch_size == 0 {
            return Err(ConfigurationError::ZeroBatchSize);
        }
        Ok(self)
    }
}

/// Check a comparison tolerance.
///
/// # Errors
///
/// Returns [`ConfigurationError::InvalidTolerance`] for negative or non-finite values.
pub fn validate_tolerance(tolerance: f32) -> Result<f32, ConfigurationError> {
    if tolerance.is_finite() && tolerance >= 0.0 {
        Ok(tolerance)
    } else {
        Err(ConfigurationError::InvalidTolerance(tolerance))
    }
}

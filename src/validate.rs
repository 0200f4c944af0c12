//! Equivalence validator: checks that an exported graph reproduces the
//! original model's logits on a fixed probe.
//!
//! The comparison is purely absolute, `|a - b| <= tolerance` for every
//! element. A mismatch is reported through the return value; only missing
//! inputs and infrastructure failures are errors.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
    artefact::{self, ArtefactError},
    backend::{BackendError, InferenceBackend},
    config::{ConfigurationError, validate_tolerance},
    labels::LabelSet,
    logits::Logits,
    record::{RecordError, ReferenceRecord},
    tokenize::{ModelInputs, PromptTokenizer, TokenizeError},
};

/// The only architecture the exported graph supports.
pub const SUPPORTED_ARCHITECTURE: &str = "uni-encoder";

/// Decimal places kept when persisting reference logits.
pub const REFERENCE_DIGITS: i32 = 4;

/// Errors raised by the validator.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error("architecture `{found}` cannot be converted; only `uni-encoder` is supported")]
    UnsupportedArchitecture { found: String },
    #[error("no reference record at {path}; run the conversion first")]
    MissingReference { path: PathBuf },
    #[error("no {kind} graph found in {dir}")]
    MissingArtifact { dir: PathBuf, kind: &'static str },
    #[error("checksum mismatch for {path}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Tokenize(#[from] TokenizeError),
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error(transparent)]
    Record(RecordError),
}

impl From<RecordError> for ValidationError {
    fn from(err: RecordError) -> Self {
        match err {
            RecordError::MissingReference { path } => Self::MissingReference { path },
            other => Self::Record(other),
        }
    }
}

impl From<ArtefactError> for ValidationError {
    fn from(err: ArtefactError) -> Self {
        match err {
            ArtefactError::Missing { dir, kind } => Self::MissingArtifact { dir, kind },
            ArtefactError::ChecksumMismatch {
                path,
                expected,
                actual,
            } => Self::ChecksumMismatch {
                path,
                expected,
                actual,
            },
            ArtefactError::Io { path, source } => Self::Io { path, source },
        }
    }
}

/// Fixed text and labels both runtimes are evaluated on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Probe {
    pub text: String,
    pub labels: Vec<String>,
}

impl Probe {
    /// The probe used for every conversion and validation.
    #[must_use]
    pub fn canonical() -> Self {
        Self {
            text: "ONNX is an open-source format designed to enable the interoperability \
                   of AI models across various frameworks and tools."
                .to_owned(),
            labels: ["format", "model", "tool", "cat"]
                .into_iter()
                .map(str::to_owned)
                .collect(),
        }
    }

    /// Labels as a shared set.
    #[must_use]
    pub fn label_set(&self) -> LabelSet {
        LabelSet::Shared(self.labels.clone())
    }
}

impl Default for Probe {
    fn default() -> Self {
        Self::canonical()
    }
}

/// Outcome of comparing candidate logits with a reference.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValidationReport {
    /// Every element agreed within tolerance and the shapes matched.
    pub passed: bool,
    /// Elements compared; zero when the shapes differ.
    pub compared: usize,
    /// Elements outside tolerance, including non-finite differences.
    pub mismatched: usize,
    /// Largest finite absolute difference observed.
    pub max_abs_diff: f32,
    pub shape_matches: bool,
}

/// Compare `candidate` with `reference` element-wise.
///
/// # Examples
///
/// ```
/// use gliclass_onnx::{Logits, validate::compare};
///
/// let reference = Logits::from_rows(&[vec![1.0, 2.0]]).unwrap();
/// let candidate = Logits::from_rows(&[vec![1.00005, 2.0]]).unwrap();
/// assert!(compare(&reference, &candidate, 1e-4).passed);
/// assert!(!compare(&reference, &candidate, 1e-6).passed);
/// ```
#[must_use]
#[expect(clippy::float_arithmetic, reason = "absolute difference of logits")]
pub fn compare(reference: &Logits, candidate: &Logits, tolerance: f32) -> ValidationReport {
    let shape_matches =
        reference.batch() == candidate.batch() && reference.slots() == candidate.slots();
    if !shape_matches {
        return ValidationReport {
            passed: false,
            compared: 0,
            mismatched: 0,
            max_abs_diff: 0.0,
            shape_matches,
        };
    }
    let mut mismatched = 0_usize;
    let mut max_abs_diff = 0.0_f32;
    for (a, b) in reference.values().iter().zip(candidate.values()) {
        let diff = (a - b).abs();
        let within = diff <= tolerance;
        if !within {
            mismatched = mismatched.saturating_add(1);
        }
        if diff.is_finite() {
            max_abs_diff = max_abs_diff.max(diff);
        }
    }
    ValidationReport {
        passed: mismatched == 0,
        compared: reference.values().len(),
        mismatched,
        max_abs_diff,
        shape_matches,
    }
}

/// Locate the graph under test in `dir` and verify it against the record.
///
/// The checksum is only checked when the record lists one for that file.
///
/// # Errors
///
/// Returns [`ValidationError::MissingArtifact`] when no matching graph exists
/// and [`ValidationError::ChecksumMismatch`] when its digest disagrees with
/// the record.
pub fn locate_graph(
    dir: &Path,
    quantized: bool,
    record: &ReferenceRecord,
) -> Result<PathBuf, ValidationError> {
    let graph = artefact::discover_graph(dir, quantized)?;
    let expected = graph
        .file_name()
        .and_then(|name| name.to_str())
        .and_then(|name| record.checksum(name));
    if let Some(expected) = expected {
        artefact::verify_checksum(&graph, expected)?;
        debug!(graph = %graph.display(), "graph checksum verified");
    }
    Ok(graph)
}

/// Captures and checks reference logits on a fixed probe.
#[derive(Debug)]
pub struct EquivalenceValidator<T> {
    tokenizer: T,
    probe: Probe,
    tolerance: f32,
}

impl<T: PromptTokenizer> EquivalenceValidator<T> {
    /// Build a validator.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::InvalidTolerance`] when `tolerance` is
    /// negative or not finite.
    pub fn new(tokenizer: T, probe: Probe, tolerance: f32) -> Result<Self, ConfigurationError> {
        Ok(Self {
            tokenizer,
            probe,
            tolerance: validate_tolerance(tolerance)?,
        })
    }

    #[must_use]
    pub const fn tolerance(&self) -> f32 {
        self.tolerance
    }

    #[must_use]
    pub const fn probe(&self) -> &Probe {
        &self.probe
    }

    fn probe_inputs(&self) -> Result<ModelInputs, TokenizeError> {
        self.tokenizer
            .tokenize(&[self.probe.text.as_str()], &self.probe.label_set())
    }

    /// Run the original model on the probe and build a reference record.
    ///
    /// Nothing is executed when the architecture gate fails.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::UnsupportedArchitecture`] for models outside
    /// the supported family, and propagates tokenizer and backend failures.
    pub fn capture_reference<B>(&self, backend: &B) -> Result<ReferenceRecord, ValidationError>
    where
        B: InferenceBackend + ?Sized,
    {
        let found = backend.architecture();
        if found != SUPPORTED_ARCHITECTURE {
            return Err(ValidationError::UnsupportedArchitecture {
                found: found.to_owned(),
            });
        }
        let inputs = self.probe_inputs()?;
        let logits = backend.infer(&inputs)?.rounded(REFERENCE_DIGITS);
        info!(
            model = backend.model_id(),
            batch = logits.batch(),
            slots = logits.slots(),
            "captured reference logits"
        );
        Ok(ReferenceRecord {
            original_model_name: backend.model_id().to_owned(),
            architecture_type: found.to_owned(),
            original_logits: logits.to_rows(),
            artifacts: std::collections::BTreeMap::new(),
        })
    }

    /// Run `backend` on the probe and compare with `record`.
    ///
    /// # Errors
    ///
    /// Propagates tokenizer and backend failures and malformed records.
    /// Disagreement is reported in the returned report, not as an error.
    pub fn report<B>(
        &self,
        record: &ReferenceRecord,
        backend: &B,
    ) -> Result<ValidationReport, ValidationError>
    where
        B: InferenceBackend + ?Sized,
    {
        let reference = record.logits()?;
        let inputs = self.probe_inputs()?;
        let candidate = backend.infer(&inputs)?;
        let report = compare(&reference, &candidate, self.tolerance);
        if report.passed {
            info!(
                model = backend.model_id(),
                max_abs_diff = report.max_abs_diff,
                "exported graph matches reference"
            );
        } else {
            warn!(
                model = backend.model_id(),
                mismatched = report.mismatched,
                compared = report.compared,
                shape_matches = report.shape_matches,
                max_abs_diff = report.max_abs_diff,
                "exported graph diverges from reference"
            );
        }
        Ok(report)
    }

    /// `true` iff `backend` reproduces `record` within tolerance.
    ///
    /// # Errors
    ///
    /// See [`EquivalenceValidator::report`].
    pub fn validate<B>(&self, record: &ReferenceRecord, backend: &B) -> Result<bool, ValidationError>
    where
        B: InferenceBackend + ?Sized,
    {
        self.report(record, backend).map(|report| report.passed)
    }

    /// Run `original` then `exported` on identical probe inputs and compare
    /// them directly, without a persisted record.
    ///
    /// # Errors
    ///
    /// Propagates tokenizer and backend failures.
    pub fn cross_check<A, B>(
        &self,
        original: &A,
        exported: &B,
    ) -> Result<ValidationReport, ValidationError>
    where
        A: InferenceBackend + ?Sized,
        B: InferenceBackend + ?Sized,
    {
        let inputs = self.probe_inputs()?;
        let reference = original.infer(&inputs)?;
        let candidate = exported.infer(&inputs)?;
        Ok(compare(&reference, &candidate, self.tolerance))
    }
}

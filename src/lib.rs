//! Conversion, validation and decoding for GLiClass zero-shot classifiers
//! exported to ONNX.
//! Re-exports public types and traits.

pub mod artefact;
pub mod backend;
pub mod classify;
#[cfg(feature = "cli")]
pub mod cli;
pub mod command;
pub mod config;
pub mod convert;
pub mod decode;
pub mod labels;
#[cfg(feature = "cli")]
pub mod logging;
pub mod logits;
pub mod mode;
pub mod record;
pub mod tokenize;
pub mod validate;

pub use backend::{BackendError, InferenceBackend, ProcessBackend};
#[cfg(feature = "onnx")]
pub use backend::{OnnxBackend, OnnxBackendConfig};
pub use classify::{ClassificationInput, Classifier, ClassifyError};
#[cfg(feature = "cli")]
pub use cli::{ClassifyArgs, ConvertArgs, ValidateArgs};
pub use command::ExternalCommand;
pub use config::{ConfigurationError, DecoderConfig};
pub use convert::{ConversionDriver, ConversionRequest, ConvertError};
pub use decode::{DecodeError, Decoder, Prediction, PredictionSet};
pub use labels::LabelSet;
pub use logits::{AxisOrder, Logits};
pub use mode::ClassificationMode;
pub use record::ReferenceRecord;
pub use tokenize::PromptTokenizer;
pub use validate::{EquivalenceValidator, Probe, ValidationError, ValidationReport};

pub mod tests;

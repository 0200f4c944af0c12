//! Conversion driver: capture the reference, export, quantize, persist.
//!
//! Export and quantization are delegated to external programs behind the
//! [`GraphExporter`] and [`WeightQuantizer`] traits. The driver owns the
//! ordering and the save-directory layout.

use std::{
    collections::BTreeMap,
    ffi::OsStr,
    fs,
    path::{Path, PathBuf},
};

use thiserror::Error;
use tracing::{debug, info};

use crate::{
    artefact::{self, ArtefactError, ArtefactLayout},
    backend::InferenceBackend,
    command::{CommandError, ExternalCommand},
    config::ConfigurationError,
    mode::ClassificationMode,
    record::RecordError,
    tokenize::PromptTokenizer,
    validate::{EquivalenceValidator, ValidationError},
};

/// Errors raised during conversion. The first one aborts the run.
#[derive(Debug, Error)]
pub enum ConvertError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{stage} failed: {source}")]
    ToolFailed {
        stage: &'static str,
        #[source]
        source: CommandError,
    },
    #[error("{stage} finished but {path} was not produced")]
    MissingOutput { stage: &'static str, path: PathBuf },
    #[error(transparent)]
    Record(#[from] RecordError),
    #[error(transparent)]
    Artefact(#[from] ArtefactError),
}

/// Fixed interface of the exported graph.
///
/// Dynamic axes are left to the export tool; the logits layout it chooses is
/// declared on the backend through [`crate::AxisOrder`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportSpec {
    pub input_names: [&'static str; 2],
    pub output_name: &'static str,
    pub opset: u32,
    /// Weight type used for dynamic quantization.
    pub weight_type: &'static str,
}

impl ExportSpec {
    pub const STANDARD: Self = Self {
        input_names: [crate::backend::INPUT_IDS, crate::backend::ATTENTION_MASK],
        output_name: crate::backend::LOGITS,
        opset: 14,
        weight_type: "QUInt8",
    };
}

impl Default for ExportSpec {
    fn default() -> Self {
        Self::STANDARD
    }
}

/// What to convert and where to put it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionRequest {
    /// Hub identifier or local directory of the trained model.
    pub model_path: String,
    pub save_path: PathBuf,
    pub quantize: bool,
    pub mode: ClassificationMode,
    /// Tokenizer file copied next to the graphs when present.
    pub tokenizer_path: Option<PathBuf>,
}

/// Paths produced by a successful conversion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionArtifacts {
    pub record: PathBuf,
    pub full_precision: PathBuf,
    pub quantized: Option<PathBuf>,
    pub tokenizer: Option<PathBuf>,
}

/// Writes an inference graph for a trained model.
pub trait GraphExporter {
    /// Export `request.model_path` to `output` following `spec`.
    ///
    /// # Errors
    ///
    /// Returns [`ConvertError`] when the export fails.
    fn export(
        &self,
        request: &ConversionRequest,
        spec: &ExportSpec,
        output: &Path,
    ) -> Result<(), ConvertError>;
}

/// Produces a reduced-precision copy of an exported graph.
pub trait WeightQuantizer {
    /// Quantize `input` into `output`.
    ///
    /// # Errors
    ///
    /// Returns [`ConvertError`] when quantization fails.
    fn quantize(&self, input: &Path, output: &Path, spec: &ExportSpec) -> Result<(), ConvertError>;
}

/// An absent quantizer fails only if quantization is requested.
impl<Q: WeightQuantizer> WeightQuantizer for Option<Q> {
    fn quantize(&self, input: &Path, output: &Path, spec: &ExportSpec) -> Result<(), ConvertError> {
        match self {
            Some(quantizer) => quantizer.quantize(input, output, spec),
            None => Err(ConfigurationError::MissingSetting("quantize_command").into()),
        }
    }
}

/// [`GraphExporter`] running an external program.
///
/// Invoked as `<command> --model-path <model> --output <file>
/// --classification-type <mode> --opset <n> --input-names <a>,<b>
/// --output-name <name>`.
#[derive(Debug, Clone)]
pub struct CommandExporter {
    command: ExternalCommand,
}

impl CommandExporter {
    #[must_use]
    pub const fn new(command: ExternalCommand) -> Self {
        Self { command }
    }
}

impl GraphExporter for CommandExporter {
    fn export(
        &self,
        request: &ConversionRequest,
        spec: &ExportSpec,
        output: &Path,
    ) -> Result<(), ConvertError> {
        let opset = spec.opset.to_string();
        let input_names = spec.input_names.join(",");
        let args: [&OsStr; 12] = [
            OsStr::new("--model-path"),
            OsStr::new(&request.model_path),
            OsStr::new("--output"),
            output.as_os_str(),
            OsStr::new("--classification-type"),
            OsStr::new(request.mode.as_str()),
            OsStr::new("--opset"),
            OsStr::new(&opset),
            OsStr::new("--input-names"),
            OsStr::new(&input_names),
            OsStr::new("--output-name"),
            OsStr::new(spec.output_name),
        ];
        self.command
            .run(args)
            .map_err(|source| ConvertError::ToolFailed {
                stage: "export",
                source,
            })
    }
}

/// [`WeightQuantizer`] running an external program.
///
/// Invoked as `<command> --input <file> --output <file> --weight-type <type>`.
#[derive(Debug, Clone)]
pub struct CommandQuantizer {
    command: ExternalCommand,
}

impl CommandQuantizer {
    #[must_use]
    pub const fn new(command: ExternalCommand) -> Self {
        Self { command }
    }
}

impl WeightQuantizer for CommandQuantizer {
    fn quantize(&self, input: &Path, output: &Path, spec: &ExportSpec) -> Result<(), ConvertError> {
        let args: [&OsStr; 6] = [
            OsStr::new("--input"),
            input.as_os_str(),
            OsStr::new("--output"),
            output.as_os_str(),
            OsStr::new("--weight-type"),
            OsStr::new(spec.weight_type),
        ];
        self.command
            .run(args)
            .map_err(|source| ConvertError::ToolFailed {
                stage: "quantization",
                source,
            })
    }
}

/// Runs one conversion end to end.
#[derive(Debug)]
pub struct ConversionDriver<T> {
    validator: EquivalenceValidator<T>,
    spec: ExportSpec,
}

impl<T: PromptTokenizer> ConversionDriver<T> {
    #[must_use]
    pub const fn new(validator: EquivalenceValidator<T>) -> Self {
        Self {
            validator,
            spec: ExportSpec::STANDARD,
        }
    }

    /// Convert `request`.
    ///
    /// The reference is captured from `original` before anything touches the
    /// filesystem, so a rejected architecture leaves no files behind. The
    /// quantized graph is derived from the full-precision export and never
    /// serves as a reference.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConvertError`] encountered.
    pub fn run<B, E, Q>(
        &self,
        request: &ConversionRequest,
        original: &B,
        exporter: &E,
        quantizer: &Q,
    ) -> Result<ConversionArtifacts, ConvertError>
    where
        B: InferenceBackend + ?Sized,
        E: GraphExporter + ?Sized,
        Q: WeightQuantizer + ?Sized,
    {
        info!(model = %request.model_path, "capturing reference logits");
        let mut record = self.validator.capture_reference(original)?;

        let layout = ArtefactLayout::new(&request.save_path, request.mode);
        fs::create_dir_all(layout.dir()).map_err(|source| ConvertError::Io {
            path: layout.dir().to_path_buf(),
            source,
        })?;

        let full_precision = layout.full_precision();
        info!(output = %full_precision.display(), opset = self.spec.opset, "exporting graph");
        exporter.export(request, &self.spec, &full_precision)?;
        ensure_produced("export", &full_precision)?;
        track(&mut record.artifacts, &full_precision)?;

        let quantized = if request.quantize {
            let output = layout.quantized();
            info!(output = %output.display(), weight_type = self.spec.weight_type, "quantizing graph");
            quantizer.quantize(&full_precision, &output, &self.spec)?;
            ensure_produced("quantization", &output)?;
            track(&mut record.artifacts, &output)?;
            Some(output)
        } else {
            None
        };

        let tokenizer = match &request.tokenizer_path {
            Some(source) => {
                let target = layout.tokenizer();
                if same_file(source, &target) {
                    debug!(tokenizer = %target.display(), "tokenizer already in place");
                } else {
                    fs::copy(source, &target).map_err(|err| ConvertError::Io {
                        path: target.clone(),
                        source: err,
                    })?;
                }
                track(&mut record.artifacts, &target)?;
                Some(target)
            }
            None => None,
        };

        let record_path = record.save(layout.dir())?;
        info!(record = %record_path.display(), "conversion finished");
        Ok(ConversionArtifacts {
            record: record_path,
            full_precision,
            quantized,
            tokenizer,
        })
    }
}

/// Copying a file onto itself truncates it, so both sides are resolved first.
fn same_file(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

fn ensure_produced(stage: &'static str, path: &Path) -> Result<(), ConvertError> {
    if path.is_file() {
        Ok(())
    } else {
        Err(ConvertError::MissingOutput {
            stage,
            path: path.to_path_buf(),
        })
    }
}

fn track(
    artifacts: &mut BTreeMap<String, String>,
    path: &Path,
) -> Result<(), ConvertError> {
    let digest = artefact::compute_sha256(path)?;
    if let Some(name) = path.file_name().and_then(|name| name.to_str()) {
        artifacts.insert(name.to_owned(), digest);
    }
    Ok(())
}

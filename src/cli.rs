//! CLI argument types and layered configuration for `gliclass-convert`,
//! `gliclass-validate` and `gliclass-classify`.
//!
//! Values come from command-line flags, environment variables
//! (`GLICLASS_CONVERT_*`, `GLICLASS_VALIDATE_*`, `GLICLASS_CLASSIFY_*`) and an
//! optional TOML file, in that order of precedence.

use std::{
    fs,
    path::{Path, PathBuf},
};

use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use ortho_config::OrthoError;
use serde::{Deserialize, de::DeserializeOwned};

use crate::{
    artefact::TOKENIZER_FILE,
    command::ExternalCommand,
    config::{
        ConfigurationError, DEFAULT_BATCH_SIZE, DEFAULT_MAX_LENGTH, DEFAULT_THRESHOLD,
        DEFAULT_TOLERANCE, DecoderConfig, validate_tolerance,
    },
    convert::ConversionRequest,
    logging::{LogConfig, LogError, LogFormat},
    mode::ClassificationMode,
    tokenize::PromptFormat,
};

/// Model converted when none is given.
pub const DEFAULT_MODEL: &str = "knowledgator/gliclass-base-v1.0";

/// Save directory used by both tools when none is given.
pub const DEFAULT_SAVE_PATH: &str = "model/";

const fn default_true() -> bool {
    true
}

fn extract<T: DeserializeOwned>(figment: Figment) -> Result<T, OrthoError> {
    figment.extract().map_err(Into::into)
}

fn log_config(format: Option<&str>, level: Option<&str>) -> Result<LogConfig, LogError> {
    let defaults = LogConfig::default();
    Ok(LogConfig {
        format: format
            .map(str::parse::<LogFormat>)
            .transpose()?
            .unwrap_or(defaults.format),
        level: level.map_or(defaults.level, str::to_owned),
    })
}

/// Command-line arguments for `gliclass-convert`.
///
/// # Examples
///
/// ```
/// use gliclass_onnx::cli::ConvertArgs;
/// use ortho_config::OrthoConfig;
///
/// let args = ConvertArgs::load_from_iter([
///     "gliclass-convert",
///     "--classification-type",
///     "single-label",
///     "--quantize=false",
/// ])
/// .expect("load args from CLI iterator");
/// assert!(!args.quantize);
/// assert_eq!(args.classification_type.as_deref(), Some("single-label"));
/// ```
#[derive(Debug, Deserialize, ortho_config::OrthoConfig)]
#[ortho_config(prefix = "GLICLASS_CONVERT")]
pub struct ConvertArgs {
    /// Hub identifier or local directory of the trained model.
    pub model_path: Option<String>,
    /// Directory receiving graphs, tokenizer and reference record.
    pub save_path: Option<PathBuf>,
    /// Also write a quantized graph.
    #[ortho_config(default = true)]
    #[serde(default = "default_true")]
    pub quantize: bool,
    /// `single-label` or `multi-label`.
    pub classification_type: Option<String>,
    /// Tokenizer file for the probe; also copied into the save directory.
    pub tokenizer_path: Option<PathBuf>,
    /// Program exporting the trained model to a graph.
    pub export_command: Option<String>,
    /// Program quantizing an exported graph.
    pub quantize_command: Option<String>,
    /// Program running the trained model on tokenised inputs.
    pub reference_command: Option<String>,
    /// Name recorded as the reference's source. Defaults to `model_path`.
    pub reference_model_name: Option<String>,
    /// Architecture tag of the trained model. Read from the model's
    /// `config.json` when unset.
    pub reference_architecture: Option<String>,
    /// `pretty` or `json`.
    pub log_format: Option<String>,
    pub log_level: Option<String>,

    /// Optional path to a configuration file.
    #[serde(skip)]
    pub config_path: Option<PathBuf>,
}

#[derive(Deserialize)]
struct ModelConfig {
    architecture_type: Option<String>,
}

impl ConvertArgs {
    /// Load configuration solely from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an [`OrthoError`] if any variable cannot be parsed.
    pub fn load_from_env() -> Result<Self, OrthoError> {
        extract(Figment::new().merge(Env::prefixed("GLICLASS_CONVERT_")))
    }

    /// Load configuration from a file path.
    ///
    /// # Errors
    ///
    /// Returns an [`OrthoError`] if the file cannot be read or parsed.
    pub fn load_from_config(path: &str) -> Result<Self, OrthoError> {
        extract(Figment::new().merge(Toml::file(path)))
    }

    /// Load configuration from environment variables and a file path.
    ///
    /// # Errors
    ///
    /// Returns an [`OrthoError`] if either source contains invalid values.
    pub fn load_from_env_and_config(path: &str) -> Result<Self, OrthoError> {
        extract(
            Figment::new()
                .merge(Toml::file(path))
                .merge(Env::prefixed("GLICLASS_CONVERT_")),
        )
    }

    /// The configured classification mode, `multi-label` by default.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::UnknownMode`] for unrecognised values.
    pub fn mode(&self) -> Result<ClassificationMode, ConfigurationError> {
        self.classification_type
            .as_deref()
            .map_or(Ok(ClassificationMode::MultiLabel), str::parse)
    }

    #[must_use]
    pub fn model_path(&self) -> &str {
        self.model_path.as_deref().unwrap_or(DEFAULT_MODEL)
    }

    /// Resolve everything the driver needs to know about the run.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError`] for an unknown classification type.
    pub fn request(&self) -> Result<ConversionRequest, ConfigurationError> {
        Ok(ConversionRequest {
            model_path: self.model_path().to_owned(),
            save_path: self
                .save_path
                .clone()
                .unwrap_or_else(|| PathBuf::from(DEFAULT_SAVE_PATH)),
            quantize: self.quantize,
            mode: self.mode()?,
            tokenizer_path: self.tokenizer_path.clone(),
        })
    }

    /// # Errors
    ///
    /// Returns [`ConfigurationError::MissingSetting`] when unset or blank.
    pub fn export_command(&self) -> Result<ExternalCommand, ConfigurationError> {
        required_command(self.export_command.as_deref(), "export_command")
    }

    /// `None` when unset; only needed when quantizing.
    #[must_use]
    pub fn quantize_command(&self) -> Option<ExternalCommand> {
        self.quantize_command.as_deref().and_then(ExternalCommand::parse)
    }

    /// # Errors
    ///
    /// Returns [`ConfigurationError::MissingSetting`] when unset or blank.
    pub fn reference_command(&self) -> Result<ExternalCommand, ConfigurationError> {
        required_command(self.reference_command.as_deref(), "reference_command")
    }

    #[must_use]
    pub fn reference_model_name(&self) -> &str {
        self.reference_model_name
            .as_deref()
            .unwrap_or_else(|| self.model_path())
    }

    /// Architecture tag of the trained model.
    ///
    /// Falls back to `architecture_type` in `<model_path>/config.json` when
    /// the model path is a local directory.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::MissingSetting`] when neither source
    /// provides a tag.
    pub fn reference_architecture(&self) -> Result<String, ConfigurationError> {
        if let Some(tag) = &self.reference_architecture {
            return Ok(tag.clone());
        }
        read_architecture(Path::new(self.model_path()))
            .ok_or(ConfigurationError::MissingSetting("reference_architecture"))
    }

    /// # Errors
    ///
    /// Returns [`LogError::UnknownFormat`] for an unsupported format.
    pub fn log_config(&self) -> Result<LogConfig, LogError> {
        log_config(self.log_format.as_deref(), self.log_level.as_deref())
    }
}

fn required_command(
    line: Option<&str>,
    name: &'static str,
) -> Result<ExternalCommand, ConfigurationError> {
    line.and_then(ExternalCommand::parse)
        .ok_or(ConfigurationError::MissingSetting(name))
}

fn read_architecture(model_dir: &Path) -> Option<String> {
    let raw = fs::read_to_string(model_dir.join("config.json")).ok()?;
    serde_json::from_str::<ModelConfig>(&raw)
        .ok()?
        .architecture_type
}

/// Command-line arguments for `gliclass-validate`.
///
/// # Examples
///
/// ```
/// use gliclass_onnx::cli::ValidateArgs;
/// use ortho_config::OrthoConfig;
///
/// let args = ValidateArgs::load_from_iter(["gliclass-validate", "--test-quantized=true"])
///     .expect("load args from CLI iterator");
/// assert!(args.test_quantized);
/// assert_eq!(args.onnx_path(), std::path::Path::new("model/"));
/// ```
#[derive(Debug, Deserialize, ortho_config::OrthoConfig)]
#[ortho_config(prefix = "GLICLASS_VALIDATE")]
pub struct ValidateArgs {
    /// Save directory written by `gliclass-convert`.
    pub onnx_path: Option<PathBuf>,
    /// Validate the quantized graph instead of the full-precision one.
    #[ortho_config(default = false)]
    #[serde(default)]
    pub test_quantized: bool,
    /// Absolute tolerance per logit.
    pub tolerance: Option<f32>,
    /// Tokenizer file. Defaults to `tokenizer.json` in the save directory.
    pub tokenizer_path: Option<PathBuf>,
    /// `pretty` or `json`.
    pub log_format: Option<String>,
    pub log_level: Option<String>,

    /// Optional path to a configuration file.
    #[serde(skip)]
    pub config_path: Option<PathBuf>,
}

impl ValidateArgs {
    /// Load configuration solely from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an [`OrthoError`] if any variable cannot be parsed.
    pub fn load_from_env() -> Result<Self, OrthoError> {
        extract(Figment::new().merge(Env::prefixed("GLICLASS_VALIDATE_")))
    }

    /// Load configuration from a file path.
    ///
    /// # Errors
    ///
    /// Returns an [`OrthoError`] if the file cannot be read or parsed.
    pub fn load_from_config(path: &str) -> Result<Self, OrthoError> {
        extract(Figment::new().merge(Toml::file(path)))
    }

    /// Load configuration from environment variables and a file path.
    ///
    /// # Errors
    ///
    /// Returns an [`OrthoError`] if either source contains invalid values.
    pub fn load_from_env_and_config(path: &str) -> Result<Self, OrthoError> {
        extract(
            Figment::new()
                .merge(Toml::file(path))
                .merge(Env::prefixed("GLICLASS_VALIDATE_")),
        )
    }

    #[must_use]
    pub fn onnx_path(&self) -> &Path {
        self.onnx_path
            .as_deref()
            .unwrap_or_else(|| Path::new(DEFAULT_SAVE_PATH))
    }

    #[must_use]
    pub fn tokenizer_path(&self) -> PathBuf {
        self.tokenizer_path
            .clone()
            .unwrap_or_else(|| self.onnx_path().join(TOKENIZER_FILE))
    }

    /// # Errors
    ///
    /// Returns [`ConfigurationError::InvalidTolerance`] for negative or
    /// non-finite values.
    pub fn tolerance(&self) -> Result<f32, ConfigurationError> {
        validate_tolerance(self.tolerance.unwrap_or(DEFAULT_TOLERANCE))
    }

    /// # Errors
    ///
    /// Returns [`LogError::UnknownFormat`] for an unsupported format.
    pub fn log_config(&self) -> Result<LogConfig, LogError> {
        log_config(self.log_format.as_deref(), self.log_level.as_deref())
    }
}

/// Command-line arguments for `gliclass-classify`.
///
/// # Examples
///
/// ```
/// use gliclass_onnx::cli::ClassifyArgs;
/// use ortho_config::OrthoConfig;
///
/// let args = ClassifyArgs::load_from_iter(["gliclass-classify", "--input-path", "job.json"])
///     .expect("load args from CLI iterator");
/// assert_eq!(args.input_path().ok(), Some(std::path::Path::new("job.json")));
/// assert!(!args.quantized);
/// ```
#[derive(Debug, Deserialize, ortho_config::OrthoConfig)]
#[ortho_config(prefix = "GLICLASS_CLASSIFY")]
pub struct ClassifyArgs {
    /// JSON job with `texts`, `labels` and optionally `same_labels` and
    /// `classification_type`.
    pub input_path: Option<PathBuf>,
    /// Save directory written by `gliclass-convert`.
    pub onnx_path: Option<PathBuf>,
    /// Run the quantized graph.
    #[ortho_config(default = false)]
    #[serde(default)]
    pub quantized: bool,
    /// Tokenizer file. Defaults to `tokenizer.json` in the save directory.
    pub tokenizer_path: Option<PathBuf>,
    /// Overrides `classification_type` from the job file.
    pub classification_type: Option<String>,
    pub threshold: Option<f32>,
    pub batch_size: Option<usize>,
    pub max_length: Option<usize>,
    /// `pretty` or `json`.
    pub log_format: Option<String>,
    pub log_level: Option<String>,

    /// Optional path to a configuration file.
    #[serde(skip)]
    pub config_path: Option<PathBuf>,
}

impl ClassifyArgs {
    /// Load configuration solely from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an [`OrthoError`] if any variable cannot be parsed.
    pub fn load_from_env() -> Result<Self, OrthoError> {
        extract(Figment::new().merge(Env::prefixed("GLICLASS_CLASSIFY_")))
    }

    /// Load configuration from a file path.
    ///
    /// # Errors
    ///
    /// Returns an [`OrthoError`] if the file cannot be read or parsed.
    pub fn load_from_config(path: &str) -> Result<Self, OrthoError> {
        extract(Figment::new().merge(Toml::file(path)))
    }

    /// Load configuration from environment variables and a file path.
    ///
    /// # Errors
    ///
    /// Returns an [`OrthoError`] if either source contains invalid values.
    pub fn load_from_env_and_config(path: &str) -> Result<Self, OrthoError> {
        extract(
            Figment::new()
                .merge(Toml::file(path))
                .merge(Env::prefixed("GLICLASS_CLASSIFY_")),
        )
    }

    /// # Errors
    ///
    /// Returns [`ConfigurationError::MissingSetting`] when unset.
    pub fn input_path(&self) -> Result<&Path, ConfigurationError> {
        self.input_path
            .as_deref()
            .ok_or(ConfigurationError::MissingSetting("input_path"))
    }

    #[must_use]
    pub fn onnx_path(&self) -> &Path {
        self.onnx_path
            .as_deref()
            .unwrap_or_else(|| Path::new(DEFAULT_SAVE_PATH))
    }

    #[must_use]
    pub fn tokenizer_path(&self) -> PathBuf {
        self.tokenizer_path
            .clone()
            .unwrap_or_else(|| self.onnx_path().join(TOKENIZER_FILE))
    }

    #[must_use]
    pub fn prompt_format(&self) -> PromptFormat {
        PromptFormat {
            max_length: self.max_length.unwrap_or(DEFAULT_MAX_LENGTH),
            ..PromptFormat::default()
        }
    }

    /// Decoder settings. The mode comes from the flag, then from the job
    /// file, and is `multi-label` otherwise.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError`] for an unknown mode, a threshold outside
    /// `[0, 1]` or a zero batch size.
    pub fn decoder_config(
        &self,
        job_mode: Option<ClassificationMode>,
    ) -> Result<DecoderConfig, ConfigurationError> {
        let mode = match self.classification_type.as_deref() {
            Some(raw) => raw.parse()?,
            None => job_mode.unwrap_or(ClassificationMode::MultiLabel),
        };
        DecoderConfig {
            mode,
            threshold: self.threshold.unwrap_or(DEFAULT_THRESHOLD),
            batch_size: self.batch_size.unwrap_or(DEFAULT_BATCH_SIZE),
        }
        .validate()
    }

    /// # Errors
    ///
    /// Returns [`LogError::UnknownFormat`] for an unsupported format.
    pub fn log_config(&self) -> Result<LogConfig, LogError> {
        log_config(self.log_format.as_deref(), self.log_level.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ortho_config::OrthoConfig;
    use rstest::rstest;
    use tempfile::TempDir;

    fn convert(args: &[&str]) -> ConvertArgs {
        ConvertArgs::load_from_iter(std::iter::once("gliclass-convert").chain(args.iter().copied()))
            .unwrap_or_else(|e| panic!("load convert args: {e}"))
    }

    #[rstest]
    fn convert_defaults_match_the_reference_tools() {
        let args = convert(&[]);
        let request = args.request().unwrap_or_else(|e| panic!("request: {e}"));
        assert_eq!(request.model_path, DEFAULT_MODEL);
        assert_eq!(request.save_path, PathBuf::from(DEFAULT_SAVE_PATH));
        assert!(request.quantize);
        assert_eq!(request.mode, ClassificationMode::MultiLabel);
    }

    #[rstest]
    fn unknown_classification_type_is_a_configuration_error() {
        let args = convert(&["--classification-type", "multi-class"]);
        assert!(matches!(args.mode(), Err(ConfigurationError::UnknownMode(_))));
    }

    #[rstest]
    fn missing_export_command_is_reported() {
        let args = convert(&[]);
        assert!(matches!(
            args.export_command(),
            Err(ConfigurationError::MissingSetting("export_command"))
        ));
        assert!(args.quantize_command().is_none());
    }

    #[rstest]
    fn architecture_falls_back_to_model_config() {
        let dir = TempDir::new().unwrap_or_else(|e| panic!("temp dir: {e}"));
        fs::write(
            dir.path().join("config.json"),
            r#"{"architecture_type": "uni-encoder", "hidden_size": 768}"#,
        )
        .unwrap_or_else(|e| panic!("write config: {e}"));
        let path = dir.path().to_str().unwrap_or_else(|| panic!("utf-8 path"));
        let args = convert(&["--model-path", path]);
        assert_eq!(
            args.reference_architecture().ok().as_deref(),
            Some("uni-encoder")
        );
        assert_eq!(args.reference_model_name(), path);
    }

    #[rstest]
    fn validate_tokenizer_defaults_into_save_directory() {
        let args = ValidateArgs::load_from_iter(["gliclass-validate", "--onnx-path", "out"])
            .unwrap_or_else(|e| panic!("load validate args: {e}"));
        assert_eq!(args.tokenizer_path(), Path::new("out").join("tokenizer.json"));
        assert_eq!(args.tolerance().ok(), Some(DEFAULT_TOLERANCE));
    }

    fn classify(args: &[&str]) -> ClassifyArgs {
        ClassifyArgs::load_from_iter(std::iter::once("gliclass-classify").chain(args.iter().copied()))
            .unwrap_or_else(|e| panic!("load classify args: {e}"))
    }

    #[rstest]
    fn classify_requires_an_input_file() {
        assert!(matches!(
            classify(&[]).input_path(),
            Err(ConfigurationError::MissingSetting("input_path"))
        ));
    }

    #[rstest]
    #[case(&[], Some(ClassificationMode::SingleLabel), ClassificationMode::SingleLabel)]
    #[case(&[], None, ClassificationMode::MultiLabel)]
    #[case(
        &["--classification-type", "multi-label"],
        Some(ClassificationMode::SingleLabel),
        ClassificationMode::MultiLabel
    )]
    fn classify_mode_prefers_flag_then_job(
        #[case] flags: &[&str],
        #[case] job: Option<ClassificationMode>,
        #[case] expected: ClassificationMode,
    ) {
        let cfg = classify(flags)
            .decoder_config(job)
            .unwrap_or_else(|e| panic!("decoder config: {e}"));
        assert_eq!(cfg.mode, expected);
        assert_eq!(cfg.batch_size, DEFAULT_BATCH_SIZE);
    }

    #[rstest]
    fn classify_rejects_zero_batch_size() {
        let args = classify(&["--batch-size", "0"]);
        assert_eq!(args.decoder_config(None), Err(ConfigurationError::ZeroBatchSize));
    }

    #[rstest]
    fn classify_defaults_read_the_save_directory() {
        let args = classify(&["--onnx-path", "out", "--max-length", "128"]);
        assert_eq!(args.tokenizer_path(), Path::new("out").join("tokenizer.json"));
        assert_eq!(args.prompt_format().max_length, 128);
        assert!(args.prompt_format().prompt_first);
    }

    #[rstest]
    #[case(Some("json"), LogFormat::Json)]
    #[case(None, LogFormat::Pretty)]
    fn log_format_resolves(#[case] raw: Option<&str>, #[case] expected: LogFormat) {
        let cfg = log_config(raw, None).unwrap_or_else(|e| panic!("log config: {e}"));
        assert_eq!(cfg.format, expected);
        assert_eq!(cfg.level, "info");
    }
}

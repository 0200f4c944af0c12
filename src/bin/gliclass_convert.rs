//! Convert a trained GLiClass model into ONNX graphs plus a reference record.

use std::{error::Error, process::ExitCode};

use gliclass_onnx::{
    ProcessBackend,
    cli::ConvertArgs,
    config::{ConfigurationError, DEFAULT_TOLERANCE},
    convert::{CommandExporter, CommandQuantizer, ConversionDriver},
    logging,
    tokenize::{HfPromptTokenizer, PromptFormat},
    validate::{EquivalenceValidator, Probe},
};
use ortho_config::OrthoConfig;
use tracing::{error, info};

fn run() -> Result<(), Box<dyn Error>> {
    let args = ConvertArgs::load()?;
    logging::init_logging(&args.log_config()?)?;

    let request = args.request()?;
    let tokenizer_path = request
        .tokenizer_path
        .clone()
        .ok_or(ConfigurationError::MissingSetting("tokenizer_path"))?;
    let tokenizer = HfPromptTokenizer::from_file(&tokenizer_path, PromptFormat::default())?;
    let validator = EquivalenceValidator::new(tokenizer, Probe::canonical(), DEFAULT_TOLERANCE)?;

    let original = ProcessBackend::new(
        args.reference_command()?,
        args.reference_model_name(),
        args.reference_architecture()?,
    );
    let exporter = CommandExporter::new(args.export_command()?);
    let quantizer = args.quantize_command().map(CommandQuantizer::new);

    info!(
        model = %request.model_path,
        save_path = %request.save_path.display(),
        mode = %request.mode,
        quantize = request.quantize,
        "starting conversion"
    );
    let artifacts = ConversionDriver::new(validator).run(&request, &original, &exporter, &quantizer)?;
    info!(graph = %artifacts.full_precision.display(), "full-precision graph written");
    if let Some(quantized) = &artifacts.quantized {
        info!(graph = %quantized.display(), "quantized graph written");
    }
    Ok(())
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err}");
            eprintln!("gliclass-convert: {err}");
            ExitCode::FAILURE
        }
    }
}

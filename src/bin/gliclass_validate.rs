//! Check that a converted graph reproduces the recorded reference logits.

use std::{error::Error, process::ExitCode};

use gliclass_onnx::{
    OnnxBackend, OnnxBackendConfig,
    cli::ValidateArgs,
    logging,
    record::ReferenceRecord,
    tokenize::{HfPromptTokenizer, PromptFormat},
    validate::{self, EquivalenceValidator, Probe, ValidationError},
};
use ortho_config::OrthoConfig;
use tracing::{error, info};

fn run() -> Result<bool, Box<dyn Error>> {
    let args = ValidateArgs::load()?;
    logging::init_logging(&args.log_config()?)?;

    let dir = args.onnx_path();
    let record = ReferenceRecord::load(dir).map_err(ValidationError::from)?;
    let graph = validate::locate_graph(dir, args.test_quantized, &record)?;
    info!(graph = %graph.display(), reference = %record.original_model_name, "validating graph");

    let tokenizer = HfPromptTokenizer::from_file(&args.tokenizer_path(), PromptFormat::default())?;
    let validator = EquivalenceValidator::new(tokenizer, Probe::canonical(), args.tolerance()?)?;
    let backend = OnnxBackend::new(OnnxBackendConfig::new(
        graph,
        record.original_model_name.clone(),
        record.architecture_type.clone(),
    ))?;
    Ok(validator.validate(&record, &backend)?)
}

fn main() -> ExitCode {
    match run() {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => {
            eprintln!("gliclass-validate: exported graph does not match the reference logits");
            ExitCode::FAILURE
        }
        Err(err) => {
            error!("{err}");
            eprintln!("gliclass-validate: {err}");
            ExitCode::FAILURE
        }
    }
}

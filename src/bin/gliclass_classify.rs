//! Classify a JSON job of texts and candidate labels with a converted graph.
//!
//! Predictions are written to stdout as a JSON array, one entry per text.

use std::{error::Error, io::Write, process::ExitCode};

use gliclass_onnx::{
    OnnxBackend, OnnxBackendConfig,
    artefact,
    classify::{ClassificationInput, Classifier},
    cli::ClassifyArgs,
    logging,
    record::{RecordError, ReferenceRecord},
    tokenize::HfPromptTokenizer,
    validate::{self, SUPPORTED_ARCHITECTURE},
};
use ortho_config::OrthoConfig;
use tracing::{error, info};

fn run() -> Result<(), Box<dyn Error>> {
    let args = ClassifyArgs::load()?;
    logging::init_logging(&args.log_config()?)?;

    let input = ClassificationInput::load(args.input_path()?)?;
    let config = args.decoder_config(input.classification_type)?;

    let dir = args.onnx_path();
    let (graph, model_id) = match ReferenceRecord::load(dir) {
        Ok(record) => (
            validate::locate_graph(dir, args.quantized, &record)?,
            record.original_model_name,
        ),
        Err(RecordError::MissingReference { .. }) => {
            let graph = artefact::discover_graph(dir, args.quantized)?;
            let id = graph.display().to_string();
            (graph, id)
        }
        Err(err) => return Err(err.into()),
    };
    info!(graph = %graph.display(), texts = input.texts.len(), mode = %config.mode, "classifying");

    let tokenizer = HfPromptTokenizer::from_file(&args.tokenizer_path(), args.prompt_format())?;
    let backend = OnnxBackend::new(OnnxBackendConfig::new(graph, model_id, SUPPORTED_ARCHITECTURE))?;
    let results = Classifier::new(tokenizer, backend, config)?.classify_input(&input)?;

    let mut stdout = std::io::stdout().lock();
    serde_json::to_writer_pretty(&mut stdout, &results)?;
    writeln!(stdout)?;
    Ok(())
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err}");
            eprintln!("gliclass-classify: {err}");
            ExitCode::FAILURE
        }
    }
}

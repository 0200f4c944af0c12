//! End-to-end classification of job files through the stub tokenizer and
//! scripted backends.

use gliclass_onnx::{
    ClassificationInput, ClassificationMode, Classifier, ClassifyError, DecoderConfig, LabelSet,
    tests::support::{FixedBackend, SequenceBackend, StubTokenizer},
};
use rstest::rstest;
use std::path::Path;

fn job(name: &str) -> ClassificationInput {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/golden").join(name);
    ClassificationInput::load(&path).unwrap_or_else(|e| panic!("load {name}: {e}"))
}

fn config(input: &ClassificationInput, batch_size: usize) -> DecoderConfig {
    DecoderConfig {
        batch_size,
        ..DecoderConfig::new(
            input
                .classification_type
                .unwrap_or(ClassificationMode::MultiLabel),
        )
    }
}

#[rstest]
fn shared_job_loads_with_declared_mode() {
    let input = job("classify_shared.json");
    assert_eq!(input.texts.len(), 3);
    assert_eq!(input.labels, LabelSet::shared(["sport", "politics", "technology"]));
    assert_eq!(input.classification_type, Some(ClassificationMode::SingleLabel));
}

#[rstest]
fn shared_job_classifies_each_text_once() {
    let input = job("classify_shared.json");
    let backend = FixedBackend::new(
        "knowledgator/gliclass-small-v1.0",
        "uni-encoder",
        &[
            vec![4.0, 0.5, -1.0],
            vec![-2.0, 3.0, 0.0],
            vec![0.0, 0.0, 2.5],
        ],
    );
    let classifier = Classifier::new(StubTokenizer::default(), backend, config(&input, 8))
        .unwrap_or_else(|e| panic!("build classifier: {e}"));
    let results = classifier
        .classify_input(&input)
        .unwrap_or_else(|e| panic!("classify: {e}"));
    let labels: Vec<&str> = results
        .iter()
        .map(|r| {
            let [only] = r.predictions.as_slice() else {
                panic!("single-label must yield one prediction, got {:?}", r.predictions);
            };
            only.label.as_str()
        })
        .collect();
    assert_eq!(labels, ["sport", "politics", "technology"]);
    assert_eq!(classifier.backend().calls(), 1);
    assert!(results.iter().zip(&input.texts).all(|(r, t)| &r.text == t));
}

#[rstest]
fn per_text_job_runs_one_pass_per_batch() {
    let input = job("classify_per_text.json");
    let backend = SequenceBackend::new([
        vec![vec![2.0, -2.0, 0.0]],
        vec![vec![3.0, -1.0, 0.0]],
    ]);
    let classifier = Classifier::new(StubTokenizer::default(), backend, config(&input, 1))
        .unwrap_or_else(|e| panic!("build classifier: {e}"));
    let results = classifier
        .classify_input(&input)
        .unwrap_or_else(|e| panic!("classify: {e}"));
    let names: Vec<Vec<&str>> = results
        .iter()
        .map(|r| r.predictions.iter().map(|p| p.label.as_str()).collect())
        .collect();
    // The first text only has two labels, so its third slot is never read.
    assert_eq!(names, vec![vec!["weather"], vec!["cooking"]]);
    assert_eq!(classifier.backend().calls(), 2);
}

#[rstest]
fn job_with_mismatched_label_rows_is_rejected() {
    let input: ClassificationInput = serde_json::from_str(
        r#"{"texts": ["a", "b", "c"], "labels": [["x"], ["y"]], "same_labels": false}"#,
    )
    .unwrap_or_else(|e| panic!("parse job: {e}"));
    assert!(matches!(
        input.check(),
        Err(ClassifyError::RowCount { texts: 3, rows: 2 })
    ));
}

#[rstest]
fn unknown_job_fields_are_rejected() {
    let result = serde_json::from_str::<ClassificationInput>(
        r#"{"texts": ["a"], "labels": ["x"], "threshold": 0.3}"#,
    );
    assert!(result.is_err());
}

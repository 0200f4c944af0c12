//! Property tests for the decoding engine.

use gliclass_onnx::{
    ClassificationMode, DecoderConfig, Decoder, LabelSet, Logits, PredictionSet,
};
use proptest::prelude::*;

fn labels(count: usize) -> LabelSet {
    LabelSet::shared((0..count).map(|i| format!("label-{i}")))
}

fn texts(count: usize) -> Vec<String> {
    (0..count).map(|i| format!("text {i}")).collect()
}

fn decode(
    mode: ClassificationMode,
    threshold: f32,
    batch_size: usize,
    labels: &LabelSet,
    logits: &Logits,
) -> Vec<PredictionSet> {
    let config = DecoderConfig {
        mode,
        threshold,
        batch_size,
    };
    let decoder = Decoder::new(config).unwrap_or_else(|e| panic!("build decoder: {e}"));
    decoder
        .decode(&texts(logits.batch()), labels, logits)
        .unwrap_or_else(|e| panic!("decode: {e}"))
}

/// `(examples, labels, logits)` with `labels` slots per example.
fn batch() -> impl Strategy<Value = (usize, usize, Vec<f32>)> {
    (1_usize..12, 1_usize..6).prop_flat_map(|(examples, slots)| {
        (
            Just(examples),
            Just(slots),
            prop::collection::vec(-12.0_f32..12.0, examples * slots),
        )
    })
}

fn logits(examples: usize, slots: usize, values: Vec<f32>) -> Logits {
    Logits::from_flat(values, [examples, slots], gliclass_onnx::AxisOrder::BatchMajor)
        .unwrap_or_else(|e| panic!("build logits: {e}"))
}

proptest! {
    #[test]
    fn batch_size_never_changes_results(
        (examples, slots, values) in batch(),
        batch_size in 1_usize..10,
        mode in prop::sample::select(vec![
            ClassificationMode::SingleLabel,
            ClassificationMode::MultiLabel,
        ]),
    ) {
        let logits = logits(examples, slots, values);
        let labels = labels(slots);
        let one = decode(mode, 0.5, 1, &labels, &logits);
        let many = decode(mode, 0.5, batch_size, &labels, &logits);
        prop_assert_eq!(one, many);
    }

    #[test]
    fn single_label_yields_exactly_one_prediction(
        (examples, slots, values) in batch(),
    ) {
        let logits = logits(examples, slots, values);
        let out = decode(ClassificationMode::SingleLabel, 0.5, 8, &labels(slots), &logits);
        prop_assert_eq!(out.len(), examples);
        prop_assert!(out.iter().all(|set| set.len() == 1));
    }

    #[test]
    fn multi_label_stays_within_label_count(
        (examples, slots, values) in batch(),
        threshold in 0.0_f32..=1.0,
    ) {
        let logits = logits(examples, slots, values);
        let out = decode(ClassificationMode::MultiLabel, threshold, 8, &labels(slots), &logits);
        prop_assert!(out.iter().all(|set| set.len() <= slots));
        prop_assert!(out.iter().flatten().all(|p| p.score > threshold));
    }

    #[test]
    fn raising_threshold_never_adds_predictions(
        (examples, slots, values) in batch(),
        a in 0.0_f32..=1.0,
        b in 0.0_f32..=1.0,
    ) {
        let (low, high) = if a <= b { (a, b) } else { (b, a) };
        let logits = logits(examples, slots, values);
        let labels = labels(slots);
        let loose = decode(ClassificationMode::MultiLabel, low, 8, &labels, &logits);
        let strict = decode(ClassificationMode::MultiLabel, high, 8, &labels, &logits);
        for (l, s) in loose.iter().zip(&strict) {
            prop_assert!(s.len() <= l.len());
        }
    }

    #[test]
    fn multi_label_preserves_slot_order(
        (examples, slots, values) in batch(),
    ) {
        let logits = logits(examples, slots, values);
        let out = decode(ClassificationMode::MultiLabel, 0.5, 8, &labels(slots), &logits);
        for set in out {
            let indices: Vec<usize> = set
                .iter()
                .filter_map(|p| p.label.strip_prefix("label-")?.parse().ok())
                .collect();
            prop_assert!(indices.windows(2).all(|w| matches!(w, [a, b] if a < b)));
        }
    }

    #[test]
    fn per_example_labels_never_read_past_their_length(
        lengths in prop::collection::vec(1_usize..5, 1..6),
        fill in -5.0_f32..5.0,
    ) {
        let width = lengths.iter().copied().max().unwrap_or(1);
        let rows: Vec<Vec<f32>> = lengths.iter().map(|_| vec![fill; width]).collect();
        let logits = Logits::from_rows(&rows).unwrap_or_else(|e| panic!("build logits: {e}"));
        let labels = LabelSet::per_example(
            lengths.iter().map(|&n| (0..n).map(|i| format!("label-{i}")).collect::<Vec<_>>()),
        );
        let out = decode(ClassificationMode::MultiLabel, 0.0, 2, &labels, &logits);
        for (set, &n) in out.iter().zip(&lengths) {
            prop_assert!(set.len() <= n);
        }
    }
}

//! Candidate label lists, shared across a batch or given per example.

use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Candidate labels for a batch.
///
/// The order of each sequence defines the slot-to-label mapping and must match
/// the order used when the labels were tokenised for that example.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LabelSet {
    /// One label sequence reused for every example.
    Shared(Vec<String>),
    /// One label sequence per example.
    PerExample(Vec<Vec<String>>),
}

impl LabelSet {
    /// Build a shared label set.
    ///
    /// # Examples
    ///
    /// ```
    /// use gliclass_onnx::LabelSet;
    ///
    /// let labels = LabelSet::shared(["format", "model"]);
    /// assert_eq!(labels.labels_for(3), Some(&["format".to_owned(), "model".to_owned()][..]));
    /// ```
    pub fn shared<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Shared(labels.into_iter().map(Into::into).collect())
    }

    /// Build a per-example label set.
    pub fn per_example<I, J, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = J>,
        J: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::PerExample(
            labels
                .into_iter()
                .map(|row| row.into_iter().map(Into::into).collect())
                .collect(),
        )
    }

    /// Labels that apply to the example at `index`.
    ///
    /// Returns `None` only for per-example sets when `index` is out of range.
    #[must_use]
    pub fn labels_for(&self, index: usize) -> Option<&[String]> {
        match self {
            Self::Shared(labels) => Some(labels.as_slice()),
            Self::PerExample(rows) => rows.get(index).map(Vec::as_slice),
        }
    }

    /// Number of example rows a per-example set carries; `None` when shared.
    #[must_use]
    pub fn rows(&self) -> Option<usize> {
        match self {
            Self::Shared(_) => None,
            Self::PerExample(rows) => Some(rows.len()),
        }
    }

    /// Labels for examples `start..start + len`. Shared sets are borrowed.
    #[must_use]
    pub fn batch(&self, start: usize, len: usize) -> Cow<'_, Self> {
        match self {
            Self::Shared(_) => Cow::Borrowed(self),
            Self::PerExample(rows) => Cow::Owned(Self::PerExample(
                rows.iter().skip(start).take(len).cloned().collect(),
            )),
        }
    }

    /// `true` for a set shared by every example.
    #[must_use]
    pub const fn is_shared(&self) -> bool {
        matches!(self, Self::Shared(_))
    }

    /// Longest label sequence across the set.
    #[must_use]
    pub fn max_len(&self) -> usize {
        match self {
            Self::Shared(labels) => labels.len(),
            Self::PerExample(rows) => rows.iter().map(Vec::len).max().unwrap_or(0),
        }
    }

}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn shared_applies_to_every_index() {
        let labels = LabelSet::shared(["a", "b"]);
        assert_eq!(labels.labels_for(0), labels.labels_for(99));
        assert_eq!(labels.rows(), None);
        assert_eq!(labels.max_len(), 2);
    }

    #[rstest]
    fn per_example_is_bounded() {
        let labels = LabelSet::per_example([vec!["a"], vec!["b", "c", "d"]]);
        assert_eq!(labels.labels_for(1).map(<[String]>::len), Some(3));
        assert!(labels.labels_for(2).is_none());
        assert_eq!(labels.rows(), Some(2));
        assert_eq!(labels.max_len(), 3);
    }

    #[rstest]
    fn batch_borrows_shared_and_slices_per_example() {
        let shared = LabelSet::shared(["a", "b"]);
        assert!(matches!(shared.batch(4, 2), Cow::Borrowed(_)));
        let rows = LabelSet::per_example([vec!["a"], vec!["b"], vec!["c"]]);
        assert_eq!(
            rows.batch(1, 5).into_owned(),
            LabelSet::per_example([vec!["b"], vec!["c"]])
        );
    }

    #[rstest]
    #[case(r#"["x","y"]"#, LabelSet::shared(["x", "y"]))]
    #[case(r#"[["x"],["y","z"]]"#, LabelSet::per_example([vec!["x"], vec!["y", "z"]]))]
    fn deserialises_either_shape(#[case] json: &str, #[case] expected: LabelSet) {
        let labels: LabelSet =
            serde_json::from_str(json).unwrap_or_else(|e| panic!("deserialise labels: {e}"));
        assert_eq!(labels, expected);
    }
}

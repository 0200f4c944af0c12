//! Dense logits tensor with one example axis and one label-slot axis.
//!
//! Logits are always held batch-major (`[batch, slots]`). Backends whose graph
//! emits slot-major output declare [`AxisOrder::SlotMajor`] and are
//! normalised on the way in, so decoding, persistence and comparison share a
//! single layout.

use thiserror::Error;

/// Layout of a two-dimensional logits buffer as produced by a backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AxisOrder {
    /// `[batch, slots]`.
    #[default]
    BatchMajor,
    /// `[slots, batch]`.
    SlotMajor,
}

/// Errors raised while building a [`Logits`] tensor.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LogitsError {
    #[error("logits tensor must be two-dimensional but has {0} axes")]
    Rank(usize),
    #[error("logits buffer holds {actual} values but shape requires {expected}")]
    Length { expected: usize, actual: usize },
    #[error("row {row} has {actual} slots but row 0 has {expected}")]
    Ragged {
        row: usize,
        expected: usize,
        actual: usize,
    },
    #[error("negative dimension {0} in logits shape")]
    NegativeDimension(i64),
}

/// Batch-major logits.
#[derive(Debug, Clone, PartialEq)]
pub struct Logits {
    data: Vec<f32>,
    batch: usize,
    slots: usize,
}

impl Logits {
    /// Wrap a flat buffer laid out in `order`.
    ///
    /// `shape` is given in the buffer's native order, so a slot-major buffer
    /// passes `[slots, batch]`.
    ///
    /// # Errors
    ///
    /// Returns [`LogitsError::Length`] when the buffer length does not match the shape.
    pub fn from_flat(
        data: Vec<f32>,
        shape: [usize; 2],
        order: AxisOrder,
    ) -> Result<Self, LogitsError> {
        let [outer, inner] = shape;
        let expected = outer.saturating_mul(inner);
        if data.len() != expected {
            return Err(LogitsError::Length {
                expected,
                actual: data.len(),
            });
        }
        match order {
            AxisOrder::BatchMajor => Ok(Self {
                data,
                batch: outer,
                slots: inner,
            }),
            AxisOrder::SlotMajor => {
                let (slots, batch) = (outer, inner);
                let mut transposed = Vec::with_capacity(data.len());
                for example in 0..batch {
                    transposed.extend((0..slots).filter_map(|slot| {
                        data.get(slot.saturating_mul(batch).saturating_add(example))
                            .copied()
                    }));
                }
                Ok(Self {
                    data: transposed,
                    batch,
                    slots,
                })
            }
        }
    }

    /// Wrap a runtime output whose shape arrives as signed dimensions.
    ///
    /// A rank-1 output is a squeezed batch axis and is read as a single
    /// example in either order.
    ///
    /// # Errors
    ///
    /// Returns [`LogitsError::Rank`] for tensors that are not one- or
    /// two-dimensional, and propagates [`Logits::from_flat`] failures.
    pub fn from_dims(data: Vec<f32>, dims: &[i64], order: AxisOrder) -> Result<Self, LogitsError> {
        let dims = dims
            .iter()
            .map(|&d| usize::try_from(d).map_err(|_| LogitsError::NegativeDimension(d)))
            .collect::<Result<Vec<_>, _>>()?;
        let shape = match (dims.as_slice(), order) {
            ([n], AxisOrder::BatchMajor) => [1, *n],
            // Native `[slots, batch]` with a batch of one.
            ([n], AxisOrder::SlotMajor) => [*n, 1],
            ([a, b], _) => [*a, *b],
            (other, _) => return Err(LogitsError::Rank(other.len())),
        };
        Self::from_flat(data, shape, order)
    }

    /// Build from nested batch-major rows.
    ///
    /// # Errors
    ///
    /// Returns [`LogitsError::Ragged`] when rows differ in length.
    ///
    /// # Examples
    ///
    /// ```
    /// use gliclass_onnx::Logits;
    ///
    /// let logits = Logits::from_rows(&[vec![0.5, -1.0], vec![2.0, 0.0]]).unwrap();
    /// assert_eq!(logits.slot(1, 0), Some(2.0));
    /// assert_eq!(logits.slot(1, 2), None);
    /// ```
    pub fn from_rows(rows: &[Vec<f32>]) -> Result<Self, LogitsError> {
        let slots = rows.first().map_or(0, Vec::len);
        let mut data = Vec::with_capacity(rows.len().saturating_mul(slots));
        for (row, values) in rows.iter().enumerate() {
            if values.len() != slots {
                return Err(LogitsError::Ragged {
                    row,
                    expected: slots,
                    actual: values.len(),
                });
            }
            data.extend_from_slice(values);
        }
        Ok(Self {
            data,
            batch: rows.len(),
            slots,
        })
    }

    /// Nested batch-major rows, as persisted in reference records.
    #[must_use]
    pub fn to_rows(&self) -> Vec<Vec<f32>> {
        if self.slots == 0 {
            return vec![Vec::new(); self.batch];
        }
        self.data.chunks(self.slots).map(<[f32]>::to_vec).collect()
    }

    /// Number of examples.
    #[must_use]
    pub const fn batch(&self) -> usize {
        self.batch
    }

    /// Number of label slots per example.
    #[must_use]
    pub const fn slots(&self) -> usize {
        self.slots
    }

    /// Logit at (`example`, `slot`), or `None` when either index is out of range.
    #[must_use]
    pub fn slot(&self, example: usize, slot: usize) -> Option<f32> {
        if example >= self.batch || slot >= self.slots {
            return None;
        }
        self.data
            .get(example.saturating_mul(self.slots).saturating_add(slot))
            .copied()
    }

    /// The first `len` slots of `example`, clamped to the tensor's slot count.
    #[must_use]
    pub fn row(&self, example: usize, len: usize) -> &[f32] {
        if example >= self.batch {
            return &[];
        }
        let start = example.saturating_mul(self.slots);
        let end = start.saturating_add(len.min(self.slots));
        self.data.get(start..end).unwrap_or(&[])
    }

    /// Flat batch-major values.
    #[must_use]
    pub fn values(&self) -> &[f32] {
        &self.data
    }

    /// Copy with every value rounded to `digits` decimal places.
    #[must_use]
    pub fn rounded(&self, digits: i32) -> Self {
        Self {
            data: self.data.iter().map(|&v| round_to(v, digits)).collect(),
            batch: self.batch,
            slots: self.slots,
        }
    }
}

/// Round `value` to `digits` decimal places, half away from zero.
#[must_use]
#[expect(
    clippy::float_arithmetic,
    clippy::cast_possible_truncation,
    reason = "decimal rounding scales in f64 and narrows back to f32"
)]
pub fn round_to(value: f32, digits: i32) -> f32 {
    if !value.is_finite() {
        return value;
    }
    let scale = 10f64.powi(digits);
    ((f64::from(value) * scale).round() / scale) as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::support::approx_eq;
    use rstest::rstest;

    #[rstest]
    fn slot_major_is_transposed() {
        // [slots = 3, batch = 2]
        let data = vec![1.0, 10.0, 2.0, 20.0, 3.0, 30.0];
        let logits = Logits::from_flat(data, [3, 2], AxisOrder::SlotMajor)
            .unwrap_or_else(|e| panic!("build logits: {e}"));
        assert_eq!(logits.batch(), 2);
        assert_eq!(logits.slots(), 3);
        assert_eq!(logits.to_rows(), vec![vec![1.0, 2.0, 3.0], vec![10.0, 20.0, 30.0]]);
    }

    #[rstest]
    fn from_flat_checks_length() {
        let result = Logits::from_flat(vec![1.0; 5], [2, 3], AxisOrder::BatchMajor);
        assert_eq!(
            result,
            Err(LogitsError::Length {
                expected: 6,
                actual: 5
            })
        );
    }

    #[rstest]
    #[case(&[4], AxisOrder::BatchMajor, 1, 4)]
    #[case(&[4], AxisOrder::SlotMajor, 1, 4)]
    #[case(&[2, 2], AxisOrder::BatchMajor, 2, 2)]
    fn from_dims_accepts_rank_one_and_two(
        #[case] dims: &[i64],
        #[case] order: AxisOrder,
        #[case] batch: usize,
        #[case] slots: usize,
    ) {
        let logits = Logits::from_dims(vec![0.0; 4], dims, order)
            .unwrap_or_else(|e| panic!("build logits: {e}"));
        assert_eq!((logits.batch(), logits.slots()), (batch, slots));
    }

    #[rstest]
    fn squeezed_slot_major_output_is_one_example() {
        let logits = Logits::from_dims(vec![1.0, 2.0, 3.0], &[3], AxisOrder::SlotMajor)
            .unwrap_or_else(|e| panic!("build logits: {e}"));
        assert_eq!(logits.to_rows(), vec![vec![1.0, 2.0, 3.0]]);
    }

    #[rstest]
    fn from_dims_rejects_rank_three() {
        let result = Logits::from_dims(vec![0.0; 8], &[2, 2, 2], AxisOrder::BatchMajor);
        assert_eq!(result, Err(LogitsError::Rank(3)));
    }

    #[rstest]
    fn ragged_rows_are_rejected() {
        let result = Logits::from_rows(&[vec![1.0, 2.0], vec![3.0]]);
        assert!(matches!(result, Err(LogitsError::Ragged { row: 1, .. })));
    }

    #[rstest]
    fn out_of_range_access_is_none() {
        let logits = Logits::from_rows(&[vec![1.0, 2.0]])
            .unwrap_or_else(|e| panic!("build logits: {e}"));
        assert_eq!(logits.slot(0, 2), None);
        assert_eq!(logits.slot(1, 0), None);
        assert_eq!(logits.row(0, 10), &[1.0, 2.0]);
        assert!(logits.row(3, 1).is_empty());
    }

    #[rstest]
    #[case(1.234_56, 1.2346)]
    #[case(-0.000_04, 0.0)]
    #[case(-2.718_28, -2.7183)]
    fn rounds_to_four_digits(#[case] input: f32, #[case] expected: f32) {
        assert!(approx_eq(round_to(input, 4), expected, 1e-6));
    }
}

//! Greedy decoding of model outputs into text.

mod attention;
mod ctc;

pub use attention::{cross_entropy, AttentionDecoder, AttentionPredict};
pub use ctc::{collapse_repeats, CtcDecoder, CtcInference};

use burn::tensor::{Int, Tensor, backend::Backend};

use crate::error::{Result, ValidationError};

/// Decoded predictions of one validation batch next to their references.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecodedBatch {
    pub predictions: Vec<String>,
    pub references: Vec<String>,
    /// Per-example loss, flattened.
    pub losses: Vec<f64>,
}

impl DecodedBatch {
    pub fn len(&self) -> usize {
        self.predictions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.predictions.is_empty()
    }
}

/// Index of the largest value; ties go to the lowest index.
pub fn argmax(row: &[f32]) -> usize {
    let mut best = 0;
    for (i, &value) in row.iter().enumerate().skip(1) {
        if value > row[best] {
            best = i;
        }
    }
    best
}

pub(crate) fn float_values<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> Result<Vec<f32>> {
    tensor
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|err| ValidationError::TensorData(format!("{err:?}")))
}

pub(crate) fn int_values<B: Backend, const D: usize>(
    tensor: Tensor<B, D, Int>,
) -> Result<Vec<i64>> {
    tensor
        .into_data()
        .convert::<i64>()
        .to_vec::<i64>()
        .map_err(|err| ValidationError::TensorData(format!("{err:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_argmax_prefers_first_maximum() {
        assert_eq!(argmax(&[0.1, 0.7, 0.7, 0.2]), 1);
        assert_eq!(argmax(&[0.9]), 0);
    }
}

use burn::tensor::{Tensor, backend::Backend};
use std::collections::HashMap;

use super::{argmax, float_values, DecodedBatch};
use crate::data::{AttentionBatch, LabelCodec};
use crate::error::{Result, ValidationError};

/// Prediction operation of an attention (seq2seq) model.
pub trait AttentionPredict<B: Backend> {
    /// Per-timestep class probabilities, `[batch, timesteps, classes]`.
    fn predict(&self, images: Tensor<B, 4>) -> Tensor<B, 3>;
}

/// Mean cross-entropy between a probability matrix and its one-hot targets.
///
/// Probabilities are clipped to `[epsilon, 1 - epsilon]` and the mean runs over
/// every element of the matrix, not only the hot ones.
pub fn cross_entropy(predictions: &[f32], targets: &[f32], epsilon: f64) -> f64 {
    if predictions.is_empty() {
        return 0.0;
    }
    let sum: f64 = predictions
        .iter()
        .zip(targets)
        .map(|(&p, &t)| f64::from(p).clamp(epsilon, 1.0 - epsilon).ln() * f64::from(t))
        .sum();
    -sum / predictions.len() as f64
}

/// Greedy decoder reading argmax characters until the end-of-sequence sentinel.
#[derive(Debug, Clone)]
pub struct AttentionDecoder {
    eos_char: char,
    epsilon: f64,
}

impl AttentionDecoder {
    pub fn new(eos_char: char, epsilon: f64) -> Self {
        Self { eos_char, epsilon }
    }

    /// Decode one `[timesteps, classes]` matrix. Works on model outputs and on
    /// one-hot targets alike.
    pub fn decode_sequence(&self, values: &[f32], classes: usize, index: &HashMap<i64, char>) -> String {
        let mut text = String::new();
        for row in values.chunks(classes) {
            let Some(&ch) = index.get(&(argmax(row) as i64)) else {
                continue;
            };
            if ch == self.eos_char {
                break;
            }
            text.push(ch);
        }
        text
    }

    pub fn decode_batch<B, M, C>(
        &self,
        model: &M,
        batch: &AttentionBatch<B>,
        codec: &C,
    ) -> Result<DecodedBatch>
    where
        B: Backend,
        M: AttentionPredict<B> + ?Sized,
        C: LabelCodec + ?Sized,
    {
        let predicts = model.predict(batch.images.clone());
        let predict_dims = predicts.dims();
        let target_dims = batch.targets.dims();
        if predict_dims != target_dims || batch.batch_size() != target_dims[0] {
            return Err(ValidationError::ShapeMismatch(format!(
                "predictions {:?} vs targets {:?}",
                predict_dims, target_dims
            )));
        }

        let [batch_size, timesteps, classes] = predict_dims;
        if classes == 0 {
            return Err(ValidationError::ShapeMismatch("output has no classes".into()));
        }
        let predicts = float_values(predicts)?;
        let targets = float_values(batch.targets.clone())?;
        let index = codec.reverse_char_index();
        let example_len = timesteps * classes;

        let mut decoded = DecodedBatch::default();
        for i in 0..batch_size {
            let range = i * example_len..(i + 1) * example_len;
            let predict = &predicts[range.clone()];
            let label = &targets[range];

            decoded.predictions.push(self.decode_sequence(predict, classes, index));
            decoded.references.push(self.decode_sequence(label, classes, index));
            decoded.losses.push(cross_entropy(predict, label, self.epsilon));
        }

        Ok(decoded)
    }
}

use anyhow::Result as AnyResult;
use burn::module::Module;
use burn::nn::{Linear, LinearConfig};
use burn::tensor::activation::softmax;
use burn::tensor::{Tensor, TensorData, backend::Backend};
use std::path::{Path, PathBuf};

use super::ctc_loss::ctc_negative_log_likelihood;
use crate::checkpoint::{save_module, save_module_weights, CheckpointMeta, Checkpointable};
use crate::data::CtcBatch;
use crate::decode::{float_values, int_values, AttentionPredict, CtcInference};
use crate::error::Result;

/// Minimal recognizer: every image column is one output frame, projected
/// from its pixel column onto the class scores.
#[derive(Module, Debug)]
pub struct SequenceHead<B: Backend> {
    proj: Linear<B>,
    #[module(skip)]
    blank: usize,
    #[module(skip)]
    skip_frames: usize,
}

impl<B: Backend> SequenceHead<B> {
    /// `height` is the pixel height of the input images, `classes` includes the blank.
    pub fn new(height: usize, classes: usize, skip_frames: usize, device: &B::Device) -> Self {
        Self {
            proj: LinearConfig::new(height, classes).init(device),
            blank: classes.saturating_sub(1),
            skip_frames,
        }
    }

    /// Class scores `[batch, width, classes]`.
    pub fn forward_logits(&self, images: Tensor<B, 4>) -> Tensor<B, 3> {
        let [batch_size, _, height, width] = images.dims();
        let columns = images
            .mean_dim(1)
            .reshape([batch_size, height, width])
            .swap_dims(1, 2);

        self.proj.forward(columns)
    }

    /// Class probabilities `[batch, width, classes]`.
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 3> {
        softmax(self.forward_logits(images), 2)
    }

    pub fn blank(&self) -> usize {
        self.blank
    }
}

impl<B: Backend> AttentionPredict<B> for SequenceHead<B> {
    fn predict(&self, images: Tensor<B, 4>) -> Tensor<B, 3> {
        self.forward(images)
    }
}

impl<B: Backend> CtcInference<B> for SequenceHead<B> {
    fn infer(&self, batch: &CtcBatch<B>) -> Result<(Tensor<B, 3>, Tensor<B, 2>)> {
        let device = batch.images.device();
        let probabilities = self.forward(batch.images.clone());
        let [batch_size, timesteps, classes] = probabilities.dims();

        let values = float_values(probabilities.clone())?;
        let labels = int_values(batch.labels.clone())?;
        let label_length = int_values(batch.label_length.clone())?;
        let input_length = int_values(batch.input_length.clone())?;
        let max_label_len = batch.labels.dims()[1];

        // Loss is taken over the frames after the skipped prefix, like the decoder sees them.
        let mut losses = Vec::with_capacity(batch_size);
        for j in 0..batch_size {
            let start = self.skip_frames.min(timesteps);
            let usable = (input_length[j].max(0) as usize).min(timesteps - start);
            let offset = j * timesteps * classes;
            let frames = &values[offset + start * classes..offset + (start + usable) * classes];

            let len = (label_length[j].max(0) as usize).min(max_label_len);
            let target = &labels[j * max_label_len..j * max_label_len + len];

            let loss = ctc_negative_log_likelihood(frames, classes, target, self.blank as i64);
            losses.push(loss as f32);
        }

        let loss = Tensor::from_data(TensorData::new(losses, [batch_size, 1]), &device);
        Ok((probabilities, loss))
    }
}

impl<B: Backend> Checkpointable for SequenceHead<B> {
    fn save_weights(&self, path: &Path) -> AnyResult<PathBuf> {
        save_module_weights::<B, Self>(self, path)
    }

    fn save_model(&self, path: &Path, meta: &CheckpointMeta) -> AnyResult<PathBuf> {
        save_module::<B, Self>(self, path, meta)
    }
}

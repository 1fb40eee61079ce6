use burn::tensor::{Int, Tensor, backend::Backend};

/// Validation batch for a CTC model.
#[derive(Clone, Debug)]
pub struct CtcBatch<B: Backend> {
    /// `[batch, channels, height, width]`
    pub images: Tensor<B, 4>,
    /// `[batch, max_label_len]`, padded label ids.
    pub labels: Tensor<B, 2, Int>,
    /// `[batch]`, usable output frames per example.
    pub input_length: Tensor<B, 1, Int>,
    /// `[batch]`, valid prefix of each label row.
    pub label_length: Tensor<B, 1, Int>,
}

impl<B: Backend> CtcBatch<B> {
    pub fn new(
        images: Tensor<B, 4>,
        labels: Tensor<B, 2, Int>,
        input_length: Tensor<B, 1, Int>,
        label_length: Tensor<B, 1, Int>,
    ) -> Self {
        Self {
            images,
            labels,
            input_length,
            label_length,
        }
    }

    pub fn batch_size(&self) -> usize {
        self.images.dims()[0]
    }
}

/// Validation batch for an attention model.
#[derive(Clone, Debug)]
pub struct AttentionBatch<B: Backend> {
    /// `[batch, channels, height, width]`
    pub images: Tensor<B, 4>,
    /// `[batch, timesteps, classes]`, one-hot rows.
    pub targets: Tensor<B, 3>,
}

impl<B: Backend> AttentionBatch<B> {
    pub fn new(images: Tensor<B, 4>, targets: Tensor<B, 3>) -> Self {
        Self { images, targets }
    }

    pub fn batch_size(&self) -> usize {
        self.images.dims()[0]
    }
}

/// Training batch with one target class per output frame.
#[derive(Clone, Debug)]
pub struct TrainBatch<B: Backend> {
    pub images: Tensor<B, 4>,
    /// `[batch, width]`
    pub frame_targets: Tensor<B, 2, Int>,
}

impl<B: Backend> TrainBatch<B> {
    pub fn new(images: Tensor<B, 4>, frame_targets: Tensor<B, 2, Int>) -> Self {
        Self {
            images,
            frame_targets,
        }
    }
}

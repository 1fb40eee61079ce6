use burn::tensor::{Int, Tensor, TensorData, backend::Backend};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::batch::{AttentionBatch, CtcBatch, TrainBatch};
use super::codec::{AlphabetCodec, LabelCodec};
use crate::config::{CallbackConfig, HeadConfig};

/// Generator of toy OCR samples: column `t` of an image lights up the row of
/// the class expected at output frame `t`.
pub struct SyntheticOcr {
    codec: AlphabetCodec,
    width: usize,
    max_text_len: usize,
    skip_frames: usize,
    noise: f32,
    rng: StdRng,
}

impl SyntheticOcr {
    pub fn new(callback: &CallbackConfig, head: &HeadConfig, seed: u64) -> Self {
        Self {
            codec: AlphabetCodec::from_letters(&callback.letters, callback.eos_char),
            width: head.width,
            max_text_len: head.max_text_len,
            skip_frames: callback.skip_frames,
            noise: head.noise,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn codec(&self) -> &AlphabetCodec {
        &self.codec
    }

    /// Random label sequences, one per example, each 1..=max_text_len long.
    pub fn sample_labels(&mut self, batch_size: usize) -> Vec<Vec<i64>> {
        let alphabet = self.codec.letters().len() as i64;
        (0..batch_size)
            .map(|_| {
                let len = self.rng.gen_range(1..=self.max_text_len);
                (0..len).map(|_| self.rng.gen_range(0..alphabet)).collect()
            })
            .collect()
    }

    /// CTC frame alignment: blank prefix, then every label followed by a blank.
    pub fn ctc_frames(&self, labels: &[i64]) -> Vec<i64> {
        let blank = self.codec.blank_id();
        let mut frames = vec![blank; self.width];
        for (i, &label) in labels.iter().enumerate() {
            let t = self.skip_frames + 2 * i;
            if t < self.width {
                frames[t] = label;
            }
        }
        frames
    }

    /// Attention alignment: labels, then the sentinel class up to the last frame.
    pub fn attention_frames(&self, labels: &[i64]) -> Vec<i64> {
        let eos = self.codec.blank_id();
        let mut frames = vec![eos; self.width];
        for (t, &label) in labels.iter().take(self.width).enumerate() {
            frames[t] = label;
        }
        frames
    }

    pub fn ctc_batch<B: Backend>(&mut self, batch_size: usize, device: &B::Device) -> CtcBatch<B> {
        let labels = self.sample_labels(batch_size);
        let frames: Vec<Vec<i64>> = labels.iter().map(|l| self.ctc_frames(l)).collect();
        let images = self.render::<B>(&frames, device);

        let blank = self.codec.blank_id();
        let mut padded = Vec::with_capacity(batch_size * self.max_text_len);
        for row in &labels {
            padded.extend(row.iter().copied());
            padded.extend(std::iter::repeat(blank).take(self.max_text_len - row.len()));
        }
        let lengths: Vec<i64> = labels.iter().map(|l| l.len() as i64).collect();
        let input_length = vec![(self.width - self.skip_frames) as i64; batch_size];

        CtcBatch::new(
            images,
            Tensor::from_data(TensorData::new(padded, [batch_size, self.max_text_len]), device),
            Tensor::from_data(TensorData::new(input_length, [batch_size]), device),
            Tensor::from_data(TensorData::new(lengths, [batch_size]), device),
        )
    }

    pub fn attention_batch<B: Backend>(
        &mut self,
        batch_size: usize,
        device: &B::Device,
    ) -> AttentionBatch<B> {
        let labels = self.sample_labels(batch_size);
        let frames: Vec<Vec<i64>> = labels.iter().map(|l| self.attention_frames(l)).collect();
        let images = self.render::<B>(&frames, device);
        let targets = self.one_hot::<B>(&frames, device);

        AttentionBatch::new(images, targets)
    }

    /// Frame-level training batch, aligned for CTC (`ctc = true`) or attention decoding.
    pub fn train_batch<B: Backend>(
        &mut self,
        batch_size: usize,
        ctc: bool,
        device: &B::Device,
    ) -> TrainBatch<B> {
        let labels = self.sample_labels(batch_size);
        let frames: Vec<Vec<i64>> = labels
            .iter()
            .map(|l| if ctc { self.ctc_frames(l) } else { self.attention_frames(l) })
            .collect();
        let images = self.render::<B>(&frames, device);
        let flat: Vec<i64> = frames.into_iter().flatten().collect();
        let frame_targets =
            Tensor::<B, 2, Int>::from_data(TensorData::new(flat, [batch_size, self.width]), device);

        TrainBatch::new(images, frame_targets)
    }

    fn render<B: Backend>(&mut self, frames: &[Vec<i64>], device: &B::Device) -> Tensor<B, 4> {
        let classes = self.codec.num_classes();
        let batch_size = frames.len();
        let mut pixels = vec![0.0f32; batch_size * classes * self.width];

        for pixel in pixels.iter_mut() {
            if self.noise > 0.0 {
                *pixel = self.rng.gen_range(0.0..self.noise);
            }
        }
        for (b, row) in frames.iter().enumerate() {
            for (t, &class) in row.iter().enumerate() {
                pixels[b * classes * self.width + class as usize * self.width + t] = 1.0;
            }
        }

        Tensor::from_data(
            TensorData::new(pixels, [batch_size, 1, classes, self.width]),
            device,
        )
    }

    fn one_hot<B: Backend>(&self, frames: &[Vec<i64>], device: &B::Device) -> Tensor<B, 3> {
        let classes = self.codec.num_classes();
        let batch_size = frames.len();
        let mut values = vec![0.0f32; batch_size * self.width * classes];

        for (b, row) in frames.iter().enumerate() {
            for (t, &class) in row.iter().enumerate() {
                values[(b * self.width + t) * classes + class as usize] = 1.0;
            }
        }

        Tensor::from_data(TensorData::new(values, [batch_size, self.width, classes]), device)
    }
}

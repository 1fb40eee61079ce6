use burn::tensor::backend::Backend;
use std::marker::PhantomData;
use tracing::debug;

use crate::config::{CallbackConfig, LossAccumulation};
use crate::data::{pull, AlphabetCodec, AttentionBatch, CtcBatch, LabelCodec, ValidationSource};
use crate::decode::{AttentionDecoder, AttentionPredict, CtcDecoder, CtcInference};
use crate::error::Result;
use crate::metrics::{show_edit_distance, BatchScore, EpochAccumulator, EpochMetrics};

/// Validation pass over a fixed number of steps for one model family.
pub trait ValidationEvaluator<M> {
    /// Score `steps` batches of `batch_size` examples each and average them.
    /// The returned metrics carry epoch 0; the caller stamps the real index.
    fn evaluate_epoch(&mut self, model: &M, steps: usize, batch_size: usize) -> Result<EpochMetrics>;
}

fn run_steps<F>(steps: usize, batch_size: usize, mut step: F) -> Result<EpochMetrics>
where
    F: FnMut(usize) -> Result<BatchScore>,
{
    let mut epoch = EpochAccumulator::new();
    for index in 0..steps {
        let score = step(batch_size)?;
        debug!(
            "Validation step {}/{}: mean_ed={:.3} loss={:.3} true_fields={}",
            index + 1,
            steps,
            score.mean_edit_distance,
            score.loss,
            score.true_fields
        );
        epoch.add(&score);
    }
    Ok(epoch.finish(0, batch_size))
}

/// Evaluator for CTC models driven by an inference-plus-loss function.
pub struct CtcEvaluator<B: Backend, S, C = AlphabetCodec> {
    source: S,
    codec: C,
    decoder: CtcDecoder,
    accumulation: LossAccumulation,
    _backend: PhantomData<B>,
}

impl<B: Backend, S: ValidationSource<CtcBatch<B>>> CtcEvaluator<B, S> {
    pub fn from_config(source: S, config: &CallbackConfig) -> Self {
        let codec = AlphabetCodec::from_letters(&config.letters, config.eos_char);
        Self::new(source, codec, CtcDecoder::new(config.skip_frames), config.loss_accumulation)
    }
}

impl<B, S, C> CtcEvaluator<B, S, C>
where
    B: Backend,
    S: ValidationSource<CtcBatch<B>>,
    C: LabelCodec,
{
    pub fn new(source: S, codec: C, decoder: CtcDecoder, accumulation: LossAccumulation) -> Self {
        Self {
            source,
            codec,
            decoder,
            accumulation,
            _backend: PhantomData,
        }
    }

    /// Score `num` examples pulled from the validation source.
    pub fn show_edit_distance<M: CtcInference<B> + ?Sized>(&mut self, model: &M, num: usize) -> Result<BatchScore> {
        let Self {
            source,
            codec,
            decoder,
            accumulation,
            ..
        } = self;

        show_edit_distance(num, *accumulation, || {
            let batch = pull(&mut *source)?;
            decoder.decode_batch(model, &batch, codec)
        })
    }

    pub fn source(&self) -> &S {
        &self.source
    }
}

impl<B, S, C, M> ValidationEvaluator<M> for CtcEvaluator<B, S, C>
where
    B: Backend,
    S: ValidationSource<CtcBatch<B>>,
    C: LabelCodec,
    M: CtcInference<B>,
{
    fn evaluate_epoch(&mut self, model: &M, steps: usize, batch_size: usize) -> Result<EpochMetrics> {
        run_steps(steps, batch_size, |num| self.show_edit_distance(model, num))
    }
}

/// Evaluator for attention models driven by their `predict` operation.
pub struct AttentionEvaluator<B: Backend, S, C = AlphabetCodec> {
    source: S,
    codec: C,
    decoder: AttentionDecoder,
    accumulation: LossAccumulation,
    _backend: PhantomData<B>,
}

impl<B: Backend, S: ValidationSource<AttentionBatch<B>>> AttentionEvaluator<B, S> {
    pub fn from_config(source: S, config: &CallbackConfig) -> Self {
        let codec = AlphabetCodec::from_letters(&config.letters, config.eos_char);
        let decoder = AttentionDecoder::new(config.eos_char, config.epsilon);
        Self::new(source, codec, decoder, config.loss_accumulation)
    }
}

impl<B, S, C> AttentionEvaluator<B, S, C>
where
    B: Backend,
    S: ValidationSource<AttentionBatch<B>>,
    C: LabelCodec,
{
    pub fn new(source: S, codec: C, decoder: AttentionDecoder, accumulation: LossAccumulation) -> Self {
        Self {
            source,
            codec,
            decoder,
            accumulation,
            _backend: PhantomData,
        }
    }

    pub fn show_edit_distance<M: AttentionPredict<B> + ?Sized>(
        &mut self,
        model: &M,
        num: usize,
    ) -> Result<BatchScore> {
        let Self {
            source,
            codec,
            decoder,
            accumulation,
            ..
        } = self;

        show_edit_distance(num, *accumulation, || {
            let batch = pull(&mut *source)?;
            decoder.decode_batch(model, &batch, codec)
        })
    }

    pub fn source(&self) -> &S {
        &self.source
    }
}

impl<B, S, C, M> ValidationEvaluator<M> for AttentionEvaluator<B, S, C>
where
    B: Backend,
    S: ValidationSource<AttentionBatch<B>>,
    C: LabelCodec,
    M: AttentionPredict<B>,
{
    fn evaluate_epoch(&mut self, model: &M, steps: usize, batch_size: usize) -> Result<EpochMetrics> {
        run_steps(steps, batch_size, |num| self.show_edit_distance(model, num))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::CyclicSource;
    use burn::tensor::{Int, Tensor, TensorData};
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    const CLASSES: usize = 4;

    fn one_hot(frames: &[Vec<usize>]) -> Tensor<TestBackend, 3> {
        let width = frames[0].len();
        let mut values = vec![0.0f32; frames.len() * width * CLASSES];
        for (b, row) in frames.iter().enumerate() {
            for (t, &class) in row.iter().enumerate() {
                values[(b * width + t) * CLASSES + class] = 1.0;
            }
        }
        Tensor::from_data(TensorData::new(values, [frames.len(), width, CLASSES]), &Default::default())
    }

    /// Model whose predictions are its input images read column by column.
    struct Mirror;

    impl AttentionPredict<TestBackend> for Mirror {
        fn predict(&self, images: Tensor<TestBackend, 4>) -> Tensor<TestBackend, 3> {
            let [batch, _, classes, width] = images.dims();
            images.reshape([batch, classes, width]).swap_dims(1, 2)
        }
    }

    impl CtcInference<TestBackend> for Mirror {
        fn infer(
            &self,
            batch: &CtcBatch<TestBackend>,
        ) -> Result<(Tensor<TestBackend, 3>, Tensor<TestBackend, 2>)> {
            let probs = self.predict(batch.images.clone());
            let batch_size = probs.dims()[0];
            let loss = Tensor::ones([batch_size, 1], &batch.images.device());
            Ok((probs, loss))
        }
    }

    fn attention_batch(frames: &[Vec<usize>], targets: &[Vec<usize>]) -> AttentionBatch<TestBackend> {
        let predicted = one_hot(frames);
        let [batch, width, classes] = predicted.dims();
        let images = predicted.swap_dims(1, 2).reshape([batch, 1, classes, width]);
        AttentionBatch::new(images, one_hot(targets))
    }

    fn config() -> CallbackConfig {
        CallbackConfig {
            letters: "abc".to_string(),
            ..CallbackConfig::default()
        }
    }

    #[test]
    fn test_attention_epoch_with_all_matches() {
        let frames = vec![vec![0, 1, 3], vec![2, 3, 3], vec![1, 1, 3], vec![0, 3, 0]];
        let source = CyclicSource::new(vec![attention_batch(&frames, &frames)]);
        let mut evaluator = AttentionEvaluator::from_config(source, &config());

        let metrics = evaluator.evaluate_epoch(&Mirror, 2, 4).unwrap();

        assert_eq!(metrics.field_accuracy, 1.0);
        assert_eq!(metrics.mean_edit_distance, 0.0);
        assert_eq!(evaluator.source().drawn(), 2);
    }

    #[test]
    fn test_attention_epoch_with_one_mismatch() {
        let predicted = vec![vec![0, 1, 3], vec![2, 3, 3]];
        let expected = vec![vec![0, 1, 3], vec![1, 3, 3]];
        let source = CyclicSource::new(vec![attention_batch(&predicted, &expected)]);
        let mut evaluator = AttentionEvaluator::from_config(source, &config());

        let metrics = evaluator.evaluate_epoch(&Mirror, 1, 2).unwrap();

        assert_eq!(metrics.field_accuracy, 0.5);
        assert!((metrics.mean_edit_distance - 0.5).abs() < 1e-12);
        assert!((metrics.mean_normalized_edit_distance - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_ctc_epoch_averages_loss_per_example() {
        let device = Default::default();
        // skip 2 frames, then "ab" with a blank in between.
        let frames = vec![vec![3, 3, 0, 3, 1, 3], vec![3, 3, 2, 2, 3, 3]];
        let predicted = one_hot(&frames);
        let [batch, width, classes] = predicted.dims();
        let images = predicted.swap_dims(1, 2).reshape([batch, 1, classes, width]);
        let batch = CtcBatch::new(
            images,
            Tensor::<TestBackend, 2, Int>::from_data(TensorData::new(vec![0i64, 1, 2, 3], [2, 2]), &device),
            Tensor::<TestBackend, 1, Int>::from_data(TensorData::new(vec![4i64, 4], [2]), &device),
            Tensor::<TestBackend, 1, Int>::from_data(TensorData::new(vec![2i64, 1], [2]), &device),
        );
        let source = CyclicSource::new(vec![batch]);
        let mut evaluator = CtcEvaluator::from_config(source, &config());

        let metrics = evaluator.evaluate_epoch(&Mirror, 3, 2).unwrap();

        assert_eq!(metrics.field_accuracy, 1.0);
        assert!((metrics.loss - 1.0).abs() < 1e-12);
        assert_eq!(evaluator.source().drawn(), 3);
    }
}

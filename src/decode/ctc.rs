use burn::tensor::{Tensor, backend::Backend};

use super::{argmax, float_values, int_values, DecodedBatch};
use crate::data::{CtcBatch, LabelCodec};
use crate::error::{Result, ValidationError};

/// Compiled inference-plus-loss function of a CTC model.
pub trait CtcInference<B: Backend> {
    /// Returns class probabilities `[batch, time, classes]` and the per-example
    /// loss (any 2D layout holding `batch` values, typically `[batch, 1]`).
    fn infer(&self, batch: &CtcBatch<B>) -> Result<(Tensor<B, 3>, Tensor<B, 2>)>;
}

/// Merge runs of the same id into one occurrence.
pub fn collapse_repeats(ids: &[i64]) -> Vec<i64> {
    let mut collapsed: Vec<i64> = Vec::with_capacity(ids.len());
    for &id in ids {
        if collapsed.last() != Some(&id) {
            collapsed.push(id);
        }
    }
    collapsed
}

/// Greedy best-path CTC decoder.
#[derive(Debug, Clone)]
pub struct CtcDecoder {
    skip_frames: usize,
    blank: Option<i64>,
}

impl CtcDecoder {
    pub fn new(skip_frames: usize) -> Self {
        Self {
            skip_frames,
            blank: None,
        }
    }

    /// Strip `blank` after collapsing instead of leaving it to the label codec.
    pub fn with_blank(mut self, blank: i64) -> Self {
        self.blank = Some(blank);
        self
    }

    /// Best path of a single example stored row-major as `[timesteps, classes]`.
    pub fn best_path(&self, probabilities: &[f32], classes: usize) -> Vec<i64> {
        let frames: Vec<i64> = probabilities
            .chunks(classes)
            .skip(self.skip_frames)
            .map(|row| argmax(row) as i64)
            .collect();

        let mut path = collapse_repeats(&frames);
        if let Some(blank) = self.blank {
            path.retain(|&id| id != blank);
        }
        path
    }

    pub fn decode_probabilities<B: Backend, C: LabelCodec + ?Sized>(
        &self,
        probabilities: Tensor<B, 3>,
        codec: &C,
    ) -> Result<Vec<String>> {
        let [batch_size, timesteps, classes] = probabilities.dims();
        if classes == 0 {
            return Err(ValidationError::ShapeMismatch("output has no classes".into()));
        }
        let values = float_values(probabilities)?;
        let example_len = timesteps * classes;

        Ok((0..batch_size)
            .map(|j| {
                let example = &values[j * example_len..(j + 1) * example_len];
                codec.labels_to_text(&self.best_path(example, classes))
            })
            .collect())
    }

    /// Ground-truth strings: each label row mapped to text, cut to its `label_length`.
    pub fn reference_texts<B: Backend, C: LabelCodec + ?Sized>(
        &self,
        batch: &CtcBatch<B>,
        codec: &C,
    ) -> Result<Vec<String>> {
        let [batch_size, max_len] = batch.labels.dims();
        let labels = int_values(batch.labels.clone())?;
        let lengths = int_values(batch.label_length.clone())?;
        if lengths.len() != batch_size || batch.batch_size() != batch_size {
            return Err(ValidationError::ShapeMismatch(format!(
                "{} label lengths and {} images for {} label rows",
                lengths.len(),
                batch.batch_size(),
                batch_size
            )));
        }

        Ok((0..batch_size)
            .map(|j| {
                let row = &labels[j * max_len..(j + 1) * max_len];
                let keep = lengths[j].max(0) as usize;
                codec.labels_to_text(row).chars().take(keep).collect()
            })
            .collect())
    }

    /// Run inference over the batch and decode every example.
    pub fn decode_batch<B, M, C>(&self, model: &M, batch: &CtcBatch<B>, codec: &C) -> Result<DecodedBatch>
    where
        B: Backend,
        M: CtcInference<B> + ?Sized,
        C: LabelCodec + ?Sized,
    {
        let (probabilities, loss) = model.infer(batch)?;
        let predictions = self.decode_probabilities(probabilities, codec)?;
        let references = self.reference_texts(batch, codec)?;
        let losses: Vec<f64> = float_values(loss.flatten::<1>(0, 1))?
            .into_iter()
            .map(f64::from)
            .collect();

        if predictions.len() != references.len() {
            return Err(ValidationError::ShapeMismatch(format!(
                "{} predictions for {} references",
                predictions.len(),
                references.len()
            )));
        }

        Ok(DecodedBatch {
            predictions,
            references,
            losses,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::AlphabetCodec;
    use burn::tensor::{Int, TensorData};
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    /// One-hot probabilities for the given per-frame classes.
    fn frames_to_probs(frames: &[usize], classes: usize) -> Vec<f32> {
        let mut probs = vec![0.0; frames.len() * classes];
        for (t, &class) in frames.iter().enumerate() {
            probs[t * classes + class] = 1.0;
        }
        probs
    }

    fn codec() -> AlphabetCodec {
        AlphabetCodec::from_letters("abcdefg", '\n')
    }

    #[test]
    fn test_distinct_frames_decode_like_plain_argmax() {
        let codec = codec();
        let decoder = CtcDecoder::new(2);
        let frames = [7, 7, 0, 1, 2, 6];
        let probs = frames_to_probs(&frames, 8);

        let path = decoder.best_path(&probs, 8);
        assert_eq!(path, vec![0, 1, 2, 6]);
        assert_eq!(codec.labels_to_text(&path), "abcg");
    }

    #[test]
    fn test_consecutive_duplicates_collapse() {
        let codec = codec();
        let decoder = CtcDecoder::new(2);
        let frames = [0, 0, 3, 3, 3, 5, 5, 2];
        let probs = frames_to_probs(&frames, 8);

        let path = decoder.best_path(&probs, 8);
        assert_eq!(path, vec![3, 5, 2]);
        assert_eq!(codec.labels_to_text(&path), "dfc");
    }

    #[test]
    fn test_blank_kept_by_collapse_but_dropped_by_codec() {
        let codec = codec();
        let frames = [7, 7, 1, 7, 1, 1];
        let probs = frames_to_probs(&frames, 8);

        let literal = CtcDecoder::new(2).best_path(&probs, 8);
        assert_eq!(literal, vec![1, 7, 1]);
        assert_eq!(codec.labels_to_text(&literal), "bb");

        let stripped = CtcDecoder::new(2).with_blank(7).best_path(&probs, 8);
        assert_eq!(stripped, vec![1, 1]);
    }

    #[test]
    fn test_skip_beyond_sequence_is_empty() {
        let probs = frames_to_probs(&[1, 2], 8);
        assert!(CtcDecoder::new(2).best_path(&probs, 8).is_empty());
    }

    struct FixedOutput {
        frames: Vec<Vec<usize>>,
        losses: Vec<f32>,
    }

    impl CtcInference<TestBackend> for FixedOutput {
        fn infer(
            &self,
            batch: &CtcBatch<TestBackend>,
        ) -> Result<(Tensor<TestBackend, 3>, Tensor<TestBackend, 2>)> {
            let device = batch.images.device();
            let timesteps = self.frames[0].len();
            let probs: Vec<f32> = self
                .frames
                .iter()
                .flat_map(|f| frames_to_probs(f, 8))
                .collect();
            let batch_size = self.frames.len();
            Ok((
                Tensor::from_data(TensorData::new(probs, [batch_size, timesteps, 8]), &device),
                Tensor::from_data(TensorData::new(self.losses.clone(), [batch_size, 1]), &device),
            ))
        }
    }

    #[test]
    fn test_decode_batch_truncates_references() {
        let device = Default::default();
        let codec = codec();
        let model = FixedOutput {
            frames: vec![vec![7, 7, 0, 0, 1, 7], vec![7, 7, 2, 2, 2, 2]],
            losses: vec![0.5, 1.5],
        };
        let batch = CtcBatch::<TestBackend>::new(
            Tensor::zeros([2, 1, 8, 6], &device),
            Tensor::<TestBackend, 2, Int>::from_data(TensorData::new(vec![0i64, 1, 2, 2, 3, 4], [2, 3]), &device),
            Tensor::<TestBackend, 1, Int>::from_data(TensorData::new(vec![4i64, 4], [2]), &device),
            Tensor::<TestBackend, 1, Int>::from_data(TensorData::new(vec![2i64, 1], [2]), &device),
        );

        let decoded = CtcDecoder::new(2).decode_batch(&model, &batch, &codec).unwrap();

        assert_eq!(decoded.predictions, vec!["ab".to_string(), "c".to_string()]);
        assert_eq!(decoded.references, vec!["ab".to_string(), "c".to_string()]);
        assert_eq!(decoded.losses, vec![0.5, 1.5]);
    }

    #[test]
    fn test_reference_rows_must_match_images() {
        let device = Default::default();
        let batch = CtcBatch::<TestBackend>::new(
            Tensor::zeros([3, 1, 8, 6], &device),
            Tensor::<TestBackend, 2, Int>::from_data(TensorData::new(vec![0i64, 1, 2, 3], [2, 2]), &device),
            Tensor::<TestBackend, 1, Int>::from_data(TensorData::new(vec![4i64, 4], [2]), &device),
            Tensor::<TestBackend, 1, Int>::from_data(TensorData::new(vec![2i64, 2], [2]), &device),
        );

        let err = CtcDecoder::new(2).reference_texts(&batch, &codec()).unwrap_err();
        assert!(matches!(err, ValidationError::ShapeMismatch(_)));
    }
}

use serde::{Deserialize, Serialize};
use std::fmt;

use super::edit_distance::{edit_distance, normalized_edit_distance};
use crate::config::LossAccumulation;
use crate::decode::DecodedBatch;
use crate::error::{Result, ValidationError};

/// Result of scoring `num` validation examples.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BatchScore {
    pub mean_normalized_edit_distance: f64,
    pub mean_edit_distance: f64,
    /// Summed per-example loss divided by `num`.
    pub loss: f64,
    /// Exact matches, not normalized.
    pub true_fields: usize,
}

/// Running sums of one metric call.
#[derive(Debug, Clone)]
pub struct ScoreAccumulator {
    accumulation: LossAccumulation,
    normalized_edit_distance: f64,
    edit_distance: f64,
    loss: f64,
    true_fields: usize,
    scored: usize,
}

impl ScoreAccumulator {
    pub fn new(accumulation: LossAccumulation) -> Self {
        Self {
            accumulation,
            normalized_edit_distance: 0.0,
            edit_distance: 0.0,
            loss: 0.0,
            true_fields: 0,
            scored: 0,
        }
    }

    pub fn add_batch_loss(&mut self, losses: &[f64]) {
        let batch_loss: f64 = losses.iter().sum();
        match self.accumulation {
            LossAccumulation::LastBatch => self.loss = batch_loss,
            LossAccumulation::Sum => self.loss += batch_loss,
        }
    }

    /// Score one example; `index` only labels the error of an empty reference.
    pub fn score(&mut self, prediction: &str, reference: &str, index: usize) -> Result<()> {
        let normalized = normalized_edit_distance(prediction, reference)
            .ok_or(ValidationError::EmptyReference { index })?;

        self.edit_distance += edit_distance(prediction, reference) as f64;
        self.normalized_edit_distance += normalized;
        if prediction == reference {
            self.true_fields += 1;
        }
        self.scored += 1;
        Ok(())
    }

    pub fn scored(&self) -> usize {
        self.scored
    }

    /// Divide the sums by `num`.
    pub fn finish(&self, num: usize) -> BatchScore {
        let num = num.max(1) as f64;
        BatchScore {
            mean_normalized_edit_distance: self.normalized_edit_distance / num,
            mean_edit_distance: self.edit_distance / num,
            loss: self.loss / num,
            true_fields: self.true_fields,
        }
    }
}

/// Pull decoded batches from `next` until `num` examples are scored.
///
/// Only the first `num_left` examples of each batch are scored, but the loss of
/// every pulled batch is taken over the whole batch.
pub fn show_edit_distance<F>(
    num: usize,
    accumulation: LossAccumulation,
    mut next: F,
) -> Result<BatchScore>
where
    F: FnMut() -> Result<DecodedBatch>,
{
    let mut acc = ScoreAccumulator::new(accumulation);
    let mut num_left = num;

    while num_left > 0 {
        let decoded = next()?;
        if decoded.is_empty() {
            return Err(ValidationError::EmptyBatch);
        }
        if decoded.references.len() != decoded.predictions.len() {
            return Err(ValidationError::ShapeMismatch(format!(
                "{} predictions for {} references",
                decoded.predictions.len(),
                decoded.references.len()
            )));
        }
        acc.add_batch_loss(&decoded.losses);

        let take = num_left.min(decoded.len());
        for j in 0..take {
            acc.score(&decoded.predictions[j], &decoded.references[j], acc.scored())?;
        }
        num_left -= take;
    }

    Ok(acc.finish(num))
}

/// Validation results of one epoch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EpochMetrics {
    pub epoch: usize,
    pub mean_edit_distance: f64,
    pub mean_normalized_edit_distance: f64,
    pub loss: f64,
    pub field_accuracy: f64,
    /// Set by the callback when the loss beat the running best.
    pub improved: bool,
}

impl fmt::Display for EpochMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Mean edit distance: {:.3}\tMean normalized edit distance: {:.3}\tLoss batch: {:.3}\tAccuracy by fields: {:.3}",
            self.mean_edit_distance, self.mean_normalized_edit_distance, self.loss, self.field_accuracy
        )
    }
}

/// Sums step scores over an epoch.
#[derive(Debug, Clone, Default)]
pub struct EpochAccumulator {
    normalized_edit_distance: f64,
    edit_distance: f64,
    loss: f64,
    true_fields: usize,
    steps: usize,
}

impl EpochAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, score: &BatchScore) {
        self.normalized_edit_distance += score.mean_normalized_edit_distance;
        self.edit_distance += score.mean_edit_distance;
        self.loss += score.loss;
        self.true_fields += score.true_fields;
        self.steps += 1;
    }

    pub fn steps(&self) -> usize {
        self.steps
    }

    /// Means over the accumulated steps; field accuracy over `steps * batch_size` examples.
    pub fn finish(&self, epoch: usize, batch_size: usize) -> EpochMetrics {
        let steps = self.steps.max(1) as f64;
        let examples = (self.steps * batch_size).max(1) as f64;
        EpochMetrics {
            epoch,
            mean_edit_distance: self.edit_distance / steps,
            mean_normalized_edit_distance: self.normalized_edit_distance / steps,
            loss: self.loss / steps,
            field_accuracy: self.true_fields as f64 / examples,
            improved: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn batch(pairs: &[(&str, &str)], losses: &[f64]) -> DecodedBatch {
        DecodedBatch {
            predictions: pairs.iter().map(|(p, _)| p.to_string()).collect(),
            references: pairs.iter().map(|(_, r)| r.to_string()).collect(),
            losses: losses.to_vec(),
        }
    }

    #[test]
    fn test_exact_matches_counted() {
        let decoded = batch(&[("cat", "cat"), ("cat", "bat"), ("dog", "dog"), ("x", "yz")], &[1.0; 4]);
        let score = show_edit_distance(4, LossAccumulation::Sum, || Ok(decoded.clone())).unwrap();

        assert_eq!(score.true_fields, 2);
        assert!((score.mean_edit_distance - 3.0 / 4.0).abs() < 1e-12);
        assert!((score.mean_normalized_edit_distance - (1.0 / 3.0 + 1.0) / 4.0).abs() < 1e-12);
        assert!((score.loss - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_empty_reference_is_reported() {
        let decoded = batch(&[("a", "a"), ("b", "")], &[0.0, 0.0]);
        let result = show_edit_distance(2, LossAccumulation::Sum, || Ok(decoded.clone()));

        assert!(matches!(result, Err(ValidationError::EmptyReference { index: 1 })));
    }

    #[test]
    fn test_empty_batch_is_reported() {
        let result = show_edit_distance(2, LossAccumulation::Sum, || Ok(DecodedBatch::default()));
        assert!(matches!(result, Err(ValidationError::EmptyBatch)));
    }

    #[test]
    fn test_loss_accumulation_modes_over_several_pulls() {
        let batches = [
            batch(&[("a", "a"), ("b", "b")], &[1.0, 1.0]),
            batch(&[("c", "c"), ("d", "d")], &[3.0, 3.0]),
        ];

        let mut pulls = batches.iter().cycle();
        let last = show_edit_distance(4, LossAccumulation::LastBatch, || {
            Ok(pulls.next().cloned().unwrap_or_default())
        })
        .unwrap();
        assert!((last.loss - 6.0 / 4.0).abs() < 1e-12);
        assert_eq!(last.true_fields, 4);

        let mut pulls = batches.iter().cycle();
        let summed = show_edit_distance(4, LossAccumulation::Sum, || {
            Ok(pulls.next().cloned().unwrap_or_default())
        })
        .unwrap();
        assert!((summed.loss - 8.0 / 4.0).abs() < 1e-12);
    }

    #[test]
    fn test_modes_agree_for_single_pull() {
        let decoded = batch(&[("a", "b"), ("c", "c")], &[0.5, 0.25]);
        let last = show_edit_distance(2, LossAccumulation::LastBatch, || Ok(decoded.clone())).unwrap();
        let summed = show_edit_distance(2, LossAccumulation::Sum, || Ok(decoded.clone())).unwrap();

        assert_eq!(last, summed);
    }

    #[test]
    fn test_all_matching_epoch_has_full_field_accuracy() {
        let decoded = batch(&[("ab", "ab"), ("c", "c"), ("de", "de"), ("f", "f")], &[0.1; 4]);
        let mut epoch = EpochAccumulator::new();
        for _ in 0..2 {
            let score = show_edit_distance(4, LossAccumulation::Sum, || Ok(decoded.clone())).unwrap();
            epoch.add(&score);
        }

        let metrics = epoch.finish(3, 4);
        assert_eq!(epoch.steps(), 2);
        assert_eq!(metrics.field_accuracy, 1.0);
        assert_eq!(metrics.mean_edit_distance, 0.0);
        assert_eq!(metrics.mean_normalized_edit_distance, 0.0);
        assert_eq!(metrics.epoch, 3);
    }
}

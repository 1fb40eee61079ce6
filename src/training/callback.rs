use std::collections::BTreeMap;
use tracing::{info, warn};

use super::evaluator::ValidationEvaluator;
use crate::checkpoint::{BestLoss, CheckpointMeta, Checkpointable};
use crate::config::CallbackConfig;
use crate::error::{Result, ValidationError};
use crate::metrics::EpochMetrics;

/// Named scalars the host loop reports at epoch end.
pub type EpochLogs = BTreeMap<String, f64>;

/// Hook invoked by a training loop once every epoch.
pub trait EpochObserver<M> {
    fn on_epoch_end(&mut self, epoch: usize, logs: &EpochLogs, model: &M) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackPhase {
    Constructed,
    Idle,
    Evaluating,
    Aggregating,
    CheckpointDecision,
}

/// Epoch-end validation with best-loss checkpointing.
pub struct ValidationCallback<E> {
    evaluator: E,
    config: CallbackConfig,
    best: BestLoss,
    phase: CallbackPhase,
    history: Vec<EpochMetrics>,
}

impl<E> ValidationCallback<E> {
    pub fn new(evaluator: E, config: CallbackConfig) -> Result<Self> {
        config.validate()?;
        info!("Validation callback ready: {}", config);

        Ok(Self {
            evaluator,
            config,
            best: BestLoss::new(),
            phase: CallbackPhase::Constructed,
            history: Vec::new(),
        })
    }

    pub fn phase(&self) -> CallbackPhase {
        self.phase
    }

    pub fn best_loss(&self) -> f64 {
        self.best.best()
    }

    /// Forget the running best so the next epoch always checkpoints.
    pub fn reset(&mut self) {
        self.best.reset();
    }

    pub fn history(&self) -> &[EpochMetrics] {
        &self.history
    }

    pub fn evaluator(&self) -> &E {
        &self.evaluator
    }

    /// Evaluate the validation set, log the metrics and save `model` when the loss improved.
    pub fn run_epoch<M>(&mut self, epoch: usize, logs: &EpochLogs, model: &M) -> Result<EpochMetrics>
    where
        E: ValidationEvaluator<M>,
        M: Checkpointable,
    {
        let result = self.run_phases(epoch, logs, model);
        self.phase = CallbackPhase::Idle;
        result
    }

    fn run_phases<M>(&mut self, epoch: usize, logs: &EpochLogs, model: &M) -> Result<EpochMetrics>
    where
        E: ValidationEvaluator<M>,
        M: Checkpointable,
    {
        info!("Log: {:?}", logs);
        info!("Evaluating validation set ...");
        self.phase = CallbackPhase::Evaluating;
        let mut metrics =
            self.evaluator
                .evaluate_epoch(model, self.config.steps, self.config.batch_size)?;

        self.phase = CallbackPhase::Aggregating;
        metrics.epoch = epoch;
        if !metrics.loss.is_finite() {
            warn!("Epoch {} validation loss is not finite: {}", epoch, metrics.loss);
        }
        info!("Epoch {}: {}", epoch, metrics);

        self.phase = CallbackPhase::CheckpointDecision;
        metrics.improved = self.best.observe(metrics.loss);
        if metrics.improved {
            info!("Update new weights");
            self.save(epoch, metrics.loss, model)?;
        }

        self.history.push(metrics);
        Ok(metrics)
    }

    fn save<M: Checkpointable>(&self, epoch: usize, loss: f64, model: &M) -> Result<()> {
        let path = self.config.filepath.as_path();
        let saved = if self.config.save_weights_only {
            model.save_weights(path)
        } else {
            let meta = CheckpointMeta::new(epoch, loss, self.config.clone());
            model.save_model(path, &meta)
        };
        let written = saved.map_err(ValidationError::Checkpoint)?;

        info!("Saved best model (loss {:.4}) to {:?}", loss, written);
        Ok(())
    }
}

impl<E, M> EpochObserver<M> for ValidationCallback<E>
where
    E: ValidationEvaluator<M>,
    M: Checkpointable,
{
    fn on_epoch_end(&mut self, epoch: usize, logs: &EpochLogs, model: &M) -> anyhow::Result<()> {
        self.run_epoch(epoch, logs, model)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::cell::RefCell;
    use std::path::{Path, PathBuf};

    /// Evaluator replaying scripted losses.
    struct Scripted {
        losses: Vec<f64>,
        next: usize,
    }

    impl Scripted {
        fn new(losses: &[f64]) -> Self {
            Self {
                losses: losses.to_vec(),
                next: 0,
            }
        }
    }

    impl<M> ValidationEvaluator<M> for Scripted {
        fn evaluate_epoch(&mut self, _model: &M, _steps: usize, _batch_size: usize) -> Result<EpochMetrics> {
            let loss = self.losses[self.next];
            self.next += 1;
            Ok(EpochMetrics {
                epoch: 0,
                mean_edit_distance: 0.0,
                mean_normalized_edit_distance: 0.0,
                loss,
                field_accuracy: 1.0,
                improved: false,
            })
        }
    }

    #[derive(Default)]
    struct RecordingModel {
        weights: RefCell<Vec<PathBuf>>,
        full: RefCell<Vec<(PathBuf, usize)>>,
        fail: bool,
    }

    impl Checkpointable for RecordingModel {
        fn save_weights(&self, path: &Path) -> anyhow::Result<PathBuf> {
            if self.fail {
                return Err(anyhow!("disk full"));
            }
            self.weights.borrow_mut().push(path.to_path_buf());
            Ok(path.to_path_buf())
        }

        fn save_model(&self, path: &Path, meta: &CheckpointMeta) -> anyhow::Result<PathBuf> {
            if self.fail {
                return Err(anyhow!("disk full"));
            }
            self.full.borrow_mut().push((path.to_path_buf(), meta.epoch));
            Ok(path.to_path_buf())
        }
    }

    fn callback(losses: &[f64], save_weights_only: bool) -> ValidationCallback<Scripted> {
        let config = CallbackConfig {
            save_weights_only,
            ..CallbackConfig::default()
        };
        ValidationCallback::new(Scripted::new(losses), config).unwrap()
    }

    #[test]
    fn test_saves_once_on_improvement() {
        let model = RecordingModel::default();
        let mut cb = callback(&[2.0, 1.5], true);
        let logs = EpochLogs::new();

        cb.on_epoch_end(1, &logs, &model).unwrap();
        cb.on_epoch_end(2, &logs, &model).unwrap();

        // First epoch always beats +inf, the second improves again.
        assert_eq!(model.weights.borrow().len(), 2);
        assert_eq!(cb.best_loss(), 1.5);
        assert!(cb.history().iter().all(|m| m.improved));
        assert_eq!(cb.evaluator().next, 2);
    }

    #[test]
    fn test_regression_does_not_save() {
        let model = RecordingModel::default();
        let mut cb = callback(&[2.0, 2.5], false);
        let logs = EpochLogs::new();

        cb.on_epoch_end(1, &logs, &model).unwrap();
        cb.on_epoch_end(2, &logs, &model).unwrap();

        assert_eq!(model.full.borrow().as_slice(), &[(PathBuf::from("checkpoints/best_model"), 1)]);
        assert!(model.weights.borrow().is_empty());
        assert_eq!(cb.best_loss(), 2.0);
        assert!(!cb.history()[1].improved);
        assert_eq!(cb.history()[1].epoch, 2);
    }

    #[test]
    fn test_improvement_between_epochs_triggers_exactly_one_extra_save() {
        let model = RecordingModel::default();
        let mut cb = callback(&[2.0, 1.5, 2.5], true);
        let logs = EpochLogs::new();

        cb.on_epoch_end(1, &logs, &model).unwrap();
        let saves_after_first = model.weights.borrow().len();
        cb.on_epoch_end(2, &logs, &model).unwrap();
        cb.on_epoch_end(3, &logs, &model).unwrap();

        assert_eq!(model.weights.borrow().len() - saves_after_first, 1);
    }

    #[test]
    fn test_save_failure_propagates() {
        let model = RecordingModel {
            fail: true,
            ..RecordingModel::default()
        };
        let mut cb = callback(&[1.0], true);

        let err = cb.run_epoch(1, &EpochLogs::new(), &model).unwrap_err();
        assert!(matches!(err, ValidationError::Checkpoint(_)));
        assert_eq!(cb.phase(), CallbackPhase::Idle);
    }

    #[test]
    fn test_phases_and_reset() {
        let model = RecordingModel::default();
        let mut cb = callback(&[1.0, 1.0], true);
        assert_eq!(cb.phase(), CallbackPhase::Constructed);

        cb.run_epoch(1, &EpochLogs::new(), &model).unwrap();
        assert_eq!(cb.phase(), CallbackPhase::Idle);

        cb.reset();
        let metrics = cb.run_epoch(2, &EpochLogs::new(), &model).unwrap();
        assert!(metrics.improved);
        assert_eq!(model.weights.borrow().len(), 2);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = CallbackConfig {
            steps: 0,
            ..CallbackConfig::default()
        };
        assert!(ValidationCallback::new(Scripted::new(&[]), config).is_err());
    }
}

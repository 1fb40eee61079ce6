use anyhow::Result;
use burn::module::AutodiffModule;
use burn::nn::loss::CrossEntropyLoss;
use burn::optim::adaptor::OptimizerAdaptor;
use burn::optim::{Adam, AdamConfig, GradientsParams, Optimizer};
use burn::tensor::{ElementConversion, Tensor, backend::{AutodiffBackend, Backend}};
use tracing::info;

use super::callback::{EpochLogs, EpochObserver};
use crate::data::TrainBatch;
use crate::model::SequenceHead;

#[derive(Clone, Debug)]
pub struct TrainOutput<B: Backend> {
    pub loss: Tensor<B, 1>,
    pub step: usize,
}

impl<B: Backend> TrainOutput<B> {
    pub fn new(loss: Tensor<B, 1>, step: usize) -> Self {
        Self { loss, step }
    }

    pub fn loss_value(&self) -> f64 {
        self.loss.clone().into_scalar().elem::<f64>()
    }
}

/// Observers notified with the inference copy of the model at every epoch end.
pub type HeadObserver<'a, B> = dyn EpochObserver<SequenceHead<<B as AutodiffBackend>::InnerBackend>> + 'a;

/// Host training loop for the sequence head: frame-level cross-entropy with Adam.
pub struct OcrTrainer<B: AutodiffBackend> {
    model: SequenceHead<B>,
    optimizer: OptimizerAdaptor<Adam, SequenceHead<B>, B>,
    loss_fn: CrossEntropyLoss<B>,
    learning_rate: f64,
    step: usize,
}

impl<B: AutodiffBackend> OcrTrainer<B> {
    pub fn new(model: SequenceHead<B>, learning_rate: f32, device: &B::Device) -> Self {
        let optimizer = AdamConfig::new().init::<B, SequenceHead<B>>();
        let loss_fn = CrossEntropyLoss::new(None, device);

        Self {
            model,
            optimizer,
            loss_fn,
            learning_rate: f64::from(learning_rate),
            step: 0,
        }
    }

    pub fn train_step(&mut self, batch: TrainBatch<B>) -> TrainOutput<B> {
        let logits = self.model.forward_logits(batch.images);

        // [batch, width, classes] -> [batch * width, classes]
        let [batch_size, width, classes] = logits.dims();
        let logits_flat = logits.reshape([batch_size * width, classes]);
        let targets_flat = batch.frame_targets.reshape([batch_size * width]);

        let loss = self.loss_fn.forward(logits_flat, targets_flat);

        let grads = GradientsParams::from_grads(loss.backward(), &self.model);
        self.model = self.optimizer.step(self.learning_rate, self.model.clone(), grads);
        self.step += 1;

        TrainOutput::new(loss, self.step)
    }

    /// Train for `epochs` epochs of `steps_per_epoch` batches, then hand the
    /// model to every observer. Observer errors stop training.
    pub fn fit<F>(
        &mut self,
        epochs: usize,
        steps_per_epoch: usize,
        log_every: usize,
        mut next_batch: F,
        observers: &mut [&mut HeadObserver<'_, B>],
    ) -> Result<()>
    where
        F: FnMut() -> TrainBatch<B>,
    {
        for epoch in 1..=epochs {
            let mut epoch_loss = 0.0;
            let mut window_loss = 0.0;
            let mut window = 0;

            for step in 0..steps_per_epoch {
                let output = self.train_step(next_batch());
                let loss_value = output.loss_value();
                epoch_loss += loss_value;
                window_loss += loss_value;
                window += 1;

                if (step + 1) % log_every.max(1) == 0 {
                    info!(
                        "Epoch {} step {}/{}: Loss = {:.6} (avg: {:.6})",
                        epoch,
                        step + 1,
                        steps_per_epoch,
                        loss_value,
                        window_loss / window as f64
                    );
                    window_loss = 0.0;
                    window = 0;
                }
            }

            let mut logs = EpochLogs::new();
            logs.insert("loss".to_string(), epoch_loss / steps_per_epoch.max(1) as f64);

            let valid = self.model.valid();
            for observer in observers.iter_mut() {
                observer.on_epoch_end(epoch, &logs, &valid)?;
            }
        }

        info!("Training completed after {} steps", self.step);
        Ok(())
    }
}

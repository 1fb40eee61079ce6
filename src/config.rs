use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;

use crate::error::{Result, ValidationError};

/// How the loss of several batches pulled within one metric call is combined.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LossAccumulation {
    /// Every pull overwrites the running loss, only the last batch counts.
    LastBatch,
    /// Losses of all pulled batches are summed.
    #[default]
    Sum,
}

/// Which decoder the validation callback runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecoderKind {
    #[default]
    Ctc,
    Attention,
}

impl fmt::Display for DecoderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ctc => write!(f, "ctc"),
            Self::Attention => write!(f, "attention"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CallbackConfig {
    /// Alphabet; label id `i` maps to `letters[i]`.
    pub letters: String,
    /// Validation steps per epoch.
    pub steps: usize,
    pub batch_size: usize,
    /// Checkpoint destination, overwritten on every improvement.
    pub filepath: PathBuf,
    pub save_weights_only: bool,
    /// Leading CTC frames ignored by the greedy decoder.
    pub skip_frames: usize,
    /// End-of-sequence sentinel of the attention decoder.
    pub eos_char: char,
    /// Probability clipping for the attention cross-entropy.
    pub epsilon: f64,
    pub loss_accumulation: LossAccumulation,
    pub decoder: DecoderKind,
}

impl Default for CallbackConfig {
    fn default() -> Self {
        Self {
            letters: "0123456789abcdefghijklmnopqrstuvwxyz ".to_string(),
            steps: 8,
            batch_size: 16,
            filepath: PathBuf::from("checkpoints/best_model"),
            save_weights_only: false,
            skip_frames: 2,
            eos_char: '\n',
            epsilon: 1e-12,
            loss_accumulation: LossAccumulation::default(),
            decoder: DecoderKind::default(),
        }
    }
}

impl CallbackConfig {
    pub fn validate(&self) -> Result<()> {
        if self.letters.is_empty() {
            return Err(ValidationError::InvalidConfig("letters must not be empty".into()));
        }
        if self.steps == 0 {
            return Err(ValidationError::InvalidConfig("steps must be > 0".into()));
        }
        if self.batch_size == 0 {
            return Err(ValidationError::InvalidConfig("batch_size must be > 0".into()));
        }
        if !(self.epsilon > 0.0 && self.epsilon < 0.5) {
            return Err(ValidationError::InvalidConfig(
                "epsilon must be within (0, 0.5)".into(),
            ));
        }
        let mut seen = HashSet::new();
        if let Some(repeated) = self.letters.chars().find(|&ch| !seen.insert(ch)) {
            return Err(ValidationError::InvalidConfig(format!(
                "letters must not repeat characters, found {:?} twice",
                repeated
            )));
        }
        if self.letters.contains(self.eos_char) {
            return Err(ValidationError::InvalidConfig(format!(
                "eos_char {:?} must not be part of letters",
                self.eos_char
            )));
        }
        if self.filepath.as_os_str().is_empty() {
            return Err(ValidationError::InvalidConfig("filepath must not be empty".into()));
        }
        Ok(())
    }

    /// Class count of the model output: every letter plus the blank / sentinel slot.
    pub fn num_classes(&self) -> usize {
        self.letters.chars().count() + 1
    }
}

impl fmt::Display for CallbackConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "decoder={} steps={} batch_size={} filepath={:?} save_weights_only={}",
            self.decoder, self.steps, self.batch_size, self.filepath, self.save_weights_only
        )
    }
}

/// Shape of the demo sequence head driven by the `ocr-validate` binary.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HeadConfig {
    /// Timesteps, i.e. image columns.
    pub width: usize,
    /// Longest synthetic text drawn for a sample.
    pub max_text_len: usize,
    /// Amplitude of uniform pixel noise added to synthetic images.
    pub noise: f32,
}

impl Default for HeadConfig {
    fn default() -> Self {
        Self {
            width: 24,
            max_text_len: 8,
            noise: 0.1,
        }
    }
}

impl HeadConfig {
    pub fn validate(&self, callback: &CallbackConfig) -> Result<()> {
        if self.max_text_len == 0 {
            return Err(ValidationError::InvalidConfig("max_text_len must be > 0".into()));
        }
        // CTC frames need a blank between every character after the skipped prefix.
        let needed = callback.skip_frames + 2 * self.max_text_len;
        if self.width < needed {
            return Err(ValidationError::InvalidConfig(format!(
                "width {} is too small, need at least {}",
                self.width, needed
            )));
        }
        if !(0.0..1.0).contains(&self.noise) {
            return Err(ValidationError::InvalidConfig("noise must be within [0, 1)".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingConfig {
    #[serde(default = "default_epochs")]
    pub epochs: usize,
    #[serde(default = "default_steps_per_epoch")]
    pub steps_per_epoch: usize,
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f32,
    #[serde(default = "default_log_every")]
    pub log_every: usize,
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// Distinct synthetic validation batches the cyclic source rotates through.
    #[serde(default = "default_validation_pool")]
    pub validation_pool: usize,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            epochs: default_epochs(),
            steps_per_epoch: default_steps_per_epoch(),
            learning_rate: default_learning_rate(),
            log_every: default_log_every(),
            seed: default_seed(),
            validation_pool: default_validation_pool(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunConfig {
    #[serde(default)]
    pub callback: CallbackConfig,
    #[serde(default)]
    pub model: HeadConfig,
    #[serde(default)]
    pub training: TrainingConfig,
}

impl RunConfig {
    pub fn validate(&self) -> Result<()> {
        self.callback.validate()?;
        self.model.validate(&self.callback)?;
        if self.training.epochs == 0 || self.training.steps_per_epoch == 0 {
            return Err(ValidationError::InvalidConfig(
                "epochs and steps_per_epoch must be > 0".into(),
            ));
        }
        if self.training.log_every == 0 || self.training.validation_pool == 0 {
            return Err(ValidationError::InvalidConfig(
                "log_every and validation_pool must be > 0".into(),
            ));
        }
        Ok(())
    }
}

fn default_epochs() -> usize {
    5
}

fn default_steps_per_epoch() -> usize {
    50
}

fn default_learning_rate() -> f32 {
    1e-2
}

fn default_log_every() -> usize {
    10
}

fn default_seed() -> u64 {
    42
}

fn default_validation_pool() -> usize {
    4
}

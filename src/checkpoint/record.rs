use anyhow::{Context, Result};
use burn::module::Module;
use burn::record::{FullPrecisionSettings, NamedMpkFileRecorder};
use burn::tensor::backend::Backend;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::config::CallbackConfig;

/// Sidecar written next to a full-model checkpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointMeta {
    pub epoch: usize,
    pub loss: f64,
    pub weights_file: String,
    pub config: CallbackConfig,
    pub timestamp: u64,
}

impl CheckpointMeta {
    pub fn new(epoch: usize, loss: f64, config: CallbackConfig) -> Self {
        let timestamp = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();

        Self {
            epoch,
            loss,
            weights_file: String::new(),
            config,
            timestamp,
        }
    }
}

/// Something the validation callback can persist when the loss improves.
pub trait Checkpointable {
    /// Write the parameters only, replacing any previous file. Returns the written path.
    fn save_weights(&self, path: &Path) -> Result<PathBuf>;

    /// Write the parameters plus a metadata sidecar, replacing previous files.
    fn save_model(&self, path: &Path, meta: &CheckpointMeta) -> Result<PathBuf>;
}

pub fn weights_path(path: &Path) -> PathBuf {
    path.with_extension("mpk")
}

pub fn meta_path(path: &Path) -> PathBuf {
    path.with_extension("json")
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create checkpoint directory: {:?}", parent))?;
    }
    Ok(())
}

/// Save module parameters with burn's named MessagePack recorder.
pub fn save_module_weights<B: Backend, M: Module<B>>(module: &M, path: &Path) -> Result<PathBuf> {
    ensure_parent(path)?;

    let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
    module
        .clone()
        .save_file(path.to_path_buf(), &recorder)
        .with_context(|| format!("Failed to save model weights to {:?}", path))?;

    let written = weights_path(path);
    debug!("Model weights saved to: {:?}", written);
    Ok(written)
}

/// Save module parameters and a JSON sidecar describing the checkpoint.
pub fn save_module<B: Backend, M: Module<B>>(
    module: &M,
    path: &Path,
    meta: &CheckpointMeta,
) -> Result<PathBuf> {
    let written = save_module_weights::<B, M>(module, path)?;

    let mut meta = meta.clone();
    meta.weights_file = written
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();

    let metadata_path = meta_path(path);
    let metadata_json = serde_json::to_string_pretty(&meta)
        .with_context(|| "Failed to serialize checkpoint metadata")?;

    fs::write(&metadata_path, metadata_json)
        .with_context(|| format!("Failed to write checkpoint metadata: {:?}", metadata_path))?;

    info!("Checkpoint saved at epoch {}: {:?}", meta.epoch, metadata_path);
    Ok(written)
}

/// Restore parameters saved by [`save_module_weights`] into `module`.
pub fn load_module_weights<B: Backend, M: Module<B>>(
    module: M,
    path: &Path,
    device: &B::Device,
) -> Result<M> {
    let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
    module
        .load_file(path.to_path_buf(), &recorder, device)
        .with_context(|| format!("Failed to load model weights from: {:?}", path))
}

pub fn read_meta(path: &Path) -> Result<CheckpointMeta> {
    let metadata_path = meta_path(path);
    let metadata_json = fs::read_to_string(&metadata_path)
        .with_context(|| format!("Failed to read checkpoint file: {:?}", metadata_path))?;

    serde_json::from_str(&metadata_json).with_context(|| "Failed to parse checkpoint metadata")
}

use anyhow::{Context, Result};
use burn::backend::Autodiff;
use clap::{Args, Parser, Subcommand};
use std::fs;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

use ocr_validation::checkpoint::read_meta;
use ocr_validation::data::{CyclicSource, LabelCodec, SyntheticOcr};
use ocr_validation::model::SequenceHead;
use ocr_validation::training::{HeadObserver, OcrTrainer};
use ocr_validation::{
    AttentionEvaluator, CtcEvaluator, DecoderKind, EpochMetrics, RunConfig, ValidationCallback,
};

#[cfg(not(any(feature = "wgpu-backend", feature = "tch-backend")))]
type Inner = burn_ndarray::NdArray<f32>;
#[cfg(feature = "wgpu-backend")]
type Inner = burn_wgpu::Wgpu;
#[cfg(all(feature = "tch-backend", not(feature = "wgpu-backend")))]
type Inner = burn_tch::LibTorch<f32>;

type Backend = Autodiff<Inner>;
type Device = <Inner as burn::tensor::backend::Backend>::Device;

#[derive(Debug, Parser)]
#[command(author, version, about = "OCR validation callback runner")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Train the demo recognizer and validate it every epoch
    Run(RunArgs),
    /// Print the metadata of a saved checkpoint
    Inspect(InspectArgs),
}

#[derive(Debug, Args)]
struct RunArgs {
    /// Path to configuration JSON file
    #[arg(long)]
    config: PathBuf,
}

#[derive(Debug, Args)]
struct InspectArgs {
    /// Checkpoint path as given in `callback.filepath`
    #[arg(long)]
    checkpoint: PathBuf,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => run_command(args),
        Commands::Inspect(args) => inspect_command(args),
    }
}

fn run_command(args: RunArgs) -> Result<()> {
    info!("Loading configuration from: {:?}", args.config);

    let config_str = fs::read_to_string(&args.config)
        .with_context(|| format!("Failed to read config file: {:?}", args.config))?;

    let config: RunConfig = serde_json::from_str(&config_str)
        .with_context(|| "Failed to parse config JSON")?;
    config.validate()?;

    let callback_config = config.callback.clone();
    let training = config.training.clone();
    info!("Configuration loaded: {}", callback_config);

    let device = Device::default();

    let mut train_data = SyntheticOcr::new(&callback_config, &config.model, training.seed);

    // Image rows and output classes both come from the codec.
    let classes = train_data.codec().num_classes();
    let model = SequenceHead::<Backend>::new(classes, classes, callback_config.skip_frames, &device);
    let mut trainer = OcrTrainer::new(model, training.learning_rate, &device);

    let mut valid_data =
        SyntheticOcr::new(&callback_config, &config.model, training.seed.wrapping_add(1));
    let batch_size = callback_config.batch_size;

    let history: Vec<EpochMetrics> = match callback_config.decoder {
        DecoderKind::Ctc => {
            let pool = (0..training.validation_pool)
                .map(|_| valid_data.ctc_batch::<Inner>(batch_size, &device))
                .collect();
            let evaluator = CtcEvaluator::from_config(CyclicSource::new(pool), &callback_config);
            let mut callback = ValidationCallback::new(evaluator, callback_config.clone())?;

            let observer: &mut HeadObserver<'_, Backend> = &mut callback;
            trainer.fit(
                training.epochs,
                training.steps_per_epoch,
                training.log_every,
                || train_data.train_batch(batch_size, true, &device),
                &mut [observer],
            )?;
            callback.history().to_vec()
        }
        DecoderKind::Attention => {
            let pool = (0..training.validation_pool)
                .map(|_| valid_data.attention_batch::<Inner>(batch_size, &device))
                .collect();
            let evaluator =
                AttentionEvaluator::from_config(CyclicSource::new(pool), &callback_config);
            let mut callback = ValidationCallback::new(evaluator, callback_config.clone())?;

            let observer: &mut HeadObserver<'_, Backend> = &mut callback;
            trainer.fit(
                training.epochs,
                training.steps_per_epoch,
                training.log_every,
                || train_data.train_batch(batch_size, false, &device),
                &mut [observer],
            )?;
            callback.history().to_vec()
        }
    };

    let codec_path = callback_config.filepath.with_extension("codec.json");
    if let Some(parent) = codec_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {:?}", parent))?;
    }
    train_data.codec().save(&codec_path)?;

    let saves = history.iter().filter(|m| m.improved).count();
    if let Some(best) = history.iter().rev().find(|m| m.improved) {
        info!(
            "Best epoch {} (loss {:.4}, field accuracy {:.3}), {} checkpoint writes",
            best.epoch, best.loss, best.field_accuracy, saves
        );
    }
    info!("Epoch history: {}", serde_json::to_string(&history)?);

    Ok(())
}

fn inspect_command(args: InspectArgs) -> Result<()> {
    let meta = read_meta(&args.checkpoint)?;
    info!(
        "Checkpoint epoch {} loss {:.4} weights {} saved at {}",
        meta.epoch, meta.loss, meta.weights_file, meta.timestamp
    );
    info!("Callback config: {}", meta.config);
    Ok(())
}

//! Training loop on synthetic volumes.

use std::{path::Path, sync::Arc};

use anyhow::{Context, Result};
use burn::{
    data::dataloader::{DataLoader, DataLoaderBuilder},
    module::Module,
    optim::AdamConfig,
    record::CompactRecorder,
    tensor::backend::{AutodiffBackend, Backend},
    train::{metric::LossMetric, LearnerBuilder},
};
use unet3d_burn::{DiceMetric, SyntheticVolumeDataset, VolumeBatch, VolumeBatcher};

use crate::config::TrainingConfig;

/// Runs the training loop on a specific device.
///
/// # Errors
///
/// Returns an error if the configuration is invalid, model initialization fails or the
/// final model cannot be saved.
pub fn run_training<B: AutodiffBackend>(config: TrainingConfig, device: B::Device) -> Result<()> {
    config.validate()?;
    tracing::info!(?device, "initializing training");

    B::seed(config.seed);

    std::fs::create_dir_all(&config.artifact_dir).with_context(|| {
        format!("failed to create artifact directory {}", config.artifact_dir)
    })?;
    config.save(Path::new(&config.artifact_dir).join("config.json"))?;

    let model = config
        .model
        .init::<B>(&device)
        .context("failed to initialize model")?
        .with_loss(config.loss.init());
    tracing::info!(parameters = model.num_params(), "model created");

    let train_loader = create_dataloader::<B>(&config, config.train_volumes, config.seed)?;
    let valid_loader =
        create_dataloader::<B::InnerBackend>(&config, config.valid_volumes, config.seed + 1)?;

    let learner = LearnerBuilder::new(&config.artifact_dir)
        .metric_train_numeric(LossMetric::new())
        .metric_valid_numeric(LossMetric::new())
        .metric_train_numeric(DiceMetric::new())
        .metric_valid_numeric(DiceMetric::new())
        .with_file_checkpointer(CompactRecorder::new())
        .devices(vec![device])
        .num_epochs(config.num_epochs)
        .summary()
        .build(model, AdamConfig::new().init(), config.learning_rate);

    tracing::info!(
        epochs = config.num_epochs,
        batch_size = config.batch_size,
        learning_rate = config.learning_rate,
        "starting training"
    );
    let trained_model = learner.fit(train_loader, valid_loader);

    let final_path = Path::new(&config.artifact_dir).join("final_model");
    trained_model
        .save_file(&final_path, &CompactRecorder::new())
        .map_err(|e| anyhow::anyhow!("failed to save final model: {e}"))?;

    tracing::info!(path = %final_path.display(), "training completed successfully");
    Ok(())
}

fn create_dataloader<B: Backend>(
    config: &TrainingConfig,
    volumes: usize,
    seed: u64,
) -> Result<Arc<dyn DataLoader<B, VolumeBatch<B>>>> {
    let dataset = SyntheticVolumeDataset::new(&config.model, volumes, seed as usize)?;

    let dataloader = DataLoaderBuilder::new(VolumeBatcher::new())
        .batch_size(config.batch_size)
        .shuffle(seed)
        .num_workers(config.num_workers)
        .build(dataset);

    Ok(dataloader)
}

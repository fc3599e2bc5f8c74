//! Configuration for the training and inference commands.

use std::{fs, path::Path};

use anyhow::{Context, Result};
use burn::config::Config;
use unet3d_burn::{ModelConfig, UnetLossConfig};

/// Training configuration, loaded from a JSON file via [`TrainingConfig::load`].
#[derive(Config, Debug)]
pub struct TrainingConfig {
    /// Model configuration.
    #[config(default = "ModelConfig::new()")]
    pub model: ModelConfig,

    /// Training objective.
    #[config(default = "UnetLossConfig::new()")]
    pub loss: UnetLossConfig,

    /// Initial Adam learning rate.
    #[config(default = 5e-4)]
    pub learning_rate: f64,

    #[config(default = 50)]
    pub num_epochs: usize,

    #[config(default = 1)]
    pub batch_size: usize,

    #[config(default = 2)]
    pub num_workers: usize,

    /// Number of synthetic training volumes.
    #[config(default = 16)]
    pub train_volumes: usize,

    /// Number of synthetic validation volumes.
    #[config(default = 4)]
    pub valid_volumes: usize,

    /// Random seed for reproducibility.
    #[config(default = 42)]
    pub seed: u64,

    /// Directory receiving checkpoints, logs and the final model.
    #[config(default = "String::from(\"./artifacts\")")]
    pub artifact_dir: String,
}

impl TrainingConfig {
    /// Loads a training configuration from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let config_str = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config: Self = serde_json::from_str(&config_str)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        Ok(config)
    }

    /// Saves this configuration to a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let config_str = serde_json::to_string_pretty(self)?;
        fs::write(path, config_str)?;
        Ok(())
    }

    /// Checks the model configuration and the loop settings.
    ///
    /// # Errors
    ///
    /// Returns an error describing the first invalid setting.
    pub fn validate(&self) -> Result<()> {
        self.model.validate()?;
        anyhow::ensure!(self.batch_size > 0, "batch_size must be greater than 0");
        anyhow::ensure!(self.num_epochs > 0, "num_epochs must be greater than 0");
        anyhow::ensure!(self.learning_rate > 0.0, "learning_rate must be positive");
        anyhow::ensure!(
            self.train_volumes > 0 && self.valid_volumes > 0,
            "synthetic datasets must not be empty"
        );
        Ok(())
    }
}

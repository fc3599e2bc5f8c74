//! Core configuration structure for the attention residual 3D U-Net.

use burn::prelude::*;

use super::enums::Activation;
use crate::error::{UnetError, UnetResult};

/// Main configuration for the attention residual 3D U-Net.
///
/// Defaults reproduce the BRATS 2017 setup: four MRI modalities on a 128³ volume,
/// five encoder levels starting at 16 filters, three deep-supervision levels and four
/// sigmoid-activated labels.
#[derive(Config, Debug)]
pub struct ModelConfig {
    /// Input shape without the batch axis: `[channels, depth, height, width]`.
    #[config(default = "[4, 128, 128, 128]")]
    pub input_shape: [usize; 4],
    /// Number of filters at encoder level 0. Level `L` uses `n_base_filters * 2^L`.
    #[config(default = "16")]
    pub n_base_filters: usize,
    /// Number of encoder levels. The decoder has `depth - 1` levels.
    #[config(default = "5")]
    pub depth: usize,
    /// Spatial dropout rate inside every context module. Range: [0, 1).
    #[config(default = "0.3")]
    pub dropout_rate: f64,
    /// Number of decoder levels contributing to deep supervision. Range: [1, depth - 1].
    #[config(default = "3")]
    pub n_segmentation_levels: usize,
    /// Number of output channels.
    #[config(default = "4")]
    pub n_labels: usize,
    /// Final activation of the network.
    #[config(default = "Activation::Sigmoid")]
    pub activation: Activation,
}

impl ModelConfig {
    const MAX_DEPTH: usize = 16;

    /// Validate the configuration and return appropriate errors for invalid settings.
    ///
    /// # Errors
    ///
    /// Returns `Err(UnetError::InvalidConfiguration)` if any validation rule is violated.
    pub fn validate(&self) -> UnetResult<()> {
        // 1. The decoder needs at least one level
        if self.depth < 2 {
            return Err(invalid(format!("depth must be >= 2, got {}", self.depth)));
        }

        // 2. Filter, label and channel counts
        if self.n_base_filters == 0 {
            return Err(invalid("n_base_filters must be positive".to_string()));
        }
        if self.n_labels == 0 {
            return Err(invalid("n_labels must be positive".to_string()));
        }
        if self.input_shape[0] == 0 {
            return Err(invalid("input must have at least one channel".to_string()));
        }
        if self.depth > Self::MAX_DEPTH
            || self
                .n_base_filters
                .checked_mul(self.downsampling_factor())
                .is_none()
        {
            return Err(invalid(format!(
                "depth {} overflows the filter count of the deepest level",
                self.depth
            )));
        }

        // 3. Dropout rate
        if !(0.0..1.0).contains(&self.dropout_rate) {
            return Err(invalid(format!(
                "dropout_rate must be in [0, 1), got {}",
                self.dropout_rate
            )));
        }

        // 4. Deep supervision reads decoder levels 0..n_segmentation_levels
        if self.n_segmentation_levels == 0 || self.n_segmentation_levels > self.depth - 1 {
            return Err(invalid(format!(
                "n_segmentation_levels must be in [1, {}] for depth {}, got {}",
                self.depth - 1,
                self.depth,
                self.n_segmentation_levels
            )));
        }

        // 5. Every stride-2 level halves the volume exactly
        let factor = self.downsampling_factor();
        for (axis, &size) in ["depth", "height", "width"]
            .iter()
            .zip(&self.input_shape[1..])
        {
            if size == 0 || size % factor != 0 {
                return Err(invalid(format!(
                    "input {axis} {size} must be a positive multiple of {factor} (2^(depth - 1))"
                )));
            }
        }

        Ok(())
    }

    /// Number of filters at encoder level `level`.
    pub const fn filters_at(&self, level: usize) -> usize {
        self.n_base_filters << level
    }

    /// Filter counts of every encoder level, shallowest first.
    pub fn level_filters(&self) -> Vec<usize> {
        (0..self.depth).map(|level| self.filters_at(level)).collect()
    }

    /// Total spatial reduction between the input and the deepest encoder level.
    pub const fn downsampling_factor(&self) -> usize {
        1 << self.depth.saturating_sub(1)
    }

    /// Number of input channels.
    pub const fn in_channels(&self) -> usize {
        self.input_shape[0]
    }

    /// Spatial input size `[depth, height, width]`.
    pub const fn spatial_shape(&self) -> [usize; 3] {
        [self.input_shape[1], self.input_shape[2], self.input_shape[3]]
    }
}

fn invalid(reason: String) -> UnetError {
    UnetError::InvalidConfiguration { reason }
}

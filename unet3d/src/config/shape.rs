//! Static shape planning.
//!
//! Derives every intermediate shape of the network from a [`ModelConfig`] without
//! allocating a single tensor, so configurations can be checked cheaply before a
//! 128³ model is built on a device.

use super::core::ModelConfig;
use crate::error::UnetResult;

/// Shape of one feature map without the batch axis: `[channels, depth, height, width]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LevelShape {
    /// Network level this shape belongs to.
    pub level: usize,
    /// `[channels, depth, height, width]`.
    pub shape: [usize; 4],
}

impl LevelShape {
    /// Spatial part of the shape.
    pub const fn spatial(&self) -> [usize; 3] {
        [self.shape[1], self.shape[2], self.shape[3]]
    }

    /// Channel count.
    pub const fn channels(&self) -> usize {
        self.shape[0]
    }
}

/// Every shape produced by a forward pass of the configured network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShapePlan {
    /// Input shape without the batch axis.
    pub input: [usize; 4],
    /// Residual outputs of the encoder, indexed by level.
    pub encoder: Vec<LevelShape>,
    /// Localization outputs of the decoder, in execution order (deepest first).
    pub decoder: Vec<LevelShape>,
    /// Segmentation logits, indexed by level.
    pub segmentation: Vec<LevelShape>,
    /// Final output shape without the batch axis.
    pub output: [usize; 4],
}

impl ModelConfig {
    /// Computes the shape plan of this configuration.
    ///
    /// # Errors
    ///
    /// Returns the same errors as [`ModelConfig::validate`].
    pub fn shape_plan(&self) -> UnetResult<ShapePlan> {
        self.validate()?;

        let [d, h, w] = self.spatial_shape();
        let at_level = |level: usize, channels: usize| LevelShape {
            level,
            shape: [channels, d >> level, h >> level, w >> level],
        };

        let encoder = (0..self.depth)
            .map(|level| at_level(level, self.filters_at(level)))
            .collect();
        let decoder = (0..self.depth - 1)
            .rev()
            .map(|level| at_level(level, self.filters_at(level)))
            .collect();
        let segmentation = (0..self.n_segmentation_levels)
            .map(|level| at_level(level, self.n_labels))
            .collect();

        Ok(ShapePlan {
            input: self.input_shape,
            encoder,
            decoder,
            segmentation,
            output: [self.n_labels, d, h, w],
        })
    }
}

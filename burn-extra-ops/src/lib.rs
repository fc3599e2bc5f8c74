//! Additional volumetric operations for the Burn deep learning framework
//!
//! This crate provides operations that 3D segmentation networks rely on but that are
//! not yet available for rank-5 tensors in the core Burn framework.

use burn::prelude::*;

mod spatial_dropout;
mod upsample;

// Convenient re-exports
pub use spatial_dropout::{SpatialDropout, SpatialDropoutConfig};
pub use upsample::{upsample_nearest_3d, Upsample3d, Upsample3dConfig};

/// Additional operations for volumetric Burn tensors laid out `[batch, channels, D, H, W]`.
pub trait VolumeExtraOps<B: Backend> {
    /// Nearest-neighbour upsampling by an integer factor per spatial axis.
    fn upsample_nearest(self, scale: [usize; 3]) -> Self;

    /// Drop whole feature channels with probability `prob` while gradients are recorded.
    fn spatial_dropout(self, prob: f64) -> Self;
}

impl<B: Backend> VolumeExtraOps<B> for Tensor<B, 5> {
    fn upsample_nearest(self, scale: [usize; 3]) -> Self {
        upsample_nearest_3d(self, scale)
    }

    fn spatial_dropout(self, prob: f64) -> Self {
        SpatialDropoutConfig::new()
            .with_prob(prob)
            .init()
            .forward(self)
    }
}

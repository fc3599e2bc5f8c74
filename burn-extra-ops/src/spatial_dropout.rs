//! # Spatial Dropout
//!
//! Channel-wise dropout for feature maps. Instead of zeroing individual activations it
//! zeroes whole feature channels of a sample, which keeps neighbouring voxels of a
//! strongly correlated volume from leaking the dropped signal back in.

use burn::{prelude::*, tensor::Distribution};

/// Configuration for the `SpatialDropout` module.
#[derive(Config, Debug)]
pub struct SpatialDropoutConfig {
    /// The probability of dropping a channel.
    #[config(default = "0.3")]
    pub prob: f64,
}

impl SpatialDropoutConfig {
    /// Initializes a new `SpatialDropout` module.
    pub const fn init(&self) -> SpatialDropout {
        SpatialDropout { prob: self.prob }
    }
}

/// SpatialDropout module.
///
/// The mask is only applied when the backend records gradients, mirroring Burn's
/// element-wise `Dropout`. Inference backends see the identity function.
#[derive(Module, Clone, Debug)]
pub struct SpatialDropout {
    prob: f64,
}

impl SpatialDropout {
    /// Drop probability of this module.
    pub const fn prob(&self) -> f64 {
        self.prob
    }

    /// Applies spatial dropout to the input tensor.
    ///
    /// A Bernoulli mask of shape `[batch, channels, 1, ...]` is broadcast over every
    /// spatial axis and surviving channels are scaled by `1 / (1 - prob)`.
    ///
    /// # Shapes
    /// - input: `[batch_size, channels, ...]`
    /// - output: `[batch_size, channels, ...]`
    pub fn forward<B: Backend, const D: usize>(&self, x: Tensor<B, D>) -> Tensor<B, D> {
        if !B::ad_enabled() || self.prob == 0.0 {
            return x;
        }
        let keep_prob = 1.0 - self.prob;
        let [batch_size, channels] = [x.dims()[0], x.dims()[1]];

        let mut mask_shape = [1; D];
        mask_shape[0] = batch_size;
        mask_shape[1] = channels;

        let mask = Tensor::random(mask_shape, Distribution::Bernoulli(keep_prob), &x.device());

        x * mask / keep_prob
    }
}

use burn::prelude::*;
use burn_extra_ops::{Upsample3d, Upsample3dConfig};

use super::{ConvBlock, ConvBlockConfig};

/// Configuration for the `UpSamplingModule`.
#[derive(Config, Debug)]
pub struct UpSamplingModuleConfig {
    /// Number of input channels.
    in_channels: usize,
    /// Number of output channels.
    out_channels: usize,
    /// Upsampling factor per spatial axis.
    #[config(default = "[2, 2, 2]")]
    scale: [usize; 3],
}

impl UpSamplingModuleConfig {
    /// Initializes a new `UpSamplingModule`.
    pub fn init<B: Backend>(&self, device: &Device<B>) -> UpSamplingModule<B> {
        UpSamplingModule {
            upsample: Upsample3dConfig::new().with_scale(self.scale).init(),
            conv: ConvBlockConfig::new(self.in_channels, self.out_channels).init(device),
        }
    }
}

/// Nearest-neighbour upsampling followed by a convolution block.
#[derive(Module, Debug)]
pub struct UpSamplingModule<B: Backend> {
    upsample: Upsample3d,
    conv: ConvBlock<B>,
}

impl<B: Backend> UpSamplingModule<B> {
    /// # Shapes
    /// - input: `[batch_size, in_channels, D, H, W]`
    /// - output: `[batch_size, out_channels, D * sd, H * sh, W * sw]`
    pub fn forward(&self, x: Tensor<B, 5>) -> Tensor<B, 5> {
        self.conv.forward(self.upsample.forward(x))
    }
}

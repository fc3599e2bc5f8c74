use burn::prelude::*;

use super::{ConvBlock, ConvBlockConfig};

/// Configuration for the `LocalizationModule`.
#[derive(Config, Debug)]
pub struct LocalizationModuleConfig {
    /// Number of input channels (the concatenated skip and upsampled state).
    in_channels: usize,
    /// Number of output channels.
    out_channels: usize,
}

impl LocalizationModuleConfig {
    /// Initializes a new `LocalizationModule`.
    pub fn init<B: Backend>(&self, device: &Device<B>) -> LocalizationModule<B> {
        LocalizationModule {
            conv1: ConvBlockConfig::new(self.in_channels, self.out_channels).init(device),
            conv2: ConvBlockConfig::new(self.out_channels, self.out_channels)
                .with_kernel_size([1, 1, 1])
                .init(device),
        }
    }
}

/// A 3×3×3 convolution block followed by a 1×1×1 convolution block.
#[derive(Module, Debug)]
pub struct LocalizationModule<B: Backend> {
    conv1: ConvBlock<B>,
    conv2: ConvBlock<B>,
}

impl<B: Backend> LocalizationModule<B> {
    pub fn forward(&self, x: Tensor<B, 5>) -> Tensor<B, 5> {
        self.conv2.forward(self.conv1.forward(x))
    }
}

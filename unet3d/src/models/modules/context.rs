//! # Context Module
//!
//! Two convolution blocks around a spatial dropout. The encoder adds the module's
//! output to the level's input convolution to form a residual sum.

use burn::prelude::*;
use burn_extra_ops::{SpatialDropout, SpatialDropoutConfig};

use super::{ConvBlock, ConvBlockConfig};

/// Configuration for the `ContextModule`.
#[derive(Config, Debug)]
pub struct ContextModuleConfig {
    /// Number of input and output channels.
    channels: usize,
    /// Probability of dropping a feature channel between the two convolutions.
    #[config(default = "0.3")]
    dropout_rate: f64,
}

impl ContextModuleConfig {
    /// Initializes a new `ContextModule`.
    pub fn init<B: Backend>(&self, device: &Device<B>) -> ContextModule<B> {
        ContextModule {
            conv1: ConvBlockConfig::new(self.channels, self.channels).init(device),
            dropout: SpatialDropoutConfig::new()
                .with_prob(self.dropout_rate)
                .init(),
            conv2: ConvBlockConfig::new(self.channels, self.channels).init(device),
        }
    }
}

/// Conv block, spatial dropout, conv block.
#[derive(Module, Debug)]
pub struct ContextModule<B: Backend> {
    conv1: ConvBlock<B>,
    dropout: SpatialDropout,
    conv2: ConvBlock<B>,
}

impl<B: Backend> ContextModule<B> {
    pub fn forward(&self, x: Tensor<B, 5>) -> Tensor<B, 5> {
        let x = self.conv1.forward(x);
        let x = self.dropout.forward(x);
        self.conv2.forward(x)
    }
}

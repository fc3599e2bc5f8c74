//! # Convolution Block
//!
//! The leaf primitive of the network: 3D convolution, instance normalization over the
//! channel axis and a leaky ReLU.

use burn::{
    nn::{
        conv::{Conv3d, Conv3dConfig},
        InstanceNorm, InstanceNormConfig, LeakyRelu, LeakyReluConfig, PaddingConfig3d,
    },
    prelude::*,
};

/// Epsilon of every instance normalization layer in the network.
pub const INSTANCE_NORM_EPSILON: f64 = 1e-3;

/// Negative slope of the leaky ReLU following every convolution block.
pub const LEAKY_RELU_SLOPE: f64 = 0.3;

/// Symmetric padding that keeps the spatial size of a stride-1 convolution with an odd
/// kernel.
pub const fn same_padding(kernel_size: [usize; 3]) -> PaddingConfig3d {
    PaddingConfig3d::Explicit(kernel_size[0] / 2, kernel_size[1] / 2, kernel_size[2] / 2)
}

/// `(before, after)` zero padding of one axis for "same" convolution, the TensorFlow
/// convention: output size `ceil(size / stride)`, odd remainders padded after.
///
/// A stride-2, 3-wide kernel on an even axis pads `(0, 1)`, so output voxel `i` is
/// centred on input voxel `2i + 1`.
pub const fn same_padding_amounts(size: usize, kernel: usize, stride: usize) -> (usize, usize) {
    let out = size.div_ceil(stride);
    let total = (out.saturating_sub(1) * stride + kernel).saturating_sub(size);
    (total / 2, total - total / 2)
}

/// Zero-pads the spatial axes of `x` for a "same" convolution with `kernel_size` and `stride`.
pub fn pad_same<B: Backend>(
    x: Tensor<B, 5>,
    kernel_size: [usize; 3],
    stride: [usize; 3],
) -> Tensor<B, 5> {
    let dims = x.dims();
    (0..3).fold(x, |x, axis| {
        let (before, after) = same_padding_amounts(dims[axis + 2], kernel_size[axis], stride[axis]);
        pad_axis(x, axis + 2, before, after)
    })
}

fn pad_axis<B: Backend>(x: Tensor<B, 5>, axis: usize, before: usize, after: usize) -> Tensor<B, 5> {
    if before == 0 && after == 0 {
        return x;
    }

    let device = x.device();
    let zeros = |size: usize| {
        let mut shape = x.dims();
        shape[axis] = size;
        Tensor::<B, 5>::zeros(shape, &device)
    };

    let mut parts = Vec::with_capacity(3);
    if before > 0 {
        parts.push(zeros(before));
    }
    let after = (after > 0).then(|| zeros(after));
    parts.push(x);
    parts.extend(after);

    Tensor::cat(parts, axis)
}

/// Instance normalization over the channel axis of a `[B, C, D, H, W]` tensor.
pub fn instance_norm<B: Backend>(channels: usize, device: &Device<B>) -> InstanceNorm<B> {
    InstanceNormConfig::new(channels)
        .with_epsilon(INSTANCE_NORM_EPSILON)
        .init(device)
}

/// Configuration for the `ConvBlock` module.
#[derive(Config, Debug)]
pub struct ConvBlockConfig {
    /// Number of input channels.
    in_channels: usize,
    /// Number of output channels.
    out_channels: usize,
    /// Convolution kernel size.
    #[config(default = "[3, 3, 3]")]
    kernel_size: [usize; 3],
    /// Convolution stride. `[2, 2, 2]` is used for encoder downsampling.
    #[config(default = "[1, 1, 1]")]
    stride: [usize; 3],
}

impl ConvBlockConfig {
    /// Initializes a new `ConvBlock` module.
    pub fn init<B: Backend>(&self, device: &Device<B>) -> ConvBlock<B> {
        // Strided blocks pad asymmetrically in forward
        let strided = self.stride.iter().any(|&stride| stride > 1);
        let padding = if strided {
            PaddingConfig3d::Valid
        } else {
            same_padding(self.kernel_size)
        };
        let conv = Conv3dConfig::new([self.in_channels, self.out_channels], self.kernel_size)
            .with_stride(self.stride)
            .with_padding(padding)
            .init(device);
        let norm = instance_norm(self.out_channels, device);
        let activation = LeakyReluConfig::new()
            .with_negative_slope(LEAKY_RELU_SLOPE)
            .init();

        ConvBlock {
            conv,
            norm,
            activation,
        }
    }
}

/// Convolution, instance normalization and leaky ReLU.
#[derive(Module, Debug)]
pub struct ConvBlock<B: Backend> {
    conv: Conv3d<B>,
    norm: InstanceNorm<B>,
    activation: LeakyRelu,
}

impl<B: Backend> ConvBlock<B> {
    /// # Shapes
    /// - input: `[batch_size, in_channels, D, H, W]`
    /// - output: `[batch_size, out_channels, D / stride, H / stride, W / stride]`
    pub fn forward(&self, x: Tensor<B, 5>) -> Tensor<B, 5> {
        let x = if self.conv.stride.iter().any(|&stride| stride > 1) {
            pad_same(x, self.conv.kernel_size, self.conv.stride)
        } else {
            x
        };
        let x = self.conv.forward(x);
        let x = self.norm.forward(x);
        self.activation.forward(x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::{
        backend::{ndarray::NdArrayDevice, NdArray},
        tensor::Distribution,
    };

    type TestBackend = NdArray;

    #[test]
    fn test_conv_block_keeps_resolution() {
        let device = NdArrayDevice::default();
        let block = ConvBlockConfig::new(4, 8).init::<TestBackend>(&device);

        let x = Tensor::<TestBackend, 5>::random([2, 4, 8, 8, 8], Distribution::Default, &device);
        assert_eq!(block.forward(x).dims(), [2, 8, 8, 8, 8]);
    }

    #[test]
    fn test_conv_block_strided_halves_resolution() {
        let device = NdArrayDevice::default();
        let block = ConvBlockConfig::new(4, 8)
            .with_stride([2, 2, 2])
            .init::<TestBackend>(&device);

        let x = Tensor::<TestBackend, 5>::random([1, 4, 8, 8, 8], Distribution::Default, &device);
        assert_eq!(block.forward(x).dims(), [1, 8, 4, 4, 4]);
    }

    #[test]
    fn test_same_padding_amounts_follow_tensorflow() {
        // Stride 1, odd kernel: symmetric
        assert_eq!(same_padding_amounts(8, 3, 1), (1, 1));
        // Stride 2 on even sizes: the extra voxel goes after
        assert_eq!(same_padding_amounts(8, 3, 2), (0, 1));
        assert_eq!(same_padding_amounts(16, 3, 2), (0, 1));
        // Stride 2 on odd sizes: symmetric again
        assert_eq!(same_padding_amounts(7, 3, 2), (1, 1));
        assert_eq!(same_padding_amounts(8, 1, 2), (0, 0));
    }

    #[test]
    fn test_pad_same_appends_zeros_after_even_axes() {
        let device = NdArrayDevice::default();
        let x = Tensor::<TestBackend, 5>::ones([1, 1, 4, 4, 4], &device);

        let padded = pad_same(x, [3, 3, 3], [2, 2, 2]);
        assert_eq!(padded.dims(), [1, 1, 5, 5, 5]);

        let leading = padded.clone().slice([0..1, 0..1, 0..4, 0..4, 0..4]);
        assert_eq!(leading.min().into_scalar(), 1.0);

        let trailing = padded.slice([0..1, 0..1, 4..5, 0..5, 0..5]);
        assert_eq!(trailing.abs().max().into_scalar(), 0.0);
    }

    #[test]
    fn test_strided_conv_samples_tensorflow_grid() {
        let device = NdArrayDevice::default();
        let block = ConvBlockConfig::new(1, 1)
            .with_stride([2, 2, 2])
            .init::<TestBackend>(&device);

        // Input equal to its depth index: 0, 1, 2, 3
        let ramp = Tensor::<TestBackend, 1, Int>::arange(0..4, &device)
            .float()
            .reshape([1, 1, 4, 1, 1])
            .repeat_dim(3, 4)
            .repeat_dim(4, 4);
        let padded = pad_same(ramp, [3, 3, 3], [2, 2, 2]);

        // Output depth 0 sees input depths 0..3 and depth 1 sees 2..5 (4 is padding)
        let first = padded.clone().slice([0..1, 0..1, 0..3, 0..3, 0..3]);
        let second = padded.slice([0..1, 0..1, 2..5, 0..3, 0..3]);
        assert_eq!(first.sum().into_scalar(), 27.0);
        assert_eq!(second.sum().into_scalar(), 45.0);

        let x = Tensor::<TestBackend, 5>::random([1, 1, 4, 4, 4], Distribution::Default, &device);
        assert_eq!(block.forward(x).dims(), [1, 1, 2, 2, 2]);
    }

    #[test]
    fn test_conv_block_pointwise_kernel() {
        let device = NdArrayDevice::default();
        let block = ConvBlockConfig::new(6, 3)
            .with_kernel_size([1, 1, 1])
            .init::<TestBackend>(&device);

        let x = Tensor::<TestBackend, 5>::random([1, 6, 4, 4, 4], Distribution::Default, &device);
        assert_eq!(block.forward(x).dims(), [1, 3, 4, 4, 4]);
    }

    #[test]
    fn test_conv_block_output_is_normalized_then_leaky() {
        let device = NdArrayDevice::default();
        let block = ConvBlockConfig::new(2, 4).init::<TestBackend>(&device);

        let x = Tensor::<TestBackend, 5>::random(
            [1, 2, 6, 6, 6],
            Distribution::Normal(0.0, 1.0),
            &device,
        );
        let output = block.forward(x);

        // Instance norm centres each channel, so the leaky ReLU must see negatives:
        // the output minimum is negative but bounded by slope * the normalized minimum.
        let min = output.clone().min().into_scalar();
        let max = output.max().into_scalar();
        assert!(min < 0.0, "expected negative leaky outputs, got min {min}");
        assert!(max > 0.0);
        assert!(min > -(LEAKY_RELU_SLOPE as f32) * 20.0);
    }
}

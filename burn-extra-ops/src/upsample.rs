//! # Volumetric Upsampling
//!
//! Burn's `interpolate` only covers rank-4 tensors. Nearest-neighbour upsampling of a
//! `[batch, channels, D, H, W]` volume by integer factors is expressed here with
//! `unsqueeze`, `repeat_dim` and `reshape`, so it runs on every backend and keeps
//! autodiff support.

use burn::prelude::*;

/// Upsamples a volume by repeating every voxel `scale[i]` times along spatial axis `i`.
///
/// # Shapes
/// - input: `[batch_size, channels, depth, height, width]`
/// - output: `[batch_size, channels, depth * sd, height * sh, width * sw]`
pub fn upsample_nearest_3d<B: Backend>(x: Tensor<B, 5>, scale: [usize; 3]) -> Tensor<B, 5> {
    scale
        .iter()
        .enumerate()
        .fold(x, |x, (axis, &factor)| repeat_axis(x, axis + 2, factor))
}

fn repeat_axis<B: Backend>(x: Tensor<B, 5>, axis: usize, factor: usize) -> Tensor<B, 5> {
    if factor == 1 {
        return x;
    }
    let mut dims = x.dims();
    dims[axis] *= factor;

    // [.., n, ..] -> [.., n, 1, ..] -> [.., n, factor, ..] -> [.., n * factor, ..]
    x.unsqueeze_dim::<6>(axis + 1)
        .repeat_dim(axis + 1, factor)
        .reshape(dims)
}

/// Configuration for the `Upsample3d` module.
#[derive(Config, Debug)]
pub struct Upsample3dConfig {
    /// Integer upsampling factor per spatial axis `[depth, height, width]`.
    #[config(default = "[2, 2, 2]")]
    pub scale: [usize; 3],
}

impl Upsample3dConfig {
    /// Initializes a new `Upsample3d` module.
    pub const fn init(&self) -> Upsample3d {
        Upsample3d { scale: self.scale }
    }
}

/// Nearest-neighbour volumetric upsampling module.
#[derive(Module, Clone, Debug)]
pub struct Upsample3d {
    scale: [usize; 3],
}

impl Upsample3d {
    /// Upsampling factor per spatial axis.
    pub const fn scale(&self) -> [usize; 3] {
        self.scale
    }

    pub fn forward<B: Backend>(&self, x: Tensor<B, 5>) -> Tensor<B, 5> {
        upsample_nearest_3d(x, self.scale)
    }
}

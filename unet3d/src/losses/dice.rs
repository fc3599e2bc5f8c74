//! Soft weighted Dice loss.
//!
//! The Dice coefficient is computed per sample and per label over the spatial axes and
//! then averaged, so small structures weigh as much as large ones:
//!
//! ```text
//! loss = -mean_{b,c} 2 * (Σ t·p + s/2) / (Σ t + Σ p + s)
//! ```
//!
//! The loss lies in `[-1, 0]` and reaches `-1` for a perfect prediction.

use burn::{
    prelude::*,
    tensor::{backend::Backend, Tensor},
};

/// Configuration for Dice Loss.
#[derive(Config, Debug)]
pub struct DiceLossConfig {
    /// Smoothing term keeping empty labels finite.
    #[config(default = 1e-5)]
    pub smooth: f64,
    #[config(default = 1.0)]
    pub weight: f32,
}

/// Soft weighted Dice loss over `[batch, labels, D, H, W]` probabilities.
#[derive(Module, Debug)]
pub struct DiceLoss<B: Backend> {
    pub smooth: f64,
    pub weight: f32,
    _phantom: std::marker::PhantomData<B>,
}

impl DiceLossConfig {
    /// Initialize a new Dice loss with the given configuration.
    pub const fn init<B: Backend>(&self) -> DiceLoss<B> {
        DiceLoss {
            smooth: self.smooth,
            weight: self.weight,
            _phantom: std::marker::PhantomData,
        }
    }
}

impl<B: Backend> Default for DiceLoss<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: Backend> DiceLoss<B> {
    /// Create a new Dice loss with default configuration.
    pub fn new() -> Self {
        DiceLossConfig::new().init()
    }

    /// Dice coefficient per sample and label, shape `[batch, labels]`.
    pub fn coefficients(&self, pred: Tensor<B, 5>, target: Tensor<B, 5>) -> Tensor<B, 2> {
        let [batch, labels, ..] = pred.dims();

        let intersection = spatial_sum(pred.clone() * target.clone());
        let total = spatial_sum(target) + spatial_sum(pred);

        let dice = (intersection + self.smooth / 2.0) * 2.0 / (total + self.smooth);
        dice.reshape([batch, labels])
    }

    /// Calculate Dice loss.
    pub fn forward(&self, pred: Tensor<B, 5>, target: Tensor<B, 5>) -> Tensor<B, 1> {
        self.coefficients(pred, target).mean().neg() * self.weight
    }
}

fn spatial_sum<B: Backend>(x: Tensor<B, 5>) -> Tensor<B, 5> {
    x.sum_dim(4).sum_dim(3).sum_dim(2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::{ndarray::NdArrayDevice, NdArray};

    type TestBackend = NdArray;

    #[test]
    fn test_perfect_prediction_reaches_minus_one() {
        let device = NdArrayDevice::default();
        let target = Tensor::<TestBackend, 5>::ones([2, 3, 4, 4, 4], &device);

        let loss = DiceLoss::new().forward(target.clone(), target);
        assert!((loss.into_scalar() + 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_disjoint_prediction_is_near_zero() {
        let device = NdArrayDevice::default();
        let target = Tensor::<TestBackend, 5>::ones([1, 2, 4, 4, 4], &device);
        let pred = Tensor::<TestBackend, 5>::zeros([1, 2, 4, 4, 4], &device);

        let loss = DiceLoss::new().forward(pred, target).into_scalar();
        assert!(loss.abs() < 1e-6, "expected ~0, got {loss}");
    }

    #[test]
    fn test_half_overlap_coefficient() {
        let device = NdArrayDevice::default();
        // Target covers the whole volume, prediction is 0.5 everywhere:
        // 2 * 0.5n / (n + 0.5n) = 2/3
        let target = Tensor::<TestBackend, 5>::ones([1, 1, 2, 2, 2], &device);
        let pred = Tensor::<TestBackend, 5>::full([1, 1, 2, 2, 2], 0.5, &device);

        let coefficients = DiceLossConfig::new()
            .with_smooth(0.0)
            .init::<TestBackend>()
            .coefficients(pred, target);
        assert_eq!(coefficients.dims(), [1, 1]);
        assert!((coefficients.into_scalar() - 2.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_empty_label_is_finite() {
        let device = NdArrayDevice::default();
        let target = Tensor::<TestBackend, 5>::zeros([1, 1, 2, 2, 2], &device);
        let pred = Tensor::<TestBackend, 5>::zeros([1, 1, 2, 2, 2], &device);

        // Both empty: (0 + s/2) * 2 / s = 1
        let loss = DiceLoss::new().forward(pred, target).into_scalar();
        assert!((loss + 1.0).abs() < 1e-5);
    }
}

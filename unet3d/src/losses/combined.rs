//! Training objective of the network.
//!
//! Combines the soft Dice loss on the activated output with the L2 penalty collected
//! from the attention gates.

use burn::{
    prelude::*,
    tensor::{backend::Backend, Tensor},
};

use super::dice::{DiceLoss, DiceLossConfig};

/// Configuration for [`UnetLoss`].
#[derive(Config, Debug)]
pub struct UnetLossConfig {
    #[config(default = "DiceLossConfig::new()")]
    pub dice: DiceLossConfig,
    /// Scale applied to the model's regularization term.
    #[config(default = 1.0)]
    pub regularization_weight: f32,
}

/// Dice loss plus weighted regularization.
#[derive(Module, Debug)]
pub struct UnetLoss<B: Backend> {
    pub dice: DiceLoss<B>,
    pub regularization_weight: f32,
}

impl UnetLossConfig {
    pub fn init<B: Backend>(&self) -> UnetLoss<B> {
        UnetLoss {
            dice: self.dice.init(),
            regularization_weight: self.regularization_weight,
        }
    }
}

impl<B: Backend> Default for UnetLoss<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: Backend> UnetLoss<B> {
    pub fn new() -> Self {
        UnetLossConfig::new().init()
    }

    /// # Shapes
    ///
    /// - pred, target: `[batch, labels, D, H, W]`, `pred` already activated
    /// - regularization: `[1]`
    /// - output: `[1]`
    pub fn forward(
        &self,
        pred: Tensor<B, 5>,
        target: Tensor<B, 5>,
        regularization: Tensor<B, 1>,
    ) -> Tensor<B, 1> {
        self.dice.forward(pred, target) + regularization * self.regularization_weight
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    #[test]
    fn test_unet_loss_adds_regularization() {
        let device = Default::default();
        let target = Tensor::<TestBackend, 5>::ones([1, 2, 2, 2, 2], &device);
        let pred = target.clone();
        let regularization = Tensor::<TestBackend, 1>::from_floats([0.5], &device);

        let loss = UnetLoss::<TestBackend>::new().forward(pred, target, regularization);
        let value = loss.into_scalar();
        assert!((value - (-0.5)).abs() < 1e-4);
    }

    #[test]
    fn test_regularization_weight_zero_is_plain_dice() {
        let device = Default::default();
        let target = Tensor::<TestBackend, 5>::ones([1, 1, 2, 2, 2], &device);
        let pred = Tensor::<TestBackend, 5>::full([1, 1, 2, 2, 2], 0.5, &device);
        let regularization = Tensor::<TestBackend, 1>::from_floats([10.0], &device);

        let loss = UnetLossConfig::new()
            .with_regularization_weight(0.0)
            .init::<TestBackend>();
        let combined = loss.forward(pred.clone(), target.clone(), regularization);
        let dice = DiceLoss::<TestBackend>::new().forward(pred, target);

        let diff = (combined - dice).abs().into_scalar();
        assert!(diff < 1e-6);
    }
}

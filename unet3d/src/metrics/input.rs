use burn::{prelude::*, tensor::backend::Backend};

/// Probabilities and one-hot targets laid out `[batch, labels, D, H, W]`.
pub struct DiceInput<B: Backend> {
    pub predictions: Tensor<B, 5>,
    pub targets: Tensor<B, 5>,
}

impl<B: Backend> DiceInput<B> {
    pub const fn new(predictions: Tensor<B, 5>, targets: Tensor<B, 5>) -> Self {
        Self {
            predictions,
            targets,
        }
    }
}

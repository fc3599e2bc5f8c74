//! Loss functions for training the attention residual 3D U-Net.

pub mod combined;
pub mod dice;

pub use combined::{UnetLoss, UnetLossConfig};
pub use dice::{DiceLoss, DiceLossConfig};

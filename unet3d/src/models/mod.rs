//! # Model Architectures
//!
//! - `modules`: the building blocks (convolution block, context module, attention gate,
//!   localization and up-sampling modules).
//! - `unet`: the attention residual 3D U-Net wiring them into encoder, decoder and
//!   deep-supervision head.

pub mod modules;
pub mod unet;

pub use unet::{AttentionUnet3d, AttentionUnet3dRecord, LevelOutput, UnetOutput};

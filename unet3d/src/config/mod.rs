//! Configuration module for the attention residual 3D U-Net.
//!
//! - `core`: the model configuration, its validation and derived quantities
//! - `enums`: enumeration types used in configurations
//! - `shape`: static shape planning for a configuration

pub mod core;
pub mod enums;
pub mod shape;

pub use core::ModelConfig;
pub use enums::Activation;
pub use shape::{LevelShape, ShapePlan};

//! Metrics for training and evaluation.

pub mod dice;
pub mod input;

pub use dice::*;
pub use input::*;

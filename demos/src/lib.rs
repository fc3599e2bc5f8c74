//! Command line tools for the attention residual 3D U-Net.
//!
//! ## Commands
//!
//! - `summary`: Prints the module tree, parameter count and shape plan of a configuration.
//! - `train`: Trains on synthetic sphere phantoms with Burn's `Learner`.
//! - `infer`: Runs a forward pass on a synthetic volume and reports per-label statistics.
//! - `info`: Shows the compiled-in backend and the activation memory of a configuration.
//!
//! ## Usage
//!
//! ```bash
//! cargo run --bin unet3d -- summary --input-shape 4,64,64,64
//! cargo run --bin unet3d -- train --config train.json
//! cargo run --bin unet3d -- infer --model artifacts/final_model
//! ```

pub mod backend;
pub mod config;
pub mod inference;
pub mod logging;
pub mod summary;
pub mod training;

pub use backend::{BackendInfo, SelectedBackend, SelectedDevice};
pub use config::TrainingConfig;

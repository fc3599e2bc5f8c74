//! Model summary.

use anyhow::Result;
use burn::{module::Module, tensor::backend::Backend};
use unet3d_burn::ModelConfig;

/// Builds the model on `device` and prints its module tree, parameter count and
/// every intermediate shape.
///
/// # Errors
///
/// Returns an error if the configuration is invalid.
pub fn print_summary<B: Backend>(config: &ModelConfig, device: &B::Device) -> Result<()> {
    let plan = config.shape_plan()?;
    let model = config.init::<B>(device)?;

    tracing::info!(
        depth = config.depth,
        n_labels = config.n_labels,
        activation = config.activation.name(),
        "model initialized"
    );

    println!("{model}");
    println!("Parameters: {}", model.num_params());
    println!();
    println!("Input:  {:?}", plan.input);
    for level in &plan.encoder {
        println!("Encoder level {}: {:?}", level.level, level.shape);
    }
    for level in &plan.decoder {
        println!("Decoder level {}: {:?}", level.level, level.shape);
    }
    for level in &plan.segmentation {
        println!("Segmentation level {}: {:?}", level.level, level.shape);
    }
    println!("Output: {:?}", plan.output);

    Ok(())
}

//! Inference on a synthetic volume.

use std::path::PathBuf;

use anyhow::{Context, Result};
use burn::{
    data::{dataloader::batcher::Batcher, dataset::Dataset},
    module::Module,
    prelude::*,
    record::CompactRecorder,
    tensor::ElementConversion,
};
use unet3d_burn::{
    metrics::calculate_dice, ModelConfig, SyntheticVolumeDataset, VolumeBatch, VolumeBatcher,
};

/// Per-label statistics of one prediction.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelStats {
    pub label: usize,
    /// Mean predicted probability.
    pub mean: f64,
    /// Fraction of voxels predicted above 0.5.
    pub foreground: f64,
    /// Dice coefficient of the thresholded prediction against the phantom label.
    pub dice: f64,
}

/// Runs the model on phantom `index` and returns statistics for every label.
///
/// # Errors
///
/// Returns an error if the configuration is invalid, the record cannot be loaded or the
/// volume does not fit the model.
pub fn run_inference<B: Backend>(
    config: &ModelConfig,
    model_path: Option<PathBuf>,
    index: usize,
    device: &B::Device,
) -> Result<Vec<LabelStats>> {
    let mut model = config.init::<B>(device)?;
    if let Some(path) = model_path {
        tracing::info!(path = %path.display(), "loading model record");
        model = model
            .load_file(&path, &CompactRecorder::new(), device)
            .with_context(|| format!("failed to load model from {}", path.display()))?;
    }

    let dataset = SyntheticVolumeDataset::new(config, index + 1, 0)?;
    let item = dataset
        .get(index)
        .context("synthetic volume index out of range")?;
    let VolumeBatch { volumes, labels } = VolumeBatcher::new().batch(vec![item], device);

    let output = model.try_forward(volumes)?;
    tracing::debug!(dims = ?output.dims(), "forward pass finished");

    let n_labels = model.n_labels();
    let stats = (0..n_labels)
        .map(|label| {
            let prediction = output.clone().narrow(1, label, 1);
            let target = labels.clone().narrow(1, label, 1);

            LabelStats {
                label,
                mean: prediction.clone().mean().into_scalar().elem::<f64>(),
                foreground: prediction
                    .clone()
                    .greater_elem(0.5)
                    .float()
                    .mean()
                    .into_scalar()
                    .elem::<f64>(),
                dice: calculate_dice(prediction, target, Some(0.5), 1.0),
            }
        })
        .collect();

    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    #[test]
    fn test_inference_reports_every_label() {
        let config = ModelConfig::new()
            .with_input_shape([1, 8, 8, 8])
            .with_n_base_filters(2)
            .with_depth(2)
            .with_n_segmentation_levels(1)
            .with_n_labels(2);

        let stats = run_inference::<NdArray>(&config, None, 0, &Default::default()).unwrap();

        assert_eq!(stats.len(), 2);
        for (label, entry) in stats.iter().enumerate() {
            assert_eq!(entry.label, label);
            assert!(entry.mean > 0.0 && entry.mean < 1.0);
            assert!((0.0..=1.0).contains(&entry.foreground));
            assert!((0.0..=1.0).contains(&entry.dice));
        }
    }

    #[test]
    fn test_missing_record_is_an_error() {
        let config = ModelConfig::new()
            .with_input_shape([1, 8, 8, 8])
            .with_depth(2)
            .with_n_segmentation_levels(1);
        let path = std::env::temp_dir().join("unet3d_missing_record");

        assert!(run_inference::<NdArray>(&config, Some(path), 0, &Default::default()).is_err());
    }
}

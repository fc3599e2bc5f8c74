//! Training functionality for the attention residual 3D U-Net.
//!
//! Implements [`TrainStep`] and [`ValidStep`] for [`AttentionUnet3d`] so the model can
//! be driven by Burn's `Learner`.

use burn::{
    prelude::*,
    tensor::{
        backend::{AutodiffBackend, Backend},
        Transaction,
    },
    train::{
        metric::{Adaptor, ItemLazy, LossInput},
        TrainOutput, TrainStep, ValidStep,
    },
};

use crate::{dataset::VolumeBatch, metrics::DiceInput, models::AttentionUnet3d};

/// Output of a training or validation step.
#[derive(Debug, Clone)]
pub struct SegmentationOutput<B: Backend> {
    /// Activated predictions, `[batch, labels, D, H, W]`.
    pub output: Tensor<B, 5>,
    pub targets: Tensor<B, 5>,
    pub loss: Tensor<B, 1>,
}

impl<B: Backend> ItemLazy for SegmentationOutput<B> {
    type ItemSync = Self;

    fn sync(self) -> Self::ItemSync {
        let [output, targets, loss] = Transaction::default()
            .register(self.output)
            .register(self.targets)
            .register(self.loss)
            .execute()
            .try_into()
            .unwrap_or_else(|_| {
                panic!("transaction returned a different number of tensors than registered")
            });

        let device = &Default::default();

        Self {
            output: Tensor::from_data(output, device),
            targets: Tensor::from_data(targets, device),
            loss: Tensor::from_data(loss, device),
        }
    }
}

impl<B: Backend> Adaptor<LossInput<B>> for SegmentationOutput<B> {
    fn adapt(&self) -> LossInput<B> {
        LossInput::new(self.loss.clone())
    }
}

impl<B: Backend> Adaptor<DiceInput<B>> for SegmentationOutput<B> {
    fn adapt(&self) -> DiceInput<B> {
        DiceInput::new(self.output.clone(), self.targets.clone())
    }
}

impl<B: Backend> AttentionUnet3d<B> {
    /// Forward pass for training and validation.
    pub fn forward_segmentation(&self, batch: VolumeBatch<B>) -> SegmentationOutput<B> {
        let output = self.forward(batch.volumes);
        let loss = self.loss().forward(
            output.clone(),
            batch.labels.clone(),
            self.regularization_loss(),
        );

        SegmentationOutput {
            output,
            targets: batch.labels,
            loss,
        }
    }
}

impl<B: AutodiffBackend> TrainStep<VolumeBatch<B>, SegmentationOutput<B>> for AttentionUnet3d<B> {
    fn step(&self, batch: VolumeBatch<B>) -> TrainOutput<SegmentationOutput<B>> {
        let item = self.forward_segmentation(batch);
        TrainOutput::new(self, item.loss.backward(), item)
    }
}

impl<B: Backend> ValidStep<VolumeBatch<B>, SegmentationOutput<B>> for AttentionUnet3d<B> {
    fn step(&self, batch: VolumeBatch<B>) -> SegmentationOutput<B> {
        self.forward_segmentation(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::ModelConfig,
        dataset::{SyntheticVolumeDataset, VolumeBatcher},
        losses::{DiceLoss, UnetLossConfig},
    };
    use burn::{
        backend::{Autodiff, NdArray},
        data::{dataloader::batcher::Batcher, dataset::Dataset},
    };

    type TestBackend = NdArray;
    type TestAutodiffBackend = Autodiff<NdArray>;

    fn config() -> ModelConfig {
        ModelConfig::new()
            .with_input_shape([2, 16, 16, 16])
            .with_n_base_filters(4)
            .with_depth(3)
            .with_n_segmentation_levels(2)
            .with_n_labels(3)
    }

    fn batch<B: Backend>(device: &B::Device) -> VolumeBatch<B> {
        let dataset = SyntheticVolumeDataset::new(&config(), 2, 3).unwrap();
        let items = (0..dataset.len()).filter_map(|i| dataset.get(i)).collect();
        VolumeBatcher::new().batch(items, device)
    }

    #[test]
    fn test_valid_step_output() {
        let device = Default::default();
        let model = config().init::<TestBackend>(&device).unwrap();

        let output = ValidStep::step(&model, batch::<TestBackend>(&device));

        assert_eq!(output.output.dims(), [2, 3, 16, 16, 16]);
        assert_eq!(output.targets.dims(), [2, 3, 16, 16, 16]);
        let loss = output.loss.into_scalar();
        assert!(loss.is_finite());
        // Dice term is in [-1, 0] and the regularization is small and positive
        assert!(loss > -1.0 && loss < 1.0);
    }

    #[test]
    fn test_train_step_produces_gradients() {
        let device = Default::default();
        let model = config().init::<TestAutodiffBackend>(&device).unwrap();

        let output = TrainStep::step(&model, batch::<TestAutodiffBackend>(&device));

        assert!(output.item.loss.into_scalar().is_finite());
    }

    #[test]
    fn test_custom_loss_is_used() {
        let device = Default::default();
        let model = config()
            .init::<TestBackend>(&device)
            .unwrap()
            .with_loss(UnetLossConfig::new().with_regularization_weight(0.0).init());

        let batch = batch::<TestBackend>(&device);
        let labels = batch.labels.clone();
        let output = model.forward_segmentation(batch);

        let dice = DiceLoss::<TestBackend>::new().forward(output.output.clone(), labels);
        let diff = (output.loss - dice).abs().into_scalar();
        assert!(diff < 1e-6);
    }

    #[test]
    fn test_sync_keeps_shapes() {
        let device = Default::default();
        let model = config().init::<TestBackend>(&device).unwrap();
        let output = model.forward_segmentation(batch::<TestBackend>(&device));

        let synced = output.sync();
        assert_eq!(synced.output.dims(), [2, 3, 16, 16, 16]);
        assert_eq!(synced.loss.dims(), [1]);
    }
}

//! Volumetric dataset types for training and validation.
//!
//! Items hold raw [`TensorData`] so they can cross data-loader worker threads; the
//! batcher moves them to the target device and stacks them into `[B, C, D, H, W]`.
//!
//! Reading medical image formats is out of scope. [`SyntheticVolumeDataset`] renders
//! deterministic multi-label sphere phantoms so the training pipeline can be exercised
//! end to end without any files on disk.

use burn::data::{dataloader::batcher::Batcher, dataset::Dataset};
use burn::tensor::{backend::Backend, Tensor, TensorData};

use crate::{
    config::ModelConfig,
    error::{UnetError, UnetResult},
};

/// A single volume and its label map.
#[derive(Debug, Clone)]
pub struct VolumeItem {
    /// Input volume with shape `[channels, D, H, W]`.
    pub volume: TensorData,
    /// Label map with shape `[labels, D, H, W]`.
    pub label: TensorData,
}

/// A batch of volumes and label maps.
#[derive(Debug, Clone)]
pub struct VolumeBatch<B: Backend> {
    /// Batched volumes with shape `[B, channels, D, H, W]`.
    pub volumes: Tensor<B, 5>,
    /// Batched label maps with shape `[B, labels, D, H, W]`.
    pub labels: Tensor<B, 5>,
}

/// Batcher implementation for converting vectors of `VolumeItem` into `VolumeBatch`.
#[derive(Clone, Default)]
pub struct VolumeBatcher;

impl VolumeBatcher {
    /// Create a new volume batcher.
    pub const fn new() -> Self {
        Self
    }
}

impl<B: Backend> Batcher<B, VolumeItem, VolumeBatch<B>> for VolumeBatcher {
    fn batch(&self, items: Vec<VolumeItem>, device: &B::Device) -> VolumeBatch<B> {
        let batch_size = items.len();

        let mut volumes = Vec::with_capacity(batch_size);
        let mut labels = Vec::with_capacity(batch_size);

        for item in items {
            volumes.push(Tensor::<B, 4>::from_data(
                item.volume.convert::<B::FloatElem>(),
                device,
            ));
            labels.push(Tensor::<B, 4>::from_data(
                item.label.convert::<B::FloatElem>(),
                device,
            ));
        }

        // Stack along the batch dimension (dim 0) to create [B, C, D, H, W] tensors
        VolumeBatch {
            volumes: Tensor::stack(volumes, 0),
            labels: Tensor::stack(labels, 0),
        }
    }
}

/// Deterministic sphere phantoms shaped for a given model configuration.
///
/// Item `i` places a sphere whose centre and radius depend on `i`. Label `k` marks the
/// voxels within `radius * (labels - k) / labels` of the centre, giving nested regions
/// like the whole tumour, tumour core and enhancing tumour of BRATS. Every input
/// channel sees the sphere with a channel-specific contrast plus a fixed texture.
#[derive(Debug, Clone)]
pub struct SyntheticVolumeDataset {
    input_shape: [usize; 4],
    n_labels: usize,
    len: usize,
    seed: usize,
}

impl SyntheticVolumeDataset {
    /// Creates a dataset of `len` phantoms matching `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or `len` is zero.
    pub fn new(config: &ModelConfig, len: usize, seed: usize) -> UnetResult<Self> {
        config.validate()?;
        if len == 0 {
            return Err(UnetError::InvalidConfiguration {
                reason: "synthetic dataset must contain at least one volume".to_string(),
            });
        }

        tracing::debug!(
            len,
            seed,
            input_shape = ?config.input_shape,
            n_labels = config.n_labels,
            "created synthetic volume dataset"
        );

        Ok(Self {
            input_shape: config.input_shape,
            n_labels: config.n_labels,
            len,
            seed,
        })
    }

    fn render(&self, index: usize) -> VolumeItem {
        let [channels, d, h, w] = self.input_shape;
        let key = index.wrapping_mul(2_654_435_761).wrapping_add(self.seed);

        let min_side = d.min(h).min(w) as f32;
        let radius = min_side * (0.2 + 0.05 * (key % 4) as f32);
        let jitter = |axis: usize, size: usize| {
            let offset = ((key >> (axis * 3)) % 5) as f32 - 2.0;
            size as f32 / 2.0 + offset * size as f32 / 16.0
        };
        let centre = [jitter(0, d), jitter(1, h), jitter(2, w)];

        let voxels = d * h * w;
        let mut volume = vec![0.0f32; channels * voxels];
        let mut label = vec![0.0f32; self.n_labels * voxels];

        for z in 0..d {
            for y in 0..h {
                for x in 0..w {
                    let voxel = (z * h + y) * w + x;
                    let distance = ((z as f32 - centre[0]).powi(2)
                        + (y as f32 - centre[1]).powi(2)
                        + (x as f32 - centre[2]).powi(2))
                    .sqrt();
                    let inside = distance <= radius;
                    let texture = ((x + 2 * y + 3 * z + key) % 7) as f32 / 70.0;

                    for c in 0..channels {
                        let contrast = (c + 1) as f32 / channels as f32;
                        volume[c * voxels + voxel] =
                            if inside { contrast } else { 0.0 } + texture;
                    }

                    for k in 0..self.n_labels {
                        let shell = radius * (self.n_labels - k) as f32 / self.n_labels as f32;
                        if distance <= shell {
                            label[k * voxels + voxel] = 1.0;
                        }
                    }
                }
            }
        }

        VolumeItem {
            volume: TensorData::new(volume, [channels, d, h, w]),
            label: TensorData::new(label, [self.n_labels, d, h, w]),
        }
    }
}

impl Dataset<VolumeItem> for SyntheticVolumeDataset {
    fn get(&self, index: usize) -> Option<VolumeItem> {
        (index < self.len).then(|| self.render(index))
    }

    fn len(&self) -> usize {
        self.len
    }
}

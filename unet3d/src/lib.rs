//! # unet3d-burn
//!
//! An attention-gated residual 3D U-Net for volumetric segmentation (BRATS-style brain
//! tumour MRI), built on the Burn deep learning framework.
//!
//! ## Modules
//!
//! - `config`: Network hyperparameters, their validation and static shape planning.
//! - `error`: The crate error type.
//! - `models`: The building blocks and the assembled [`AttentionUnet3d`].
//! - `losses`: Soft Dice loss and the full training objective.
//! - `dataset`, `metrics`, `training` (feature `train`): Burn `Learner` integration.
//!
//! ## Example
//!
//! ```ignore
//! let config = ModelConfig::new().with_input_shape([4, 64, 64, 64]);
//! let model = config.init::<B>(&device)?;
//! let probabilities = model.try_forward(volumes)?;
//! ```

pub mod config;
mod error;
pub mod losses;
pub mod models;

#[cfg(feature = "train")]
pub mod dataset;
#[cfg(feature = "train")]
pub mod metrics;
#[cfg(feature = "train")]
pub mod training;

#[doc(inline)]
pub use config::{Activation, LevelShape, ModelConfig, ShapePlan};
#[doc(inline)]
pub use error::{UnetError, UnetResult};
#[doc(inline)]
pub use losses::{DiceLoss, DiceLossConfig, UnetLoss, UnetLossConfig};
#[doc(inline)]
pub use models::{AttentionUnet3d, AttentionUnet3dRecord, LevelOutput, UnetOutput};

#[cfg(feature = "train")]
#[doc(inline)]
pub use dataset::{SyntheticVolumeDataset, VolumeBatch, VolumeBatcher, VolumeItem};
#[cfg(feature = "train")]
#[doc(inline)]
pub use metrics::{DiceInput, DiceMetric, DiceMetricConfig};
#[cfg(feature = "train")]
#[doc(inline)]
pub use training::SegmentationOutput;

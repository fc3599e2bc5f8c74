//! Backend chosen at compile time by the `cuda`, `wgpu` and `ndarray` features.

use std::{fmt, mem::size_of};

use burn::tensor::backend::Backend;
use cfg_if::cfg_if;
use unet3d_burn::ShapePlan;

cfg_if! {
    if #[cfg(feature = "cuda")] {
        pub type SelectedBackend = burn::backend::Cuda;
        const NAME: &str = "CUDA (NVIDIA GPU)";
    } else if #[cfg(feature = "wgpu")] {
        pub type SelectedBackend = burn::backend::Wgpu;
        const NAME: &str = "WGPU (GPU)";
    } else {
        pub type SelectedBackend = burn::backend::NdArray;
        const NAME: &str = "NdArray (CPU)";
    }
}

pub type SelectedDevice = <SelectedBackend as Backend>::Device;

/// The compiled-in backend and the device commands run on.
#[derive(Debug, Clone)]
pub struct BackendInfo {
    pub name: &'static str,
    pub device: SelectedDevice,
}

impl BackendInfo {
    /// Default device of the selected backend.
    pub fn detect() -> Self {
        Self {
            name: NAME,
            device: SelectedDevice::default(),
        }
    }

    /// Bytes of one float element on this backend.
    pub const fn float_bytes(&self) -> usize {
        size_of::<<SelectedBackend as Backend>::FloatElem>()
    }

    /// Lower bound on the activation memory of one forward pass: every encoder,
    /// decoder and segmentation map of `plan`, times `batch_size`.
    pub fn activation_bytes(&self, plan: &ShapePlan, batch_size: usize) -> usize {
        let elements: usize = plan
            .encoder
            .iter()
            .chain(&plan.decoder)
            .chain(&plan.segmentation)
            .map(|level| level.shape.iter().product::<usize>())
            .sum::<usize>()
            + plan.input.iter().product::<usize>()
            + plan.output.iter().product::<usize>();

        elements * batch_size * self.float_bytes()
    }
}

impl fmt::Display for BackendInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} on {:?}", self.name, self.device)
    }
}

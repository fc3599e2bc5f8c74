//! # Attention Gate
//!
//! Re-weights an encoder skip connection with a soft spatial mask computed from the
//! skip features and the coarser decoder state.
//!
//! ```text
//! x ──conv1³(no bias)──norm──┐
//!                            add──relu──conv1³──norm──sigmoid──mask
//! g ──conv1³──norm──up×2─────┘                                  │
//! x ─────────────────────────────────────────────────────────── * ──> x·mask
//! ```

use burn::{
    nn::{
        conv::{Conv3d, Conv3dConfig},
        InstanceNorm, PaddingConfig3d, Relu,
    },
    prelude::*,
    tensor::activation::sigmoid,
};
use burn_extra_ops::{Upsample3d, Upsample3dConfig};

use super::instance_norm;

/// Configuration for the `AttentionGate` module.
#[derive(Config, Debug)]
pub struct AttentionGateConfig {
    /// Channels of the skip feature map `x`.
    in_channels: usize,
    /// Channels of the gating signal (the decoder state one level deeper).
    gating_channels: usize,
    /// Channels of the intermediate projections. The network uses `in_channels`.
    inter_channels: usize,
    /// L2 coefficient applied to every weight of the gate.
    #[config(default = "1e-5")]
    l2_coefficient: f64,
}

impl AttentionGateConfig {
    /// Initializes a new `AttentionGate` module.
    pub fn init<B: Backend>(&self, device: &Device<B>) -> AttentionGate<B> {
        let pointwise = |channels: [usize; 2], bias: bool| {
            Conv3dConfig::new(channels, [1, 1, 1])
                .with_padding(PaddingConfig3d::Valid)
                .with_bias(bias)
                .init(device)
        };

        AttentionGate {
            theta_x: pointwise([self.in_channels, self.inter_channels], false),
            norm_x: instance_norm(self.inter_channels, device),
            phi_g: pointwise([self.gating_channels, self.inter_channels], true),
            norm_g: instance_norm(self.inter_channels, device),
            upsample: Upsample3dConfig::new().init(),
            relu: Relu::new(),
            psi: pointwise([self.inter_channels, 1], true),
            norm_psi: instance_norm(1, device),
            l2_coefficient: self.l2_coefficient,
        }
    }
}

/// Additive attention gate producing `x * sigmoid(psi)`.
#[derive(Module, Debug)]
pub struct AttentionGate<B: Backend> {
    theta_x: Conv3d<B>,
    norm_x: InstanceNorm<B>,
    phi_g: Conv3d<B>,
    norm_g: InstanceNorm<B>,
    upsample: Upsample3d,
    relu: Relu,
    psi: Conv3d<B>,
    norm_psi: InstanceNorm<B>,
    l2_coefficient: f64,
}

impl<B: Backend> AttentionGate<B> {
    /// Applies the gate to `x`.
    ///
    /// # Shapes
    /// - x: `[batch_size, in_channels, D, H, W]`
    /// - gating: `[batch_size, gating_channels, D / 2, H / 2, W / 2]`
    /// - output: `[batch_size, in_channels, D, H, W]`
    pub fn forward(&self, x: Tensor<B, 5>, gating: Tensor<B, 5>) -> Tensor<B, 5> {
        self.forward_with_mask(x, gating).0
    }

    /// Returns the masked skip connection together with the mask `[batch_size, 1, D, H, W]`.
    pub fn forward_with_mask(
        &self,
        x: Tensor<B, 5>,
        gating: Tensor<B, 5>,
    ) -> (Tensor<B, 5>, Tensor<B, 5>) {
        let mask = self.attention_mask(x.clone(), gating);
        (x * mask.clone(), mask)
    }

    /// Computes the soft spatial mask with values in `(0, 1)`.
    pub fn attention_mask(&self, x: Tensor<B, 5>, gating: Tensor<B, 5>) -> Tensor<B, 5> {
        let w_x = self.norm_x.forward(self.theta_x.forward(x));
        let w_g = self.norm_g.forward(self.phi_g.forward(gating));
        let w_g = self.upsample.forward(w_g);

        let sum = self.relu.forward(w_x + w_g);
        let psi = self.norm_psi.forward(self.psi.forward(sum));

        sigmoid(psi)
    }

    /// L2 penalty `coefficient * Σ w²` over every kernel, bias, scale and shift of the gate.
    ///
    /// Burn applies weight decay per optimizer rather than per layer, so the penalty is
    /// returned as a scalar for the training loss to add.
    pub fn l2_penalty(&self) -> Tensor<B, 1> {
        let kernels = conv_sum_of_squares(&self.theta_x)
            + conv_sum_of_squares(&self.phi_g)
            + conv_sum_of_squares(&self.psi);

        let total = [&self.norm_x, &self.norm_g, &self.norm_psi]
            .into_iter()
            .flat_map(|norm| [&norm.gamma, &norm.beta])
            .flatten()
            .map(|param| param.val().powf_scalar(2.0).sum())
            .fold(kernels, |acc, term| acc + term);

        total * self.l2_coefficient
    }
}

fn conv_sum_of_squares<B: Backend>(conv: &Conv3d<B>) -> Tensor<B, 1> {
    let weight = conv.weight.val().powf_scalar(2.0).sum();
    match &conv.bias {
        Some(bias) => weight + bias.val().powf_scalar(2.0).sum(),
        None => weight,
    }
}

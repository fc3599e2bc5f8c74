//! # Attention Residual 3D U-Net
//!
//! This module wires the building blocks into the network described by Isensee et al.
//! for BRATS 2017, extended with attention-gated skip connections.
//!
//! ## Core Components
//!
//! - `EncoderLevel`: strided convolution block plus a residual context module.
//! - `DecoderLevel`: attention gate on the skip connection, up-sampling of the decoder
//!   state, concatenation and localization, with an optional segmentation head.
//! - `AttentionUnet3d`: the full network with deep supervision and the final activation.
//!
//! Encoder levels run `0..depth`, decoder levels run `depth - 2` down to `0`, and the
//! logits of the `n_segmentation_levels` shallowest decoder levels are upsampled and
//! summed into the output.

use burn::{
    module::Ignored,
    nn::{
        conv::{Conv3d, Conv3dConfig},
        PaddingConfig3d,
    },
    prelude::*,
    tensor::activation::{sigmoid, softmax},
};
use burn_extra_ops::{Upsample3d, Upsample3dConfig};

use super::modules::{
    AttentionGate, AttentionGateConfig, ContextModule, ContextModuleConfig, ConvBlock,
    ConvBlockConfig, LocalizationModule, LocalizationModuleConfig, UpSamplingModule,
    UpSamplingModuleConfig,
};
use crate::{
    config::{Activation, ModelConfig},
    error::{UnetError, UnetResult},
    losses::UnetLoss,
};

/// Configuration for one `EncoderLevel`.
#[derive(Config, Debug)]
pub struct EncoderLevelConfig {
    /// Channels of the previous level's output (or of the input volume).
    in_channels: usize,
    /// Filters of this level.
    filters: usize,
    /// Stride of the input convolution: 1 at level 0, 2 below.
    #[config(default = "[1, 1, 1]")]
    stride: [usize; 3],
    /// Spatial dropout rate of the context module.
    #[config(default = "0.3")]
    dropout_rate: f64,
}

impl EncoderLevelConfig {
    /// Initializes a new `EncoderLevel`.
    pub fn init<B: Backend>(&self, device: &Device<B>) -> EncoderLevel<B> {
        EncoderLevel {
            conv: ConvBlockConfig::new(self.in_channels, self.filters)
                .with_stride(self.stride)
                .init(device),
            context: ContextModuleConfig::new(self.filters)
                .with_dropout_rate(self.dropout_rate)
                .init(device),
            filters: self.filters,
        }
    }
}

/// One level of the encoder: `conv + context(conv)`.
#[derive(Module, Debug)]
pub struct EncoderLevel<B: Backend> {
    conv: ConvBlock<B>,
    context: ContextModule<B>,
    filters: usize,
}

impl<B: Backend> EncoderLevel<B> {
    /// Returns the residual sum of the input convolution and its context module.
    pub fn forward(&self, x: Tensor<B, 5>) -> Tensor<B, 5> {
        let conv = self.conv.forward(x);
        let context = self.context.forward(conv.clone());
        conv + context
    }
}

/// Configuration for one `DecoderLevel`.
#[derive(Config, Debug)]
pub struct DecoderLevelConfig {
    /// Filters of this level, equal to the matching encoder level.
    filters: usize,
    /// Channels of the incoming decoder state (one level deeper).
    state_channels: usize,
    /// Output labels of the segmentation head, if this level is supervised.
    #[config(default = "None")]
    n_labels: Option<usize>,
}

impl DecoderLevelConfig {
    /// Initializes a new `DecoderLevel`.
    pub fn init<B: Backend>(&self, device: &Device<B>) -> DecoderLevel<B> {
        let segmentation = self.n_labels.map(|n_labels| {
            Conv3dConfig::new([self.filters, n_labels], [1, 1, 1])
                .with_padding(PaddingConfig3d::Valid)
                .init(device)
        });

        DecoderLevel {
            attention: AttentionGateConfig::new(self.filters, self.state_channels, self.filters)
                .init(device),
            up_sampling: UpSamplingModuleConfig::new(self.state_channels, self.filters)
                .init(device),
            localization: LocalizationModuleConfig::new(2 * self.filters, self.filters)
                .init(device),
            segmentation,
        }
    }
}

/// One level of the decoder.
#[derive(Module, Debug)]
pub struct DecoderLevel<B: Backend> {
    attention: AttentionGate<B>,
    up_sampling: UpSamplingModule<B>,
    localization: LocalizationModule<B>,
    segmentation: Option<Conv3d<B>>,
}

impl<B: Backend> DecoderLevel<B> {
    /// Computes the new decoder state and the attention mask applied to `skip`.
    pub fn forward(&self, skip: Tensor<B, 5>, state: Tensor<B, 5>) -> (Tensor<B, 5>, Tensor<B, 5>) {
        let (gated, mask) = self.attention.forward_with_mask(skip, state.clone());
        let upsampled = self.up_sampling.forward(state);
        let concatenated = Tensor::cat(vec![gated, upsampled], 1);

        (self.localization.forward(concatenated), mask)
    }

    /// Projects the decoder state to segmentation logits if this level is supervised.
    pub fn segment(&self, state: Tensor<B, 5>) -> Option<Tensor<B, 5>> {
        self.segmentation.as_ref().map(|head| head.forward(state))
    }

    /// Whether this level contributes to deep supervision.
    pub const fn is_supervised(&self) -> bool {
        self.segmentation.is_some()
    }
}

/// The residual output of one encoder level, kept for the decoder's skip connection.
#[derive(Debug, Clone)]
pub struct LevelOutput<B: Backend> {
    /// Encoder level index.
    pub level: usize,
    /// Residual sum produced by the level.
    pub features: Tensor<B, 5>,
    /// Channel count of `features`.
    pub filters: usize,
}

/// Every intermediate result of a forward pass.
#[derive(Debug, Clone)]
pub struct UnetOutput<B: Backend> {
    /// Encoder outputs indexed by level.
    pub levels: Vec<LevelOutput<B>>,
    /// Attention masks indexed by decoder level.
    pub attention_masks: Vec<Tensor<B, 5>>,
    /// Segmentation logits indexed by supervised level.
    pub segmentation_logits: Vec<Tensor<B, 5>>,
    /// Deep-supervision sum at input resolution, before the activation.
    pub logits: Tensor<B, 5>,
    /// Activated output.
    pub output: Tensor<B, 5>,
}

/// The attention residual 3D U-Net.
#[derive(Module, Debug)]
pub struct AttentionUnet3d<B: Backend> {
    /// Encoder levels indexed by level.
    encoder: Vec<EncoderLevel<B>>,
    /// Decoder levels indexed by level (`0..depth - 1`); executed in reverse.
    decoder: Vec<DecoderLevel<B>>,
    /// Upsampling between deep-supervision levels.
    upsample: Upsample3d,
    in_channels: usize,
    n_labels: usize,
    activation: Ignored<Activation>,
    /// Objective used by the training and validation steps.
    loss: UnetLoss<B>,
}

impl ModelConfig {
    /// Initializes an `AttentionUnet3d` with this configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration does not pass [`ModelConfig::validate`].
    pub fn init<B: Backend>(&self, device: &Device<B>) -> UnetResult<AttentionUnet3d<B>> {
        self.validate()?;

        let encoder = (0..self.depth)
            .map(|level| {
                let (in_channels, stride) = if level == 0 {
                    (self.in_channels(), [1, 1, 1])
                } else {
                    (self.filters_at(level - 1), [2, 2, 2])
                };
                EncoderLevelConfig::new(in_channels, self.filters_at(level))
                    .with_stride(stride)
                    .with_dropout_rate(self.dropout_rate)
                    .init(device)
            })
            .collect();

        let decoder = (0..self.depth - 1)
            .map(|level| {
                DecoderLevelConfig::new(self.filters_at(level), self.filters_at(level + 1))
                    .with_n_labels((level < self.n_segmentation_levels).then_some(self.n_labels))
                    .init(device)
            })
            .collect();

        Ok(AttentionUnet3d {
            encoder,
            decoder,
            upsample: Upsample3dConfig::new().init(),
            in_channels: self.in_channels(),
            n_labels: self.n_labels,
            activation: Ignored(self.activation.clone()),
            loss: UnetLoss::new(),
        })
    }
}

impl<B: Backend> AttentionUnet3d<B> {
    /// Number of encoder levels (`depth`).
    pub fn num_levels(&self) -> usize {
        self.encoder.len()
    }

    /// Number of decoder levels contributing to deep supervision.
    pub fn num_segmentation_levels(&self) -> usize {
        self.decoder.iter().filter(|level| level.is_supervised()).count()
    }

    /// Number of output channels.
    pub const fn n_labels(&self) -> usize {
        self.n_labels
    }

    /// Final activation of the network.
    pub fn activation(&self) -> &Activation {
        &self.activation.0
    }

    /// Training objective.
    pub const fn loss(&self) -> &UnetLoss<B> {
        &self.loss
    }

    /// Replaces the training objective.
    pub fn with_loss(mut self, loss: UnetLoss<B>) -> Self {
        self.loss = loss;
        self
    }

    /// Checks that `x` can flow through the network.
    ///
    /// # Errors
    ///
    /// Returns `UnetError::InvalidTensorShape` if the channel count differs from the
    /// configured input channels or a spatial size is not a multiple of `2^(depth - 1)`.
    pub fn check_input(&self, x: &Tensor<B, 5>) -> UnetResult<()> {
        let [_, channels, d, h, w] = x.dims();
        let factor = 1 << (self.num_levels() - 1);

        if channels != self.in_channels
            || [d, h, w].iter().any(|&size| size == 0 || size % factor != 0)
        {
            return Err(UnetError::InvalidTensorShape {
                expected: format!(
                    "[batch, {}, D, H, W] with D, H, W multiples of {factor}",
                    self.in_channels
                ),
                actual: format!("{:?}", x.dims()),
            });
        }
        Ok(())
    }

    /// Runs the encoder and returns one record per level, indexed by level.
    pub fn forward_encoder(&self, x: Tensor<B, 5>) -> Vec<LevelOutput<B>> {
        let mut levels = Vec::with_capacity(self.encoder.len());
        let mut current = x;

        for (level, block) in self.encoder.iter().enumerate() {
            current = block.forward(current);
            levels.push(LevelOutput {
                level,
                features: current.clone(),
                filters: block.filters,
            });
        }

        levels
    }

    /// Runs the decoder on a complete set of encoder levels and returns the
    /// segmentation logits indexed by level.
    ///
    /// # Errors
    ///
    /// Returns `UnetError::MissingLevel` if a level is absent or out of order.
    pub fn forward_decoder(&self, levels: &[LevelOutput<B>]) -> UnetResult<Vec<Tensor<B, 5>>> {
        self.check_levels(levels)?;
        Ok(self.decode(levels).0)
    }

    /// Sums segmentation logits (indexed by level) from the deepest supervised level up,
    /// upsampling the running sum before every shallower level.
    ///
    /// # Errors
    ///
    /// Returns `UnetError::SegmentationLevelMismatch` if the number of logits differs from
    /// the number of supervised levels.
    pub fn combine_supervision(&self, logits: Vec<Tensor<B, 5>>) -> UnetResult<Tensor<B, 5>> {
        let expected = self.num_segmentation_levels();
        if logits.len() != expected {
            return Err(UnetError::SegmentationLevelMismatch {
                expected,
                actual: logits.len(),
            });
        }
        Ok(self.combine(logits))
    }

    /// Deep-supervision sum at input resolution, before the activation.
    pub fn forward_logits(&self, x: Tensor<B, 5>) -> Tensor<B, 5> {
        let levels = self.forward_encoder(x);
        let (logits, _) = self.decode(&levels);
        self.combine(logits)
    }

    /// Applies the configured final activation.
    pub fn activate(&self, logits: Tensor<B, 5>) -> Tensor<B, 5> {
        match self.activation() {
            Activation::Sigmoid => sigmoid(logits),
            Activation::Softmax => softmax(logits, 1),
        }
    }

    /// The main forward pass.
    ///
    /// # Shapes
    /// - input: `[batch_size, in_channels, D, H, W]`
    /// - output: `[batch_size, n_labels, D, H, W]`
    pub fn forward(&self, x: Tensor<B, 5>) -> Tensor<B, 5> {
        self.activate(self.forward_logits(x))
    }

    /// Forward pass that validates the input shape first.
    ///
    /// # Errors
    ///
    /// Returns the errors of [`AttentionUnet3d::check_input`].
    pub fn try_forward(&self, x: Tensor<B, 5>) -> UnetResult<Tensor<B, 5>> {
        self.check_input(&x)?;
        Ok(self.forward(x))
    }

    /// Forward pass keeping every intermediate result.
    pub fn forward_full(&self, x: Tensor<B, 5>) -> UnetOutput<B> {
        let levels = self.forward_encoder(x);
        let (segmentation_logits, attention_masks) = self.decode(&levels);
        let logits = self.combine(segmentation_logits.clone());
        let output = self.activate(logits.clone());

        UnetOutput {
            levels,
            attention_masks,
            segmentation_logits,
            logits,
            output,
        }
    }

    /// Sum of the L2 penalties of every attention gate.
    pub fn regularization_loss(&self) -> Tensor<B, 1> {
        let mut penalties = self.decoder.iter().map(|level| level.attention.l2_penalty());
        match penalties.next() {
            Some(first) => penalties.fold(first, |acc, penalty| acc + penalty),
            // Only reachable for a model without decoder levels; stay on its device
            None => {
                let device = self.devices().into_iter().next().unwrap_or_default();
                Tensor::zeros([1], &device)
            }
        }
    }

    fn check_levels(&self, levels: &[LevelOutput<B>]) -> UnetResult<()> {
        for level in 0..self.num_levels() {
            match levels.get(level) {
                Some(output) if output.level == level => {}
                _ => {
                    return Err(UnetError::MissingLevel {
                        level,
                        available: levels.len(),
                    })
                }
            }
        }
        Ok(())
    }

    /// Decoder pass over `depth - 2 ..= 0`. Returns the segmentation logits and the
    /// attention masks, both indexed by level.
    fn decode(&self, levels: &[LevelOutput<B>]) -> (Vec<Tensor<B, 5>>, Vec<Tensor<B, 5>>) {
        let mut state = levels[self.decoder.len()].features.clone();
        let mut logits = Vec::new();
        let mut masks = Vec::with_capacity(self.decoder.len());

        for (level, block) in self.decoder.iter().enumerate().rev() {
            let (next, mask) = block.forward(levels[level].features.clone(), state);
            state = next;
            masks.push(mask);
            if let Some(segmentation) = block.segment(state.clone()) {
                logits.push(segmentation);
            }
        }

        // Collected deepest first
        logits.reverse();
        masks.reverse();
        (logits, masks)
    }

    /// `out = s[n-1]`, then `out = up(out) + s[l]` for `l = n-2 ..= 0`.
    fn combine(&self, logits: Vec<Tensor<B, 5>>) -> Tensor<B, 5> {
        // Level 0 is always supervised: validation enforces n_segmentation_levels >= 1
        let mut deeper = logits;
        let finest = deeper.remove(0);

        match deeper
            .into_iter()
            .rev()
            .reduce(|acc, segmentation| self.upsample.forward(acc) + segmentation)
        {
            Some(acc) => self.upsample.forward(acc) + finest,
            None => finest,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::{
        backend::{ndarray::NdArrayDevice, NdArray},
        tensor::Distribution,
    };
    use burn_extra_ops::upsample_nearest_3d;

    type TestBackend = NdArray;

    fn small_config() -> ModelConfig {
        ModelConfig::new()
            .with_input_shape([2, 16, 16, 16])
            .with_n_base_filters(4)
            .with_depth(3)
            .with_n_segmentation_levels(2)
            .with_n_labels(3)
    }

    fn random_input(shape: [usize; 5], device: &NdArrayDevice) -> Tensor<TestBackend, 5> {
        Tensor::random(shape, Distribution::Normal(0.0, 1.0), device)
    }

    #[test]
    fn test_output_matches_input_resolution_and_labels() {
        let device = NdArrayDevice::default();
        let model = small_config().init::<TestBackend>(&device).unwrap();

        let output = model.forward(random_input([2, 2, 16, 16, 16], &device));
        assert_eq!(output.dims(), [2, 3, 16, 16, 16]);
    }

    #[test]
    fn test_encoder_levels_halve_resolution() {
        let device = NdArrayDevice::default();
        let model = small_config()
            .with_depth(4)
            .init::<TestBackend>(&device)
            .unwrap();

        let levels = model.forward_encoder(random_input([1, 2, 16, 16, 16], &device));
        assert_eq!(levels.len(), 4);
        for (index, level) in levels.iter().enumerate() {
            let size = 16 >> index;
            assert_eq!(level.level, index);
            assert_eq!(level.filters, 4 << index);
            assert_eq!(level.features.dims(), [1, 4 << index, size, size, size]);
        }
    }

    #[test]
    fn test_decoder_produces_one_logit_per_supervised_level() {
        let device = NdArrayDevice::default();
        let model = small_config()
            .with_depth(4)
            .with_n_segmentation_levels(3)
            .init::<TestBackend>(&device)
            .unwrap();
        assert_eq!(model.num_segmentation_levels(), 3);

        let levels = model.forward_encoder(random_input([1, 2, 16, 16, 16], &device));
        let logits = model.forward_decoder(&levels).unwrap();

        assert_eq!(logits.len(), 3);
        for (level, segmentation) in logits.iter().enumerate() {
            let size = 16 >> level;
            assert_eq!(segmentation.dims(), [1, 3, size, size, size]);
        }
    }

    #[test]
    fn test_decoder_rejects_incomplete_levels() {
        let device = NdArrayDevice::default();
        let model = small_config().init::<TestBackend>(&device).unwrap();

        let mut levels = model.forward_encoder(random_input([1, 2, 16, 16, 16], &device));
        levels.pop();

        match model.forward_decoder(&levels) {
            Err(UnetError::MissingLevel { level, available }) => {
                assert_eq!(level, 2);
                assert_eq!(available, 2);
            }
            other => panic!("Expected MissingLevel error, got {other:?}"),
        }
    }

    #[test]
    fn test_combine_supervision_upsamples_and_sums() {
        let device = NdArrayDevice::default();
        let model = small_config()
            .with_depth(4)
            .with_n_segmentation_levels(3)
            .init::<TestBackend>(&device)
            .unwrap();

        let s0 = random_input([1, 3, 8, 8, 8], &device);
        let s1 = random_input([1, 3, 4, 4, 4], &device);
        let s2 = random_input([1, 3, 2, 2, 2], &device);

        let combined = model
            .combine_supervision(vec![s0.clone(), s1.clone(), s2.clone()])
            .unwrap();

        let up = |x: Tensor<TestBackend, 5>| upsample_nearest_3d(x, [2, 2, 2]);
        let expected = up(up(s2) + s1) + s0;
        let diff = (combined - expected).abs().max().into_scalar();
        assert!(diff < 1e-6, "combined supervision differs by {diff}");

        assert_eq!(
            model
                .combine_supervision(vec![random_input([1, 3, 8, 8, 8], &device)])
                .err(),
            Some(UnetError::SegmentationLevelMismatch {
                expected: 3,
                actual: 1
            })
        );
    }

    #[test]
    fn test_combine_supervision_rejects_extra_logits() {
        let device = NdArrayDevice::default();
        let model = small_config()
            .with_n_segmentation_levels(1)
            .init::<TestBackend>(&device)
            .unwrap();

        let logits = vec![
            random_input([1, 3, 16, 16, 16], &device),
            random_input([1, 3, 8, 8, 8], &device),
        ];

        match model.combine_supervision(logits) {
            Err(UnetError::SegmentationLevelMismatch { expected, actual }) => {
                assert_eq!(expected, 1);
                assert_eq!(actual, 2);
            }
            other => panic!("Expected SegmentationLevelMismatch error, got {other:?}"),
        }
    }

    #[test]
    fn test_sigmoid_output_in_open_unit_interval() {
        let device = NdArrayDevice::default();
        let model = small_config().init::<TestBackend>(&device).unwrap();

        let output = model.forward(random_input([1, 2, 16, 16, 16], &device));
        let min = output.clone().min().into_scalar();
        let max = output.max().into_scalar();
        assert!(min > 0.0 && max < 1.0, "output range ({min}, {max}) escapes (0, 1)");
    }

    #[test]
    fn test_softmax_output_sums_to_one_over_labels() {
        let device = NdArrayDevice::default();
        let model = small_config()
            .with_activation(Activation::Softmax)
            .init::<TestBackend>(&device)
            .unwrap();

        let output = model.forward(random_input([2, 2, 16, 16, 16], &device));
        let error = (output.sum_dim(1) - 1.0).abs().max().into_scalar();
        assert!(error < 1e-5, "label probabilities deviate from 1 by {error}");
    }

    #[test]
    fn test_forward_full_is_consistent() {
        let device = NdArrayDevice::default();
        let model = small_config().init::<TestBackend>(&device).unwrap();

        let full = model.forward_full(random_input([1, 2, 16, 16, 16], &device));
        assert_eq!(full.levels.len(), 3);
        assert_eq!(full.attention_masks.len(), 2);
        assert_eq!(full.attention_masks[0].dims(), [1, 1, 16, 16, 16]);
        assert_eq!(full.attention_masks[1].dims(), [1, 1, 8, 8, 8]);
        assert_eq!(full.segmentation_logits.len(), 2);

        let activated = model.activate(full.logits);
        let diff = (activated - full.output).abs().max().into_scalar();
        assert!(diff < 1e-6);
    }

    #[test]
    fn test_too_many_segmentation_levels_fail_to_build() {
        let device = NdArrayDevice::default();
        let result = small_config()
            .with_n_segmentation_levels(3)
            .init::<TestBackend>(&device);

        assert!(matches!(
            result,
            Err(UnetError::InvalidConfiguration { .. })
        ));
    }

    #[test]
    fn test_try_forward_rejects_bad_inputs() {
        let device = NdArrayDevice::default();
        let model = small_config().init::<TestBackend>(&device).unwrap();

        let wrong_channels = random_input([1, 3, 16, 16, 16], &device);
        assert!(matches!(
            model.try_forward(wrong_channels),
            Err(UnetError::InvalidTensorShape { .. })
        ));

        let indivisible = random_input([1, 2, 16, 16, 10], &device);
        assert!(matches!(
            model.try_forward(indivisible),
            Err(UnetError::InvalidTensorShape { .. })
        ));

        let valid = random_input([1, 2, 8, 16, 12], &device);
        assert_eq!(model.try_forward(valid).unwrap().dims(), [1, 3, 8, 16, 12]);
    }

    #[test]
    fn test_regularization_loss_is_positive() {
        let device = NdArrayDevice::default();
        let model = small_config().init::<TestBackend>(&device).unwrap();

        let penalty = model.regularization_loss().into_scalar();
        assert!(penalty > 0.0 && penalty < 1.0);
    }

    #[test]
    fn test_regularization_loss_sums_gate_penalties_on_model_device() {
        let device = NdArrayDevice::default();
        let model = small_config().init::<TestBackend>(&device).unwrap();

        let total = model.regularization_loss();
        assert_eq!(total.device(), device);

        let expected = model
            .decoder
            .iter()
            .map(|level| level.attention.l2_penalty().into_scalar())
            .sum::<f32>();
        let diff = (total.into_scalar() - expected).abs();
        assert!(diff <= expected * 1e-5, "regularization differs by {diff}");
    }
}

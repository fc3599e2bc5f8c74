//! Dice coefficient metric.
//!
//! Unlike [`DiceLoss`](crate::losses::DiceLoss), the metric flattens the whole batch
//! into one overlap score, `(2 Σ t·p + s) / (Σ t + Σ p + s)` with `s = 1`.

use burn::{
    prelude::*,
    tensor::{backend::Backend, ElementConversion, Tensor},
    train::metric::{
        state::{FormatOptions, NumericMetricState},
        Metric, MetricEntry, MetricMetadata, Numeric,
    },
};
use std::marker::PhantomData;

use crate::metrics::input::DiceInput;

#[derive(Config, Debug)]
pub struct DiceMetricConfig {
    #[config(default = 1.0)]
    pub smooth: f64,
    /// Binarize predictions at this threshold before scoring.
    #[config(default = "None")]
    pub threshold: Option<f64>,
}

pub struct DiceMetric<B: Backend> {
    state: NumericMetricState,
    smooth: f64,
    threshold: Option<f64>,
    _b: PhantomData<B>,
}

impl DiceMetricConfig {
    pub fn init<B: Backend>(&self) -> DiceMetric<B> {
        DiceMetric {
            state: NumericMetricState::default(),
            smooth: self.smooth,
            threshold: self.threshold,
            _b: PhantomData,
        }
    }
}

impl<B: Backend> Default for DiceMetric<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: Backend> DiceMetric<B> {
    pub fn new() -> Self {
        DiceMetricConfig::new().init()
    }
}

impl<B: Backend> Metric for DiceMetric<B> {
    type Input = DiceInput<B>;

    fn name(&self) -> String {
        "Dice".to_string()
    }

    fn update(&mut self, item: &Self::Input, _metadata: &MetricMetadata) -> MetricEntry {
        let batch_size = item.predictions.dims()[0];
        let dice = calculate_dice(
            item.predictions.clone(),
            item.targets.clone(),
            self.threshold,
            self.smooth,
        );
        self.state.update(
            dice,
            batch_size,
            FormatOptions::new(self.name()).precision(4),
        )
    }

    fn clear(&mut self) {
        self.state.reset();
    }
}

impl<B: Backend> Numeric for DiceMetric<B> {
    fn value(&self) -> f64 {
        self.state.value()
    }
}

/// Calculate the Dice coefficient using a simple function interface.
pub fn calculate_dice<B: Backend>(
    predictions: Tensor<B, 5>,
    targets: Tensor<B, 5>,
    threshold: Option<f64>,
    smooth: f64,
) -> f64 {
    let predictions = match threshold {
        Some(threshold) => predictions.greater_elem(threshold).float(),
        None => predictions,
    };

    let intersection = (predictions.clone() * targets.clone()).sum();
    let total = targets.sum() + predictions.sum();
    let dice = (intersection * 2.0 + smooth) / (total + smooth);

    dice.into_scalar().elem::<f64>()
}

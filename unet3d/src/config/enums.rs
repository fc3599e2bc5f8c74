//! Enumeration types for model configuration.

use std::str::FromStr;

use burn::prelude::*;

use crate::error::UnetError;

/// Final activation applied to the combined segmentation logits.
#[derive(Config, Debug, PartialEq, Eq)]
pub enum Activation {
    /// Element-wise sigmoid: independent per-label probabilities.
    Sigmoid,
    /// Softmax over the channel axis: mutually exclusive labels.
    Softmax,
}

impl Activation {
    /// Canonical lowercase name.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Sigmoid => "sigmoid",
            Self::Softmax => "softmax",
        }
    }
}

impl FromStr for Activation {
    type Err = UnetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sigmoid" => Ok(Self::Sigmoid),
            "softmax" => Ok(Self::Softmax),
            _ => Err(UnetError::UnsupportedActivation {
                name: s.to_string(),
            }),
        }
    }
}

// src/activation.rs

//! Elementwise activation functions applied to layer outputs.
//!
//! The set is closed and chosen at construction time. Each variant provides
//! the forward transform and its derivative expressed in terms of the
//! activated output, which is what backpropagation has on hand.

use serde::{Deserialize, Serialize};

use crate::error::{LearnError, Result};
use crate::ml_utils;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    #[default]
    Sigmoid,
    Tanh,
    Softmax,
    /// Identity, for linear layers.
    Linear,
}

impl Activation {
    /// Applies the activation to a full layer in place.
    pub fn apply(&self, values: &mut [f32]) {
        match self {
            Activation::Sigmoid => {
                for v in values.iter_mut() {
                    *v = sigmoid(*v);
                }
            }
            Activation::Tanh => {
                for v in values.iter_mut() {
                    *v = v.tanh();
                }
            }
            Activation::Softmax => ml_utils::softmax(values),
            Activation::Linear => {}
        }
    }

    /// Local derivative at an already activated output `y`.
    ///
    /// For softmax this is the diagonal term `y(1 - y)`; the output layer
    /// never uses it because cross-entropy cancels it (see
    /// [`Activation::cancels_with_cross_entropy`]).
    #[inline]
    pub fn derivative(&self, y: f32) -> f32 {
        match self {
            Activation::Sigmoid | Activation::Softmax => y * (1.0 - y),
            Activation::Tanh => 1.0 - y * y,
            Activation::Linear => 1.0,
        }
    }

    /// True when the output-layer gradient under the matching loss reduces
    /// to `prediction - target`.
    pub fn cancels_with_cross_entropy(&self) -> bool {
        matches!(self, Activation::Softmax | Activation::Sigmoid | Activation::Linear)
    }

    pub(crate) fn to_code(self) -> u8 {
        match self {
            Activation::Sigmoid => 0,
            Activation::Tanh => 1,
            Activation::Softmax => 2,
            Activation::Linear => 3,
        }
    }

    pub(crate) fn from_code(code: u8) -> Result<Self> {
        match code {
            0 => Ok(Activation::Sigmoid),
            1 => Ok(Activation::Tanh),
            2 => Ok(Activation::Softmax),
            3 => Ok(Activation::Linear),
            other => Err(LearnError::Format(format!("unknown activation code {}", other))),
        }
    }
}

#[inline]
fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sigmoid() {
        let mut v = [0.0, 10.0, -10.0];
        Activation::Sigmoid.apply(&mut v);
        assert!((v[0] - 0.5).abs() < 1e-6);
        assert!(v[1] > 0.99);
        assert!(v[2] < 0.01);
        assert!((Activation::Sigmoid.derivative(0.5) - 0.25).abs() < 1e-6);
    }

    #[test]
    fn test_tanh_derivative() {
        let mut v = [0.0];
        Activation::Tanh.apply(&mut v);
        assert_eq!(v[0], 0.0);
        assert_eq!(Activation::Tanh.derivative(0.0), 1.0);
    }

    #[test]
    fn test_softmax_layer() {
        let mut v = [1.0, 1.0];
        Activation::Softmax.apply(&mut v);
        assert!((v[0] - 0.5).abs() < 1e-6);
        assert!((v[1] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_code_round_trip() {
        for a in [Activation::Sigmoid, Activation::Tanh, Activation::Softmax, Activation::Linear] {
            assert_eq!(Activation::from_code(a.to_code()).unwrap(), a);
        }
        assert!(Activation::from_code(9).is_err());
    }
}

// src/network/thinning.rs

//! Per-instance dropout masks.
//!
//! Layer 0 covers the input units of one instance: the bias, then each active
//! sparse item by position, then the dense inputs. Every later layer covers a
//! hidden layer: the bias, then its units. The output layer is never thinned.
//! Unit 0 of every layer is the bias and is always kept.

use rand::Rng;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThinningMask {
    layers: Vec<Vec<bool>>,
}

impl ThinningMask {
    /// A mask keeping every unit, used for inference.
    pub fn full(shape: &[usize]) -> Self {
        Self {
            layers: shape.iter().map(|&n| vec![true; n]).collect(),
        }
    }

    /// Draws a fresh mask, keeping each non-bias unit of layer `l` with
    /// probability `keep[l]`. Layers without a probability, or with one at or
    /// above 1, are fully kept and consume no draws.
    pub fn sample<R: Rng>(shape: &[usize], keep: &[f32], rng: &mut R) -> Self {
        let layers = shape
            .iter()
            .enumerate()
            .map(|(l, &n)| {
                let p = keep.get(l).copied().unwrap_or(1.0);
                (0..n)
                    .map(|unit| unit == 0 || p >= 1.0 || rng.gen::<f32>() < p)
                    .collect()
            })
            .collect();
        Self { layers }
    }

    /// Builds a mask from explicit flags. Bias units are forced on.
    pub fn from_layers(mut layers: Vec<Vec<bool>>) -> Self {
        for layer in &mut layers {
            if let Some(bias) = layer.first_mut() {
                *bias = true;
            }
        }
        Self { layers }
    }

    #[inline]
    pub fn is_kept(&self, layer: usize, unit: usize) -> bool {
        self.layers[layer][unit]
    }

    pub fn shape(&self) -> Vec<usize> {
        self.layers.iter().map(Vec::len).collect()
    }

    /// Count of thinned units across all layers.
    pub fn thinned(&self) -> usize {
        self.layers.iter().flatten().filter(|kept| !**kept).count()
    }
}

// src/network/mod.rs

//! # Feed-forward network over mixed sparse and dense input
//!
//! A multi-layer perceptron whose first layer reads a sparse feature set
//! through [`SparseWeights`] and a dense feature block through
//! [`DenseWeights`]. Every later connection is dense.
//!
//! ## Layers
//!
//! "Computed layers" are the hidden layers followed by the output layer.
//! Each one sees a bias unit at input index 0 emitting the configured bias
//! value, followed by the previous layer's units. For the first computed
//! layer the bias column lives in the dense matrix, so it is never pruned.
//!
//! ## One training instance
//!
//! 1. [`FeedForwardNetwork::sample_mask`] draws the instance's
//!    [`ThinningMask`].
//! 2. [`FeedForwardNetwork::forward_with_mask`] scores the labels and returns
//!    a [`ForwardPass`] that owns the mask.
//! 3. [`FeedForwardNetwork::backward`] consumes the pass, so the mask used for
//!    the gradients is exactly the one used for the scores.
//! 4. [`Optimizer::apply`] (online) or [`GradientBuffer`] (mini-batch) turns
//!    gradients into `weight += -rate * gradient * input`.
//!
//! Connections with a thinned endpoint receive no contribution forward and
//! no update backward.

mod gradient;
mod thinning;


pub use gradient::{GradientBuffer, GradientEntry, Gradients, Optimizer, UpdateRule};
pub use thinning::ThinningMask;

use log::{debug, trace};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::activation::Activation;
use crate::error::{LearnError, Result};
use crate::feature::FeatureVector;
use crate::ml_utils;
use crate::weights::{DenseWeights, SparseWeights, WeightStore, WeightTarget, WeightVector};

// ============================================================================
// Topology
// ============================================================================

/// One hidden layer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HiddenLayer {
    pub size: usize,
    pub activation: Activation,
}

/// How fresh dense weights are filled.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "type")]
pub enum WeightInit {
    Zero,
    /// Uniform in `[-range, range]`.
    Uniform { range: f32 },
}

impl Default for WeightInit {
    fn default() -> Self {
        WeightInit::Uniform { range: 0.1 }
    }
}

/// Shape and hyperparameters of a network.
#[derive(Debug, Clone, PartialEq)]
pub struct Topology {
    /// Length of the dense part of every feature vector.
    pub dense_dim: usize,
    pub hidden: Vec<HiddenLayer>,
    pub label_size: usize,
    pub output_activation: Activation,
    pub learning_rate: f32,
    /// Value emitted by every bias unit.
    pub bias: f32,
    /// Keep probability for the input layer followed by each hidden layer.
    /// Missing entries mean "keep everything".
    pub keep_probabilities: Vec<f32>,
    pub update_rule: UpdateRule,
}

impl Topology {
    /// Softmax regression: no hidden layers, constant learning rate.
    pub fn softmax_regression(dense_dim: usize, label_size: usize, learning_rate: f32) -> Self {
        Self {
            dense_dim,
            hidden: Vec::new(),
            label_size,
            output_activation: Activation::Softmax,
            learning_rate,
            bias: 1.0,
            keep_probabilities: Vec::new(),
            update_rule: UpdateRule::Constant,
        }
    }

    /// Sizes of the computed layers, output last.
    pub fn layer_sizes(&self) -> Vec<usize> {
        self.hidden
            .iter()
            .map(|h| h.size)
            .chain(std::iter::once(self.label_size))
            .collect()
    }

    fn validate(&self) -> Result<()> {
        if self.label_size == 0 {
            return Err(LearnError::Dimension("output layer has no labels".into()));
        }
        if let Some(i) = self.hidden.iter().position(|h| h.size == 0) {
            return Err(LearnError::Dimension(format!("hidden layer {} has no units", i)));
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(LearnError::Config(format!(
                "learning rate must be positive, got {}",
                self.learning_rate
            )));
        }
        if self.keep_probabilities.len() > self.hidden.len() + 1 {
            return Err(LearnError::Dimension(format!(
                "{} keep probabilities for {} thinnable layers",
                self.keep_probabilities.len(),
                self.hidden.len() + 1
            )));
        }
        if let Some(p) = self
            .keep_probabilities
            .iter()
            .find(|p| !(**p > 0.0 && **p <= 1.0))
        {
            return Err(LearnError::Config(format!(
                "keep probability {} outside (0, 1]",
                p
            )));
        }
        Ok(())
    }
}

// ============================================================================
// Instance and forward state
// ============================================================================

/// One decision step: input, optional gold label, and the scores of the last
/// forward pass.
#[derive(Debug, Clone)]
pub struct Instance {
    pub features: FeatureVector,
    pub gold: Option<usize>,
    pub scores: Vec<f32>,
}

impl Instance {
    pub fn new(features: FeatureVector, gold: Option<usize>) -> Self {
        Self {
            features,
            gold,
            scores: Vec::new(),
        }
    }

    /// Highest scoring label of the last forward pass.
    pub fn predicted(&self) -> usize {
        ml_utils::argmax(&self.scores)
    }
}

/// Activations of one forward pass, kept for the matching backward pass.
#[derive(Debug)]
pub struct ForwardPass<'a> {
    input: &'a FeatureVector,
    mask: ThinningMask,
    /// Activated, masked outputs per computed layer. Output layer last.
    outputs: Vec<Vec<f32>>,
}

impl ForwardPass<'_> {
    pub fn scores(&self) -> &[f32] {
        self.outputs.last().map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn layer_output(&self, layer: usize) -> &[f32] {
        &self.outputs[layer]
    }
}

// ============================================================================
// Network
// ============================================================================

pub struct FeedForwardNetwork {
    topology: Topology,
    optimizer: Optimizer,
    batch: GradientBuffer,
}

impl FeedForwardNetwork {
    /// Validates the topology and builds the network.
    pub fn new(topology: Topology) -> Result<Self> {
        topology.validate()?;
        debug!(
            "Network: dense={} layers={:?} lr={} bias={} keep={:?}",
            topology.dense_dim,
            topology.layer_sizes(),
            topology.learning_rate,
            topology.bias,
            topology.keep_probabilities
        );
        let optimizer = Optimizer::new(topology.update_rule, topology.learning_rate);
        Ok(Self {
            topology,
            optimizer,
            batch: GradientBuffer::default(),
        })
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn label_size(&self) -> usize {
        self.topology.label_size
    }

    /// Allocates a store shaped for this network.
    pub fn new_store<R: Rng>(&self, init: WeightInit, rng: &mut R) -> WeightStore {
        let sizes = self.topology.layer_sizes();
        let mut dense = DenseWeights::zeros(sizes[0], 1 + self.topology.dense_dim);
        let mut layers: Vec<DenseWeights> = sizes
            .windows(2)
            .map(|w| DenseWeights::zeros(w[1], 1 + w[0]))
            .collect();

        if let WeightInit::Uniform { range } = init {
            dense.randomize(range, rng);
            for layer in &mut layers {
                layer.randomize(range, rng);
            }
        }

        WeightStore {
            sparse: SparseWeights::new(),
            dense,
            layers,
        }
    }

    /// Checks that `store` has the shape this network expects.
    pub fn check_store(&self, store: &WeightStore) -> Result<()> {
        let sizes = self.topology.layer_sizes();
        let expect = |name: &str, m: &DenseWeights, outputs: usize, inputs: usize| {
            if m.outputs() != outputs || m.inputs() != inputs {
                Err(LearnError::Dimension(format!(
                    "{} weights are {}x{}, expected {}x{}",
                    name,
                    m.outputs(),
                    m.inputs(),
                    outputs,
                    inputs
                )))
            } else {
                Ok(())
            }
        };

        expect("input", &store.dense, sizes[0], 1 + self.topology.dense_dim)?;
        if store.layers.len() != sizes.len() - 1 {
            return Err(LearnError::Dimension(format!(
                "store has {} layer matrices, expected {}",
                store.layers.len(),
                sizes.len() - 1
            )));
        }
        for (k, w) in sizes.windows(2).enumerate() {
            expect(&format!("layer {}", k), &store.layers[k], w[1], 1 + w[0])?;
        }
        Ok(())
    }

    /// Units per thinnable layer for input `x`, bias included.
    pub fn mask_shape(&self, x: &FeatureVector) -> Vec<usize> {
        std::iter::once(1 + x.sparse().len() + self.topology.dense_dim)
            .chain(self.topology.hidden.iter().map(|h| 1 + h.size))
            .collect()
    }

    /// Draws a fresh thinning mask for one training instance.
    pub fn sample_mask<R: Rng>(&self, x: &FeatureVector, rng: &mut R) -> ThinningMask {
        ThinningMask::sample(&self.mask_shape(x), &self.topology.keep_probabilities, rng)
    }

    /// Inference pass with every unit kept.
    pub fn forward<'a>(&self, store: &WeightStore, x: &'a FeatureVector) -> Result<ForwardPass<'a>> {
        let mask = ThinningMask::full(&self.mask_shape(x));
        self.forward_with_mask(store, x, mask)
    }

    /// Scores `x` under `mask`.
    ///
    /// An input with no sparse or dense features yields all-zero scores.
    pub fn forward_with_mask<'a>(
        &self,
        store: &WeightStore,
        x: &'a FeatureVector,
        mask: ThinningMask,
    ) -> Result<ForwardPass<'a>> {
        let t = &self.topology;
        if x.dense().len() != t.dense_dim {
            return Err(LearnError::Dimension(format!(
                "dense input has {} values, network expects {}",
                x.dense().len(),
                t.dense_dim
            )));
        }
        if mask.shape() != self.mask_shape(x) {
            return Err(LearnError::Dimension(format!(
                "thinning mask shape {:?} does not match {:?}",
                mask.shape(),
                self.mask_shape(x)
            )));
        }

        let sizes = t.layer_sizes();
        if x.is_empty() {
            let outputs = sizes.iter().map(|&n| vec![0.0; n]).collect();
            return Ok(ForwardPass {
                input: x,
                mask,
                outputs,
            });
        }

        let last = sizes.len() - 1;
        let n_sparse = x.sparse().len();
        let mut outputs: Vec<Vec<f32>> = Vec::with_capacity(sizes.len());

        // First computed layer: bias + sparse + dense.
        let mut pre = vec![0.0f32; sizes[0]];
        for (y, sum) in pre.iter_mut().enumerate() {
            *sum = t.bias * store.dense.weight(y, 0);
            for (p, item) in x.sparse().iter().enumerate() {
                if mask.is_kept(0, 1 + p) {
                    *sum += item.value * store.sparse.weight(y, item.index);
                }
            }
            for (xi, &v) in x.dense().iter().enumerate() {
                if mask.is_kept(0, 1 + n_sparse + xi) {
                    *sum += v * store.dense.weight(y, 1 + xi);
                }
            }
        }
        self.activate(0, &mut pre, &mask);
        outputs.push(pre);

        for k in 1..=last {
            let input = &outputs[k - 1];
            let weights = &store.layers[k - 1];
            let mut pre = vec![0.0f32; sizes[k]];
            for (y, sum) in pre.iter_mut().enumerate() {
                let row = weights.row(y);
                *sum = t.bias * row[0];
                for (j, &v) in input.iter().enumerate() {
                    *sum += v * row[1 + j];
                }
            }
            self.activate(k, &mut pre, &mask);
            outputs.push(pre);
        }

        trace!("Forward scores: {:?}", outputs[last]);
        Ok(ForwardPass {
            input: x,
            mask,
            outputs,
        })
    }

    /// Applies layer `k`'s activation, then zeroes thinned hidden units.
    fn activate(&self, k: usize, values: &mut [f32], mask: &ThinningMask) {
        self.activation(k).apply(values);
        if k < self.topology.hidden.len() {
            for (y, v) in values.iter_mut().enumerate() {
                if !mask.is_kept(k + 1, 1 + y) {
                    *v = 0.0;
                }
            }
        }
    }

    fn activation(&self, k: usize) -> Activation {
        self.topology
            .hidden
            .get(k)
            .map_or(self.topology.output_activation, |h| h.activation)
    }

    /// True if unit `y` of computed layer `k` takes part in this pass.
    fn output_kept(&self, mask: &ThinningMask, k: usize, y: usize) -> bool {
        k >= self.topology.hidden.len() || mask.is_kept(k + 1, 1 + y)
    }

    /// Computes the loss gradients of `pass` against `gold`.
    ///
    /// Consumes the pass: its thinning mask cannot be reused by another
    /// instance or regenerated for this one.
    pub fn backward(&self, store: &WeightStore, pass: ForwardPass<'_>, gold: usize) -> Result<Gradients> {
        let t = &self.topology;
        if gold >= t.label_size {
            return Err(LearnError::Dimension(format!(
                "gold label {} outside {} labels",
                gold, t.label_size
            )));
        }

        let mut gradients = Gradients::default();
        let ForwardPass {
            input: x,
            mask,
            outputs,
        } = pass;
        if x.is_empty() {
            return Ok(gradients);
        }

        let last = outputs.len() - 1;
        let out_act = t.output_activation;
        let mut delta: Vec<f32> = outputs[last]
            .iter()
            .enumerate()
            .map(|(y, &p)| {
                let target = if y == gold { 1.0 } else { 0.0 };
                if out_act.cancels_with_cross_entropy() {
                    p - target
                } else {
                    (p - target) * out_act.derivative(p)
                }
            })
            .collect();

        for k in (1..=last).rev() {
            let input = &outputs[k - 1];
            let weights = &store.layers[k - 1];
            let mut errors = vec![0.0f32; input.len()];

            for (y, &g) in delta.iter().enumerate() {
                if !self.output_kept(&mask, k, y) {
                    continue;
                }
                let row = weights.row(y);
                gradients.push(WeightTarget::Layer(k - 1), y, 0, g * t.bias);
                for (j, &v) in input.iter().enumerate() {
                    if mask.is_kept(k, 1 + j) {
                        errors[j] += g * row[1 + j];
                        gradients.push(WeightTarget::Layer(k - 1), y, 1 + j, g * v);
                    }
                }
            }

            let act = self.activation(k - 1);
            delta = errors
                .iter()
                .zip(input)
                .enumerate()
                .map(|(j, (&e, &out))| {
                    if mask.is_kept(k, 1 + j) {
                        e * act.derivative(out)
                    } else {
                        0.0
                    }
                })
                .collect();
        }

        let n_sparse = x.sparse().len();
        for (y, &g) in delta.iter().enumerate() {
            if !self.output_kept(&mask, 0, y) {
                continue;
            }
            gradients.push(WeightTarget::Dense, y, 0, g * t.bias);
            for (p, item) in x.sparse().iter().enumerate() {
                if mask.is_kept(0, 1 + p) {
                    gradients.push(WeightTarget::Sparse, y, item.index, g * item.value);
                }
            }
            for (xi, &v) in x.dense().iter().enumerate() {
                if mask.is_kept(0, 1 + n_sparse + xi) {
                    gradients.push(WeightTarget::Dense, y, 1 + xi, g * v);
                }
            }
        }

        Ok(gradients)
    }

    /// Applies gradients immediately.
    pub fn update(&mut self, store: &mut WeightStore, gradients: &Gradients) {
        self.optimizer.apply(store, gradients);
    }

    /// Scores an instance without thinning and stores the scores on it.
    pub fn predict(&self, store: &WeightStore, instance: &mut Instance) -> Result<usize> {
        let pass = self.forward(store, &instance.features)?;
        instance.scores = pass.scores().to_vec();
        Ok(instance.predicted())
    }

    /// Forward and backward for one instance with a fresh thinning mask.
    ///
    /// The scores are stored on the instance; instances without a gold label
    /// produce no gradients.
    pub fn gradients<R: Rng>(
        &self,
        store: &WeightStore,
        instance: &mut Instance,
        rng: &mut R,
    ) -> Result<Gradients> {
        let mask = self.sample_mask(&instance.features, rng);
        let pass = self.forward_with_mask(store, &instance.features, mask)?;
        instance.scores = pass.scores().to_vec();
        match instance.gold {
            Some(gold) => self.backward(store, pass, gold),
            None => Ok(Gradients::default()),
        }
    }

    /// Fully online step: gradients are applied to the store immediately.
    pub fn train<R: Rng>(&mut self, store: &mut WeightStore, instance: &mut Instance, rng: &mut R) -> Result<()> {
        let gradients = self.gradients(store, instance, rng)?;
        self.update(store, &gradients);
        Ok(())
    }

    /// Mini-batch step: gradients are buffered until
    /// [`FeedForwardNetwork::update_mini_batch`].
    pub fn accumulate<R: Rng>(&mut self, store: &WeightStore, instance: &mut Instance, rng: &mut R) -> Result<()> {
        let gradients = self.gradients(store, instance, rng)?;
        self.batch.accumulate(&gradients);
        Ok(())
    }

    /// Number of instances buffered since the last flush.
    pub fn pending(&self) -> usize {
        self.batch.instances()
    }

    /// Applies the batch-averaged gradients buffered since the last flush.
    pub fn update_mini_batch(&mut self, store: &mut WeightStore) {
        if self.batch.is_empty() {
            return;
        }
        trace!("Flushing mini-batch of {}", self.batch.instances());
        let gradients = self.batch.drain();
        self.optimizer.apply(store, &gradients);
    }
}

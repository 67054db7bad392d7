// src/weights.rs

//! Weight storage for the network.
//!
//! Two layouts share the [`WeightVector`] contract:
//!
//! - [`SparseWeights`]: slots allocated lazily on first write, keyed by
//!   `(output unit, input unit)`. Used for the large categorical input space.
//! - [`DenseWeights`]: `outputs x inputs` slots, row-major, allocated up front.
//!
//! A slot returned for a key stays bound to that key until pruning removes
//! it; no two keys share a live slot. The store has a single writer at a
//! time: mini-batch training accumulates gradients separately and flushes them
//! through one `&mut WeightStore`.

use std::collections::{HashMap, HashSet};

use rand::Rng;

/// Addressing and update contract shared by sparse and dense storage.
pub trait WeightVector {
    /// Slot bound to `(output, input)`, or `None` when nothing is stored there.
    fn index_of(&self, output: usize, input: usize) -> Option<usize>;

    /// Slot bound to `(output, input)`, allocating it if absent.
    fn slot(&mut self, output: usize, input: usize) -> usize;

    /// Value held in `slot`. Released slots read as zero.
    fn get(&self, slot: usize) -> f32;

    fn add(&mut self, slot: usize, delta: f32);

    /// Drops the `rate` fraction of smallest-magnitude weights, returning how
    /// many were removed.
    fn reduce(&mut self, rate: f32) -> usize;

    /// Number of live slots.
    fn active_count(&self) -> usize;

    fn weight(&self, output: usize, input: usize) -> f32 {
        self.index_of(output, input).map_or(0.0, |slot| self.get(slot))
    }

    fn add_at(&mut self, output: usize, input: usize, delta: f32) {
        let slot = self.slot(output, input);
        self.add(slot, delta);
    }
}

// ============================================================================
// Dense
// ============================================================================

/// Row-major `outputs x inputs` matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct DenseWeights {
    outputs: usize,
    inputs: usize,
    values: Vec<f32>,
}

impl DenseWeights {
    pub fn zeros(outputs: usize, inputs: usize) -> Self {
        Self {
            outputs,
            inputs,
            values: vec![0.0; outputs * inputs],
        }
    }

    pub fn from_values(outputs: usize, inputs: usize, values: Vec<f32>) -> Option<Self> {
        (values.len() == outputs * inputs).then_some(Self {
            outputs,
            inputs,
            values,
        })
    }

    /// Fills every slot uniformly from `[-range, range]`.
    pub fn randomize<R: Rng>(&mut self, range: f32, rng: &mut R) {
        if range <= 0.0 {
            return;
        }
        for v in &mut self.values {
            *v = rng.gen_range(-range..=range);
        }
    }

    pub fn outputs(&self) -> usize {
        self.outputs
    }

    pub fn inputs(&self) -> usize {
        self.inputs
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    pub fn row(&self, output: usize) -> &[f32] {
        &self.values[output * self.inputs..(output + 1) * self.inputs]
    }

    pub fn set(&mut self, output: usize, input: usize, value: f32) {
        let slot = output * self.inputs + input;
        self.values[slot] = value;
    }
}

impl WeightVector for DenseWeights {
    fn index_of(&self, output: usize, input: usize) -> Option<usize> {
        (output < self.outputs && input < self.inputs).then(|| output * self.inputs + input)
    }

    fn slot(&mut self, output: usize, input: usize) -> usize {
        debug_assert!(output < self.outputs && input < self.inputs);
        output * self.inputs + input
    }

    fn get(&self, slot: usize) -> f32 {
        self.values[slot]
    }

    fn add(&mut self, slot: usize, delta: f32) {
        self.values[slot] += delta;
    }

    /// Dense inputs are continuous and are not pruned.
    fn reduce(&mut self, _rate: f32) -> usize {
        0
    }

    fn active_count(&self) -> usize {
        self.values.len()
    }
}

// ============================================================================
// Sparse
// ============================================================================

/// Lazily allocated `(output, input) -> value` storage.
#[derive(Debug, Clone, Default)]
pub struct SparseWeights {
    slots: HashMap<(usize, usize), usize>,
    keys: Vec<Option<(usize, usize)>>,
    values: Vec<f32>,
    free: Vec<usize>,
}

impl SparseWeights {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keeps the `keep` largest-magnitude weights and releases the rest.
    ///
    /// Ties in magnitude are broken by key so pruning is deterministic.
    /// Returns how many slots were released.
    pub fn retain_largest(&mut self, keep: usize) -> usize {
        let live = self.slots.len();
        if keep >= live {
            return 0;
        }

        let mut ranked: Vec<((usize, usize), usize)> =
            self.slots.iter().map(|(&key, &slot)| (key, slot)).collect();
        ranked.sort_by(|(ka, sa), (kb, sb)| {
            self.values[*sa]
                .abs()
                .total_cmp(&self.values[*sb].abs())
                .then(ka.cmp(kb))
        });

        let drop = live - keep;
        for &(key, slot) in &ranked[..drop] {
            self.slots.remove(&key);
            self.keys[slot] = None;
            self.values[slot] = 0.0;
            self.free.push(slot);
        }

        drop
    }

    /// Number of distinct input units with at least one live weight.
    pub fn feature_count(&self) -> usize {
        self.slots
            .keys()
            .map(|&(_, input)| input)
            .collect::<HashSet<_>>()
            .len()
    }

    /// Live slots holding a non-zero value.
    pub fn nonzero_count(&self) -> usize {
        self.slots.values().filter(|&&s| self.values[s] != 0.0).count()
    }

    /// Live `(output, input, value)` triples ordered by key.
    pub fn entries(&self) -> Vec<(usize, usize, f32)> {
        let mut entries: Vec<(usize, usize, f32)> = self
            .slots
            .iter()
            .map(|(&(o, i), &slot)| (o, i, self.values[slot]))
            .collect();
        entries.sort_by_key(|&(o, i, _)| (o, i));
        entries
    }
}

impl WeightVector for SparseWeights {
    fn index_of(&self, output: usize, input: usize) -> Option<usize> {
        self.slots.get(&(output, input)).copied()
    }

    fn slot(&mut self, output: usize, input: usize) -> usize {
        if let Some(&slot) = self.slots.get(&(output, input)) {
            return slot;
        }

        let slot = match self.free.pop() {
            Some(slot) => {
                self.keys[slot] = Some((output, input));
                self.values[slot] = 0.0;
                slot
            }
            None => {
                self.keys.push(Some((output, input)));
                self.values.push(0.0);
                self.values.len() - 1
            }
        };
        self.slots.insert((output, input), slot);
        slot
    }

    fn get(&self, slot: usize) -> f32 {
        match self.keys.get(slot) {
            Some(Some(_)) => self.values[slot],
            _ => 0.0,
        }
    }

    fn add(&mut self, slot: usize, delta: f32) {
        if let Some(Some(_)) = self.keys.get(slot) {
            self.values[slot] += delta;
        }
    }

    fn reduce(&mut self, rate: f32) -> usize {
        let live = self.slots.len();
        let rate = rate.clamp(0.0, 1.0);
        let drop = (live as f32 * rate).floor() as usize;
        self.retain_largest(live - drop.min(live))
    }

    fn active_count(&self) -> usize {
        self.slots.len()
    }
}

// ============================================================================
// Store
// ============================================================================

/// Which weight matrix a gradient entry addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum WeightTarget {
    /// Sparse input features into the first computed layer.
    Sparse,
    /// Bias column plus dense input features into the first computed layer.
    Dense,
    /// Connection from computed layer `k` into computed layer `k + 1`.
    Layer(usize),
}

/// Every weight of one network, owned in one place.
///
/// The network reads from and writes to it through explicit references; the
/// reducer prunes its sparse part between runs.
#[derive(Debug, Clone)]
pub struct WeightStore {
    pub sparse: SparseWeights,
    pub dense: DenseWeights,
    pub layers: Vec<DenseWeights>,
}

impl WeightStore {
    pub fn vector(&self, target: WeightTarget) -> &dyn WeightVector {
        match target {
            WeightTarget::Sparse => &self.sparse,
            WeightTarget::Dense => &self.dense,
            WeightTarget::Layer(k) => &self.layers[k],
        }
    }

    pub fn vector_mut(&mut self, target: WeightTarget) -> &mut dyn WeightVector {
        match target {
            WeightTarget::Sparse => &mut self.sparse,
            WeightTarget::Dense => &mut self.dense,
            WeightTarget::Layer(k) => &mut self.layers[k],
        }
    }

    /// Prunes the sparse part only; dense matrices are never reduced.
    pub fn reduce(&mut self, rate: f32) -> usize {
        self.sparse.reduce(rate)
    }
}

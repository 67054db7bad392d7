// src/network/gradient.rs

//! Gradient records produced by backpropagation and the rules that turn
//! them into weight updates.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::weights::{WeightStore, WeightTarget};

/// One loss gradient for the weight at `(output, input)` of `target`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GradientEntry {
    pub target: WeightTarget,
    pub output: usize,
    pub input: usize,
    pub gradient: f32,
}

/// Gradients of one instance, not yet applied.
#[derive(Debug, Clone, Default)]
pub struct Gradients {
    entries: Vec<GradientEntry>,
}

impl Gradients {
    pub fn push(&mut self, target: WeightTarget, output: usize, input: usize, gradient: f32) {
        if gradient != 0.0 {
            self.entries.push(GradientEntry {
                target,
                output,
                input,
                gradient,
            });
        }
    }

    pub fn entries(&self) -> &[GradientEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Sums gradients across a mini-batch until they are flushed.
#[derive(Debug, Clone, Default)]
pub struct GradientBuffer {
    sums: HashMap<(WeightTarget, usize, usize), f32>,
    instances: usize,
}

impl GradientBuffer {
    pub fn accumulate(&mut self, gradients: &Gradients) {
        for e in gradients.entries() {
            *self.sums.entry((e.target, e.output, e.input)).or_insert(0.0) += e.gradient;
        }
        self.instances += 1;
    }

    pub fn instances(&self) -> usize {
        self.instances
    }

    pub fn is_empty(&self) -> bool {
        self.instances == 0
    }

    /// Drains the buffer into batch-averaged gradients in key order.
    pub fn drain(&mut self) -> Gradients {
        let scale = 1.0 / self.instances.max(1) as f32;
        let mut keys: Vec<_> = self.sums.drain().collect();
        keys.sort_by(|a, b| a.0.cmp(&b.0));

        let mut out = Gradients::default();
        for ((target, output, input), sum) in keys {
            out.push(target, output, input, sum * scale);
        }
        self.instances = 0;
        out
    }
}

/// Per-slot learning rate policy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase", tag = "type")]
pub enum UpdateRule {
    /// Every slot uses the base learning rate.
    #[default]
    Constant,
    /// Base rate divided by the root of the slot's accumulated squared
    /// gradients.
    AdaGrad { epsilon: f32 },
}

/// Applies gradients to a store under an [`UpdateRule`], tracking any
/// per-slot state the rule needs.
#[derive(Debug, Clone)]
pub struct Optimizer {
    pub rule: UpdateRule,
    pub learning_rate: f32,
    /// Squared-gradient sums keyed by weight coordinates, not storage slot,
    /// since pruning recycles sparse slots.
    diagonals: HashMap<(WeightTarget, usize, usize), f32>,
}

impl Optimizer {
    pub fn new(rule: UpdateRule, learning_rate: f32) -> Self {
        Self {
            rule,
            learning_rate,
            diagonals: HashMap::new(),
        }
    }

    /// Learning rate for the weight at `(output, input)` of `target` given
    /// the gradient about to be applied there.
    pub fn learning_rate(&mut self, target: WeightTarget, output: usize, input: usize, gradient: f32) -> f32 {
        match self.rule {
            UpdateRule::Constant => self.learning_rate,
            UpdateRule::AdaGrad { epsilon } => {
                let sum = self.diagonals.entry((target, output, input)).or_insert(0.0);
                *sum += gradient * gradient;
                self.learning_rate / (sum.sqrt() + epsilon)
            }
        }
    }

    /// `weight += -rate * gradient` for every entry.
    pub fn apply(&mut self, store: &mut WeightStore, gradients: &Gradients) {
        for e in gradients.entries() {
            let rate = self.learning_rate(e.target, e.output, e.input, e.gradient);
            let weights = store.vector_mut(e.target);
            let slot = weights.slot(e.output, e.input);
            weights.add(slot, -rate * e.gradient);
        }
    }
}

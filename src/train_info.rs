// src/train_info.rs

//! Roll-in schedule for training sequential decisions.
//!
//! At every decision step the consumer asks [`TrainInfo::choose_gold`]
//! whether to advance its state with the gold action or with the network's
//! own top prediction, then calls [`TrainInfo::update_roll_in_probability`]
//! once the step is done.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub const DEFAULT_SEED: u64 = 9;

#[derive(Debug, Clone)]
pub struct TrainInfo {
    batch_size: usize,
    roll_in_initial: f32,
    roll_in_current: f32,
    rng: StdRng,
}

impl TrainInfo {
    pub fn new(batch_size: usize, roll_in_probability: f32) -> Self {
        Self::with_seed(batch_size, roll_in_probability, DEFAULT_SEED)
    }

    pub fn with_seed(batch_size: usize, roll_in_probability: f32, seed: u64) -> Self {
        Self {
            batch_size,
            roll_in_initial: roll_in_probability,
            roll_in_current: roll_in_probability,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn roll_in_probability(&self) -> f32 {
        self.roll_in_current
    }

    /// Resets both the initial and the current probability.
    pub fn set_roll_in_probability(&mut self, probability: f32) {
        self.roll_in_initial = probability;
        self.roll_in_current = probability;
    }

    /// Decays the schedule once per completed step: `current *= initial`.
    ///
    /// The factor is the initial probability itself, so any value below 1
    /// collapses towards 0 within a handful of steps, and 1 stays at 1.
    pub fn update_roll_in_probability(&mut self) {
        self.roll_in_current *= self.roll_in_initial;
    }

    /// True to follow the gold action for this step.
    ///
    /// Deterministic at the bounds; draws from the owned generator only when
    /// the probability is strictly between 0 and 1.
    pub fn choose_gold(&mut self) -> bool {
        if self.roll_in_current <= 0.0 {
            false
        } else if self.roll_in_current >= 1.0 {
            true
        } else {
            (self.roll_in_current as f64) > self.rng.gen::<f64>()
        }
    }
}

// src/config.rs

//! Configuration for training and reduction runs.
//!
//! Deserialized from a JSON document. Every section has defaults, so a file
//! only needs the fields it changes:
//!
//! ```json
//! {
//!   "network": { "hidden": [{ "size": 64, "activation": "tanh" }], "learning_rate": 0.02 },
//!   "train": { "epochs": 5, "roll_in": 0.95 },
//!   "reader": { "fields": { "form": 1, "tag": 3 } }
//! }
//! ```

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::activation::Activation;
use crate::error::{LearnError, Result};
use crate::network::{HiddenLayer, Topology, UpdateRule, WeightInit};

// --- Top-Level Configuration Structure ---

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub network: NetworkConfig,
    pub train: TrainConfig,
    pub reader: ReaderConfig,
}

impl Config {
    pub fn from_json(text: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn validate(&self) -> Result<()> {
        if self.train.batch_size == 0 {
            return Err(LearnError::Config("batch_size must be at least 1".into()));
        }
        if !(0.0..=1.0).contains(&self.train.roll_in) {
            return Err(LearnError::Config(format!(
                "roll_in {} outside [0, 1]",
                self.train.roll_in
            )));
        }
        for field in [FIELD_FORM, FIELD_TAG] {
            if !self.reader.fields.contains_key(field) {
                return Err(LearnError::Config(format!(
                    "reader field map lacks '{}'",
                    field
                )));
            }
        }
        Ok(())
    }
}

// --- Network ---

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Hidden layers, input side first. Empty means softmax regression.
    pub hidden: Vec<HiddenLayer>,
    pub output_activation: Activation,
    pub learning_rate: f32,
    /// Value emitted by the bias unit of every layer.
    pub bias: f32,
    /// Keep probability for the input layer, then each hidden layer.
    pub keep_probabilities: Vec<f32>,
    pub update_rule: UpdateRule,
    pub init: WeightInit,
    /// Seed for weight initialisation and thinning masks.
    pub seed: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        NetworkConfig {
            hidden: Vec::new(),
            output_activation: Activation::Softmax,
            learning_rate: 0.01,
            bias: 1.0,
            keep_probabilities: Vec::new(),
            update_rule: UpdateRule::Constant,
            init: WeightInit::default(),
            seed: 5,
        }
    }
}

impl NetworkConfig {
    pub fn topology(&self, dense_dim: usize, label_size: usize) -> Topology {
        Topology {
            dense_dim,
            hidden: self.hidden.clone(),
            label_size,
            output_activation: self.output_activation,
            learning_rate: self.learning_rate,
            bias: self.bias,
            keep_probabilities: self.keep_probabilities.clone(),
            update_rule: self.update_rule,
        }
    }
}

// --- Training ---

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainConfig {
    pub epochs: usize,
    /// Instances per weight flush. 1 updates after every instance.
    pub batch_size: usize,
    /// Initial roll-in probability.
    pub roll_in: f32,
    /// Seed for roll-in decisions.
    pub seed: u64,
}

impl Default for TrainConfig {
    fn default() -> Self {
        TrainConfig {
            epochs: 5,
            batch_size: 1,
            roll_in: 1.0,
            seed: crate::train_info::DEFAULT_SEED,
        }
    }
}

// --- Reader ---

pub const FIELD_FORM: &str = "form";
pub const FIELD_TAG: &str = "tag";

/// Which TSV column holds which token field.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderConfig {
    pub fields: HashMap<String, usize>,
    /// Treat each file as one document instead of a stream of sentences.
    pub document_based: bool,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        ReaderConfig {
            fields: HashMap::from([(FIELD_FORM.to_string(), 1), (FIELD_TAG.to_string(), 3)]),
            document_based: false,
        }
    }
}

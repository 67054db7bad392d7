// src/model.rs

//! # Trained model artifact
//!
//! A [`Model`] bundles the network, its weight store and the label and
//! feature index tables. It is persisted in a versioned little-endian layout:
//!
//! ```text
//! header    magic u32 | version u32
//! topology  dense_dim u32 | label_size u32 | hidden u32 x (size u32, act u8)
//!           output act u8 | learning_rate f32 | bias f32
//!           keep u32 x f32 | update rule u8 | epsilon f32
//! weights   sparse u64 x (output u32, input u32, value f32)
//!           dense matrix | layers u32 x matrix
//!           (matrix = outputs u32 | inputs u32 | values f32...)
//! tables    labels u32 x string | features u64 x string
//!           (string = len u32 | utf-8 bytes)
//! ```
//!
//! Per-slot optimizer state is not persisted; a loaded model resumes
//! training with fresh AdaGrad accumulators.

use std::path::Path;

use log::info;
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::activation::Activation;
use crate::config::NetworkConfig;
use crate::error::{LearnError, Result};
use crate::feature::{FeatureMap, LabelMap};
use crate::network::{FeedForwardNetwork, HiddenLayer, Instance, Topology, UpdateRule};
use crate::weights::{DenseWeights, SparseWeights, WeightStore, WeightVector};

/// Magic number for model files.
pub const MODEL_MAGIC: u32 = 0x4E4C_504F; // "NLPO"

/// Current model format version.
pub const MODEL_VERSION: u32 = 1;

pub struct Model {
    pub network: FeedForwardNetwork,
    pub weights: WeightStore,
    pub labels: LabelMap,
    pub features: FeatureMap,
}

impl Model {
    /// Builds an untrained model with freshly initialised dense weights.
    pub fn new(config: &NetworkConfig, dense_dim: usize, labels: LabelMap, features: FeatureMap) -> Result<Self> {
        let network = FeedForwardNetwork::new(config.topology(dense_dim, labels.len()))?;
        let mut rng = StdRng::seed_from_u64(config.seed);
        let weights = network.new_store(config.init, &mut rng);
        Ok(Self {
            network,
            weights,
            labels,
            features,
        })
    }

    /// Scores an instance and returns the predicted label index.
    pub fn predict(&self, instance: &mut Instance) -> Result<usize> {
        self.network.predict(&self.weights, instance)
    }

    pub fn label_count(&self) -> usize {
        self.labels.len()
    }

    /// Distinct sparse features that still carry at least one weight.
    pub fn sparse_feature_count(&self) -> usize {
        self.weights.sparse.feature_count()
    }

    /// Live sparse weight slots.
    pub fn sparse_weight_count(&self) -> usize {
        self.weights.sparse.active_count()
    }

    // ------------------------------------------------------------------------
    // Persistence
    // ------------------------------------------------------------------------

    /// Serializes the model. Fails if a size or index does not fit the
    /// format's 32-bit fields.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        put_u32(&mut out, MODEL_MAGIC);
        put_u32(&mut out, MODEL_VERSION);

        let t = self.network.topology();
        put_len(&mut out, t.dense_dim, "dense dimension")?;
        put_len(&mut out, t.label_size, "label count")?;
        put_len(&mut out, t.hidden.len(), "hidden layer count")?;
        for h in &t.hidden {
            put_len(&mut out, h.size, "hidden layer size")?;
            out.push(h.activation.to_code());
        }
        out.push(t.output_activation.to_code());
        put_f32(&mut out, t.learning_rate);
        put_f32(&mut out, t.bias);
        put_len(&mut out, t.keep_probabilities.len(), "keep probability count")?;
        for &p in &t.keep_probabilities {
            put_f32(&mut out, p);
        }
        match t.update_rule {
            UpdateRule::Constant => {
                out.push(0);
                put_f32(&mut out, 0.0);
            }
            UpdateRule::AdaGrad { epsilon } => {
                out.push(1);
                put_f32(&mut out, epsilon);
            }
        }

        let entries = self.weights.sparse.entries();
        out.extend_from_slice(&(entries.len() as u64).to_le_bytes());
        for (o, i, v) in entries {
            put_len(&mut out, o, "sparse output index")?;
            put_len(&mut out, i, "sparse input index")?;
            put_f32(&mut out, v);
        }
        put_matrix(&mut out, &self.weights.dense)?;
        put_len(&mut out, self.weights.layers.len(), "layer count")?;
        for layer in &self.weights.layers {
            put_matrix(&mut out, layer)?;
        }

        put_len(&mut out, self.labels.len(), "label count")?;
        for name in self.labels.names() {
            put_str(&mut out, name)?;
        }
        out.extend_from_slice(&(self.features.len() as u64).to_le_bytes());
        for name in self.features.names() {
            put_str(&mut out, name)?;
        }

        Ok(out)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut r = ByteReader::new(bytes);
        if r.u32()? != MODEL_MAGIC {
            return Err(LearnError::Format("invalid model magic number".into()));
        }
        let version = r.u32()?;
        if version != MODEL_VERSION {
            return Err(LearnError::Format(format!(
                "unsupported model version: {}",
                version
            )));
        }

        let dense_dim = r.u32()? as usize;
        let label_size = r.u32()? as usize;
        let hidden_count = r.u32()? as usize;
        let mut hidden = Vec::new();
        for _ in 0..hidden_count {
            let size = r.u32()? as usize;
            let activation = Activation::from_code(r.u8()?)?;
            hidden.push(HiddenLayer { size, activation });
        }
        let output_activation = Activation::from_code(r.u8()?)?;
        let learning_rate = r.f32()?;
        let bias = r.f32()?;
        let keep_count = r.u32()? as usize;
        let keep_probabilities = (0..keep_count).map(|_| r.f32()).collect::<Result<Vec<_>>>()?;
        let update_rule = match (r.u8()?, r.f32()?) {
            (0, _) => UpdateRule::Constant,
            (1, epsilon) => UpdateRule::AdaGrad { epsilon },
            (code, _) => {
                return Err(LearnError::Format(format!("unknown update rule {}", code)))
            }
        };

        let network = FeedForwardNetwork::new(Topology {
            dense_dim,
            hidden,
            label_size,
            output_activation,
            learning_rate,
            bias,
            keep_probabilities,
            update_rule,
        })?;

        let sparse_count = r.u64()? as usize;
        let mut sparse = SparseWeights::new();
        for _ in 0..sparse_count {
            let o = r.u32()? as usize;
            let i = r.u32()? as usize;
            let v = r.f32()?;
            sparse.add_at(o, i, v);
        }
        let dense = r.matrix()?;
        let layer_count = r.u32()? as usize;
        let layers = (0..layer_count).map(|_| r.matrix()).collect::<Result<Vec<_>>>()?;
        let weights = WeightStore {
            sparse,
            dense,
            layers,
        };
        network.check_store(&weights)?;

        let label_count = r.u32()? as usize;
        let labels = LabelMap::from_names((0..label_count).map(|_| r.string()).collect::<Result<_>>()?)?;
        if labels.len() != label_size {
            return Err(LearnError::Dimension(format!(
                "{} labels for an output layer of {}",
                labels.len(),
                label_size
            )));
        }
        let feature_count = r.u64()? as usize;
        let features = FeatureMap::from_names((0..feature_count).map(|_| r.string()).collect::<Result<_>>()?)?;

        if !r.is_done() {
            return Err(LearnError::Format("trailing bytes after model".into()));
        }

        Ok(Self {
            network,
            weights,
            labels,
            features,
        })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let bytes = self.to_bytes()?;
        std::fs::write(path, &bytes)?;
        info!(
            "Saved model to {} ({} bytes, {} sparse weights)",
            path.display(),
            bytes.len(),
            self.sparse_weight_count()
        );
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        let model = Self::from_bytes(&bytes)?;
        info!(
            "Loaded model from {}: {} labels, {} features, {} sparse weights",
            path.display(),
            model.label_count(),
            model.features.len(),
            model.sparse_weight_count()
        );
        Ok(model)
    }
}

// ============================================================================
// Byte helpers
// ============================================================================

fn put_u32(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_le_bytes());
}

fn put_f32(out: &mut Vec<u8>, v: f32) {
    out.extend_from_slice(&v.to_le_bytes());
}

fn put_len(out: &mut Vec<u8>, v: usize, what: &str) -> Result<()> {
    let v = u32::try_from(v)
        .map_err(|_| LearnError::Format(format!("{} {} exceeds the model format limit", what, v)))?;
    put_u32(out, v);
    Ok(())
}

fn put_str(out: &mut Vec<u8>, s: &str) -> Result<()> {
    put_len(out, s.len(), "string length")?;
    out.extend_from_slice(s.as_bytes());
    Ok(())
}

fn put_matrix(out: &mut Vec<u8>, m: &DenseWeights) -> Result<()> {
    put_len(out, m.outputs(), "matrix rows")?;
    put_len(out, m.inputs(), "matrix columns")?;
    for &v in m.values() {
        put_f32(out, v);
    }
    Ok(())
}

struct ByteReader<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> ByteReader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, offset: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self.offset.checked_add(n).filter(|&end| end <= self.bytes.len());
        match end {
            Some(end) => {
                let slice = &self.bytes[self.offset..end];
                self.offset = end;
                Ok(slice)
            }
            None => Err(LearnError::Format(format!(
                "model truncated at byte {}",
                self.offset
            ))),
        }
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut buf = [0u8; N];
        buf.copy_from_slice(self.take(N)?);
        Ok(buf)
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    fn u64(&mut self) -> Result<u64> {
        Ok(u64::from_le_bytes(self.array()?))
    }

    fn f32(&mut self) -> Result<f32> {
        Ok(f32::from_le_bytes(self.array()?))
    }

    fn string(&mut self) -> Result<String> {
        let len = self.u32()? as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|e| LearnError::Format(format!("invalid utf-8 in model: {}", e)))
    }

    fn matrix(&mut self) -> Result<DenseWeights> {
        let outputs = self.u32()? as usize;
        let inputs = self.u32()? as usize;
        let len = outputs
            .checked_mul(inputs)
            .ok_or_else(|| LearnError::Format(format!("matrix {}x{} too large", outputs, inputs)))?;
        let values = (0..len).map(|_| self.f32()).collect::<Result<Vec<_>>>()?;
        DenseWeights::from_values(outputs, inputs, values)
            .ok_or_else(|| LearnError::Format("matrix size mismatch".into()))
    }

    fn is_done(&self) -> bool {
        self.offset == self.bytes.len()
    }
}

// src/feature.rs

//! Feature vectors fed into the network, and the string-to-index tables for
//! sparse features and labels.

use std::collections::HashMap;

use crate::error::{LearnError, Result};

/// One active sparse feature.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SparseItem {
    pub index: usize,
    pub value: f32,
}

impl SparseItem {
    pub fn new(index: usize, value: f32) -> Self {
        Self { index, value }
    }
}

/// Mixed sparse and dense input for one decision step.
///
/// The sparse part is kept sorted by index with no duplicates. The vector is
/// immutable once built.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureVector {
    sparse: Vec<SparseItem>,
    dense: Vec<f32>,
}

impl FeatureVector {
    /// Builds a feature vector, rejecting duplicate sparse indices.
    pub fn new(mut sparse: Vec<SparseItem>, dense: Vec<f32>) -> Result<Self> {
        sparse.sort_unstable_by_key(|item| item.index);
        if let Some(pair) = sparse.windows(2).find(|w| w[0].index == w[1].index) {
            return Err(LearnError::Format(format!(
                "duplicate sparse feature index {}",
                pair[0].index
            )));
        }
        Ok(Self { sparse, dense })
    }

    /// Binary sparse features (value 1.0) and a dense part.
    pub fn from_indices(indices: impl IntoIterator<Item = usize>, dense: Vec<f32>) -> Result<Self> {
        Self::new(
            indices.into_iter().map(|i| SparseItem::new(i, 1.0)).collect(),
            dense,
        )
    }

    pub fn sparse(&self) -> &[SparseItem] {
        &self.sparse
    }

    pub fn dense(&self) -> &[f32] {
        &self.dense
    }

    pub fn is_empty(&self) -> bool {
        self.sparse.is_empty() && self.dense.is_empty()
    }
}

/// Assigns stable indices to strings, in insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StringIndex {
    index: HashMap<String, usize>,
    names: Vec<String>,
}

/// Sparse feature strings to input unit indices.
pub type FeatureMap = StringIndex;

/// Label strings to output unit indices.
pub type LabelMap = StringIndex;

impl StringIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the index for `key`, allocating the next one if unseen.
    pub fn add(&mut self, key: &str) -> usize {
        if let Some(&i) = self.index.get(key) {
            return i;
        }
        let i = self.names.len();
        self.index.insert(key.to_string(), i);
        self.names.push(key.to_string());
        i
    }

    pub fn get(&self, key: &str) -> Option<usize> {
        self.index.get(key).copied()
    }

    pub fn name(&self, index: usize) -> Option<&str> {
        self.names.get(index).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Strings in index order.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Rebuilds a map from strings listed in index order.
    pub fn from_names(names: Vec<String>) -> Result<Self> {
        let mut index = HashMap::with_capacity(names.len());
        for (i, name) in names.iter().enumerate() {
            if index.insert(name.clone(), i).is_some() {
                return Err(LearnError::Format(format!("duplicate entry '{}'", name)));
            }
        }
        Ok(Self { index, names })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_sparse_index_rejected() {
        let err = FeatureVector::new(
            vec![SparseItem::new(3, 1.0), SparseItem::new(1, 1.0), SparseItem::new(3, 0.5)],
            vec![],
        );
        assert!(matches!(err, Err(LearnError::Format(_))));
    }

    #[test]
    fn test_sparse_sorted() {
        let x = FeatureVector::from_indices([5, 2, 9], vec![0.5]).unwrap();
        let indices: Vec<usize> = x.sparse().iter().map(|s| s.index).collect();
        assert_eq!(indices, vec![2, 5, 9]);
        assert_eq!(x.dense(), &[0.5]);
        assert!(!x.is_empty());
    }

    #[test]
    fn test_feature_map() {
        let mut map = FeatureMap::new();
        assert_eq!(map.add("w0=the"), 0);
        assert_eq!(map.add("w0=cat"), 1);
        assert_eq!(map.add("w0=the"), 0);
        assert_eq!(map.get("w0=cat"), Some(1));
        assert_eq!(map.get("w0=dog"), None);

        let rebuilt = FeatureMap::from_names(map.names().to_vec()).unwrap();
        assert_eq!(rebuilt.get("w0=cat"), Some(1));
        assert!(FeatureMap::from_names(vec!["a".into(), "a".into()]).is_err());
    }
}

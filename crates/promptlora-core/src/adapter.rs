//! Loaded adapter weight data

use crate::tensor::{Tensor, WeightMap};
use std::collections::BTreeMap;

/// Weight deltas read from one adapter file
#[derive(Debug, Clone, Default)]
pub struct AdapterWeights {
    /// Tensors by key (e.g. `lora_unet_mid_block.lora_up.weight`)
    pub tensors: WeightMap,
    /// Free-form metadata stored in the file header
    pub metadata: BTreeMap<String, String>,
    /// Content hash of the raw file (blake3), when computed
    pub content_hash: Option<[u8; 32]>,
}

impl AdapterWeights {
    /// Create adapter weights from a tensor map
    pub fn new(tensors: WeightMap) -> Self {
        Self {
            tensors,
            metadata: BTreeMap::new(),
            content_hash: None,
        }
    }

    /// Set the content hash
    pub fn with_content_hash(mut self, hash: [u8; 32]) -> Self {
        self.content_hash = Some(hash);
        self
    }

    /// Add a metadata entry
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Get a tensor by key
    pub fn get(&self, key: &str) -> Option<&Tensor> {
        self.tensors.get(key)
    }

    /// Tensor keys in sorted order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.tensors.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.tensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tensors.is_empty()
    }

    /// Estimate memory usage in bytes
    pub fn memory_size(&self) -> usize {
        self.tensors
            .iter()
            .map(|(k, t)| k.len() + t.memory_size())
            .sum()
    }

    /// Content hash as lowercase hex
    pub fn hash_hex(&self) -> Option<String> {
        self.content_hash
            .map(|h| h.iter().map(|b| format!("{:02x}", b)).collect())
    }
}

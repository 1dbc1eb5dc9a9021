//! Collaborator traits
//!
//! The node does not know where adapters live, how they are stored or how
//! they get merged into a model. Hosts provide those pieces through the
//! traits below; `promptlora-lora` ships implementations backed by the
//! filesystem, safetensors files and in-memory weight maps.

use crate::adapter::AdapterWeights;
use crate::conditioning::TextEncoder;
use crate::tensor::TensorError;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Category name under which LoRA adapters are resolved
pub const LORA_CATEGORY: &str = "loras";

/// Path resolution errors
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("No {category} file named '{name}'")]
    NotFound { category: String, name: String },

    #[error("Unknown category: {0}")]
    UnknownCategory(String),

    #[error("Invalid name: {0}")]
    InvalidName(String),
}

/// Maps a `(category, name)` pair to a file on disk
pub trait PathResolver: Send + Sync {
    fn resolve(&self, category: &str, name: &str) -> Result<PathBuf, ResolveError>;
}

/// Weight loading errors
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Weights not found: {0}")]
    NotFound(PathBuf),

    #[error("File too large: {path} is {size} bytes (limit {limit})")]
    TooLarge { path: PathBuf, size: u64, limit: u64 },

    #[error("Refusing to load non-safetensors file in safe mode: {0}")]
    UnsafeFormat(PathBuf),

    #[error("Failed to parse {path}: {reason}")]
    Parse { path: PathBuf, reason: String },

    #[error("Tensor '{name}' has unsupported dtype {dtype}")]
    UnsupportedDtype { name: String, dtype: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Deserializes adapter weights from a file
pub trait WeightLoader: Send + Sync {
    /// Load the file at `path`. With `safe` set, only formats that cannot
    /// execute code on load are accepted.
    fn load(&self, path: &Path, safe: bool) -> Result<AdapterWeights, LoadError>;
}

/// Adapter merge errors
#[derive(Debug, Error)]
pub enum PatchError {
    #[error("Adapter key '{0}' has no matching up/down pair")]
    IncompletePair(String),

    #[error("Cannot patch '{key}': {source}")]
    Tensor {
        key: String,
        #[source]
        source: TensorError,
    },

    #[error("Patch failed: {0}")]
    Failed(String),
}

/// Merges adapters into a model / text-encoder pair
pub trait LoraPatcher {
    /// Generation model handle
    type Model;
    /// Text encoder handle
    type Clip: TextEncoder;

    /// Return the pair with `adapter` applied at the given strengths
    fn merge(
        &self,
        model: Self::Model,
        clip: Self::Clip,
        adapter: &AdapterWeights,
        strength_model: f32,
        strength_clip: f32,
    ) -> Result<(Self::Model, Self::Clip), PatchError>;
}

//! Adapter weight loading from safetensors files

use promptlora_core::{AdapterWeights, LoadError, Tensor, WeightLoader, WeightMap};
use safetensors::tensor::{Dtype, TensorView};
use safetensors::SafeTensors;
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

/// Loader configuration
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    /// Maximum file size in bytes
    pub max_file_size: u64,
    /// Record a blake3 hash of the file contents
    pub hash_contents: bool,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            max_file_size: 4 * 1024 * 1024 * 1024, // 4GB
            hash_contents: true,
        }
    }
}

/// Safetensors adapter loader
#[derive(Debug, Clone, Default)]
pub struct SafetensorsLoader {
    config: LoaderConfig,
}

impl SafetensorsLoader {
    /// Create a new loader
    pub fn new(config: LoaderConfig) -> Self {
        Self { config }
    }

    /// Get configuration
    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    /// Decode an in-memory safetensors buffer
    pub fn decode(&self, bytes: &[u8], path: &Path) -> Result<AdapterWeights, LoadError> {
        let parse_error = |e: safetensors::SafeTensorError| LoadError::Parse {
            path: path.to_path_buf(),
            reason: e.to_string(),
        };

        let parsed = SafeTensors::deserialize(bytes).map_err(parse_error)?;
        let (_, header) = SafeTensors::read_metadata(bytes).map_err(parse_error)?;

        let mut tensors = WeightMap::new();
        for (name, view) in parsed.tensors() {
            let data = tensor_to_f32_vec(&name, &view)?;
            let tensor = Tensor::new(view.shape().to_vec(), data).map_err(|e| LoadError::Parse {
                path: path.to_path_buf(),
                reason: format!("{}: {}", name, e),
            })?;
            tensors.insert(name, tensor);
        }

        let mut weights = AdapterWeights::new(tensors);
        if let Some(metadata) = header.metadata() {
            weights.metadata.extend(metadata.clone());
        }

        if self.config.hash_contents {
            weights = weights.with_content_hash(*blake3::hash(bytes).as_bytes());
        }

        Ok(weights)
    }
}

impl WeightLoader for SafetensorsLoader {
    fn load(&self, path: &Path, safe: bool) -> Result<AdapterWeights, LoadError> {
        if !path.exists() {
            return Err(LoadError::NotFound(path.to_path_buf()));
        }

        if safe && !is_safetensors(path) {
            return Err(LoadError::UnsafeFormat(path.to_path_buf()));
        }

        // Check file size
        let metadata = std::fs::metadata(path)?;
        if metadata.len() > self.config.max_file_size {
            return Err(LoadError::TooLarge {
                path: path.to_path_buf(),
                size: metadata.len(),
                limit: self.config.max_file_size,
            });
        }

        let bytes = std::fs::read(path)?;
        let weights = self.decode(&bytes, path)?;

        debug!(
            path = %path.display(),
            tensors = weights.len(),
            bytes = bytes.len(),
            "Loaded adapter weights"
        );

        Ok(weights)
    }
}

/// Write a weight map as an f32 safetensors file
pub fn save_safetensors(
    path: impl AsRef<Path>,
    weights: &WeightMap,
    metadata: Option<HashMap<String, String>>,
) -> Result<(), LoadError> {
    let path = path.as_ref();

    let buffers: Vec<(&str, Vec<u8>, Vec<usize>)> = weights
        .iter()
        .map(|(name, t)| {
            let bytes = t.data().iter().flat_map(|v| v.to_le_bytes()).collect();
            (name.as_str(), bytes, t.shape().to_vec())
        })
        .collect();

    let parse_error = |e: safetensors::SafeTensorError| LoadError::Parse {
        path: path.to_path_buf(),
        reason: e.to_string(),
    };

    let mut views = Vec::with_capacity(buffers.len());
    for (name, bytes, shape) in &buffers {
        let view = TensorView::new(Dtype::F32, shape.clone(), bytes).map_err(parse_error)?;
        views.push((*name, view));
    }

    let serialized = safetensors::serialize(views, metadata).map_err(parse_error)?;
    std::fs::write(path, serialized)?;

    Ok(())
}

fn is_safetensors(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("safetensors"))
        .unwrap_or(false)
}

/// Convert a tensor view to f32, widening or narrowing float formats
fn tensor_to_f32_vec(name: &str, view: &TensorView<'_>) -> Result<Vec<f32>, LoadError> {
    let data = view.data();

    let values = match view.dtype() {
        Dtype::F32 => data
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect(),
        Dtype::F16 => data
            .chunks_exact(2)
            .map(|c| half::f16::from_bits(u16::from_le_bytes([c[0], c[1]])).to_f32())
            .collect(),
        Dtype::BF16 => data
            .chunks_exact(2)
            .map(|c| half::bf16::from_bits(u16::from_le_bytes([c[0], c[1]])).to_f32())
            .collect(),
        Dtype::F64 => data
            .chunks_exact(8)
            .map(|c| {
                let mut bytes = [0u8; 8];
                bytes.copy_from_slice(c);
                f64::from_le_bytes(bytes) as f32
            })
            .collect(),
        other => {
            return Err(LoadError::UnsupportedDtype {
                name: name.to_string(),
                dtype: format!("{:?}", other),
            });
        }
    };

    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_weights() -> WeightMap {
        let mut weights = WeightMap::new();
        weights.insert(
            "lora_unet_proj.lora_down.weight".to_string(),
            Tensor::new(vec![1, 2], vec![1.0, 2.0]).unwrap(),
        );
        weights.insert("lora_unet_proj.alpha".to_string(), Tensor::scalar(1.0));
        weights
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("ink.safetensors");

        let mut metadata = HashMap::new();
        metadata.insert("ss_network_dim".to_string(), "1".to_string());
        save_safetensors(&path, &test_weights(), Some(metadata)).unwrap();

        let loaded = SafetensorsLoader::default().load(&path, true).unwrap();

        assert_eq!(loaded.tensors, test_weights());
        assert_eq!(loaded.metadata["ss_network_dim"], "1");
        assert!(loaded.content_hash.is_some());
    }

    #[test]
    fn test_skip_hashing() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("ink.safetensors");
        save_safetensors(&path, &test_weights(), None).unwrap();

        let loader = SafetensorsLoader::new(LoaderConfig {
            hash_contents: false,
            ..Default::default()
        });
        assert!(loader.load(&path, true).unwrap().content_hash.is_none());
    }

    #[test]
    fn test_f16_conversion() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("half.safetensors");

        let bytes: Vec<u8> = [0.5f32, -2.0]
            .iter()
            .flat_map(|v| half::f16::from_f32(*v).to_le_bytes())
            .collect();
        let view = TensorView::new(Dtype::F16, vec![2], &bytes).unwrap();
        let serialized = safetensors::serialize(vec![("w", view)], None).unwrap();
        std::fs::write(&path, serialized).unwrap();

        let loaded = SafetensorsLoader::default().load(&path, true).unwrap();
        assert_eq!(loaded.get("w").unwrap().data(), &[0.5, -2.0]);
    }

    #[test]
    fn test_missing_file() {
        let result = SafetensorsLoader::default().load(Path::new("/nonexistent/a.safetensors"), true);
        assert!(matches!(result, Err(LoadError::NotFound(_))));
    }

    #[test]
    fn test_safe_mode_refuses_pickle_formats() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("ink.pt");
        save_safetensors(&path, &test_weights(), None).unwrap();

        let loader = SafetensorsLoader::default();
        assert!(matches!(
            loader.load(&path, true),
            Err(LoadError::UnsafeFormat(_))
        ));
        // Without safe mode the contents are still decoded as safetensors
        assert!(loader.load(&path, false).is_ok());
    }

    #[test]
    fn test_invalid_data() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("bad.safetensors");
        std::fs::write(&path, b"not a safetensors file").unwrap();

        let result = SafetensorsLoader::default().load(&path, true);
        assert!(matches!(result, Err(LoadError::Parse { .. })));
    }

    #[test]
    fn test_size_limit() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("ink.safetensors");
        save_safetensors(&path, &test_weights(), None).unwrap();

        let loader = SafetensorsLoader::new(LoaderConfig {
            max_file_size: 8,
            ..Default::default()
        });
        assert!(matches!(
            loader.load(&path, true),
            Err(LoadError::TooLarge { .. })
        ));
    }
}

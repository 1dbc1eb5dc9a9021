//! Run the node against the in-memory reference model

use super::folder_paths;
use promptlora_core::{Conditioning, WeightLoader, WeightMap};
use promptlora_lora::{SafetensorsLoader, WeightClip, WeightModel, WeightPatcher};
use promptlora_pipeline::{NodeConfig, PromptLora};
use serde_json::json;
use std::path::{Path, PathBuf};
use tracing::info;

pub struct ApplyArgs {
    pub positive: String,
    pub negative: String,
    pub model: Option<PathBuf>,
    pub clip: Option<PathBuf>,
    pub dim: usize,
    pub lora_dirs: Vec<PathBuf>,
    pub cache_capacity: Option<usize>,
    pub safe_load: bool,
}

fn load_weights(
    loader: &SafetensorsLoader,
    path: Option<&Path>,
    safe: bool,
) -> Result<WeightMap, Box<dyn std::error::Error>> {
    match path {
        Some(path) => {
            info!(path = %path.display(), "Loading base weights");
            Ok(loader.load(path, safe)?.tensors)
        }
        None => Ok(WeightMap::new()),
    }
}

fn shapes(conditioning: &Conditioning) -> Vec<Vec<usize>> {
    conditioning
        .parts()
        .iter()
        .map(|part| part.cond.shape().to_vec())
        .collect()
}

pub fn run(args: ApplyArgs) -> Result<(), Box<dyn std::error::Error>> {
    let loader = SafetensorsLoader::default();
    let model = WeightModel::new(load_weights(&loader, args.model.as_deref(), args.safe_load)?);
    let clip = WeightClip::from_weights(
        load_weights(&loader, args.clip.as_deref(), args.safe_load)?,
        args.dim,
    );

    let config = NodeConfig {
        safe_load: args.safe_load,
        cache_capacity: args.cache_capacity,
        ..NodeConfig::default()
    };

    let mut node = PromptLora::builder(WeightPatcher::new())
        .resolver(folder_paths(&args.lora_dirs))
        .loader(loader)
        .config(config)
        .build()?;

    let out = node.apply(model, clip, &args.positive, &args.negative)?;
    let stats = node.cache().stats();

    let summary = json!({
        "positive_text": out.positive_text,
        "applied": out.applied,
        "model_tensors": out.model.weights.len(),
        "clip_tensors": out.clip.weights.len(),
        "embedding_dim": out.clip.embedding_dim(),
        "positive_shapes": shapes(&out.positive),
        "negative_shapes": shapes(&out.negative),
        "cache": {
            "entries": node.cache().names(),
            "memory_bytes": node.cache().memory_size(),
            "hits": stats.hits,
            "misses": stats.misses,
            "evictions": stats.evictions,
        },
    });

    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

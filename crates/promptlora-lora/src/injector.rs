//! LoRA injection into in-memory weights
//!
//! Applies `W' = W + strength * (alpha / rank) * (up @ down)` to every base
//! weight an adapter targets.

use crate::encoder::WeightClip;
use promptlora_core::{AdapterWeights, LoraPatcher, PatchError, Tensor, WeightMap};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Key prefix of adapter entries targeting the generation model
pub const UNET_PREFIX: &str = "lora_unet_";
/// Key prefix of adapter entries targeting the text encoder
pub const TEXT_ENCODER_PREFIX: &str = "lora_te_";

const UP_SUFFIX: &str = ".lora_up.weight";
const DOWN_SUFFIX: &str = ".lora_down.weight";
const ALPHA_SUFFIX: &str = ".alpha";

/// A generation model held as named weights
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WeightModel {
    pub weights: WeightMap,
}

impl WeightModel {
    pub fn new(weights: WeightMap) -> Self {
        Self { weights }
    }
}

/// One low-rank update
#[derive(Debug, Clone, Copy)]
struct LoraPair<'a> {
    up: &'a Tensor,
    down: &'a Tensor,
    alpha: Option<f32>,
}

impl LoraPair<'_> {
    /// `alpha / rank`, or 1.0 without alpha
    fn scale(&self) -> f32 {
        let rank = self.down.shape().first().copied().unwrap_or(0);
        match self.alpha {
            Some(alpha) if rank > 0 => alpha / rank as f32,
            _ => 1.0,
        }
    }

    fn delta(&self) -> Result<Tensor, promptlora_core::TensorError> {
        self.up.matmul(self.down)
    }
}

/// Adapter key stem for a base weight key: `a.b.weight` → `a_b`
pub fn lora_stem(base_key: &str) -> Option<String> {
    base_key
        .strip_suffix(".weight")
        .map(|stem| stem.replace('.', "_"))
}

/// Group the adapter's up/down/alpha tensors under `prefix` by stem
fn collect_pairs<'a>(
    adapter: &'a AdapterWeights,
    prefix: &str,
) -> Result<BTreeMap<String, LoraPair<'a>>, PatchError> {
    let mut pairs = BTreeMap::new();

    for (key, up) in &adapter.tensors {
        let Some(stem) = key
            .strip_prefix(prefix)
            .and_then(|k| k.strip_suffix(UP_SUFFIX))
        else {
            continue;
        };

        let down = adapter
            .get(&format!("{}{}{}", prefix, stem, DOWN_SUFFIX))
            .ok_or_else(|| PatchError::IncompletePair(key.clone()))?;
        let alpha = adapter
            .get(&format!("{}{}{}", prefix, stem, ALPHA_SUFFIX))
            .and_then(Tensor::first);

        pairs.insert(stem.to_string(), LoraPair { up, down, alpha });
    }

    Ok(pairs)
}

/// Apply the adapter's `prefix` pairs to `weights`; returns the number patched
fn apply_pairs(
    weights: &mut WeightMap,
    adapter: &AdapterWeights,
    prefix: &str,
    strength: f32,
) -> Result<usize, PatchError> {
    let pairs = collect_pairs(adapter, prefix)?;
    if pairs.is_empty() {
        return Ok(0);
    }

    let mut patched = 0;
    let mut used = Vec::with_capacity(pairs.len());

    for (key, weight) in weights.iter_mut() {
        let Some(stem) = lora_stem(key) else {
            continue;
        };
        let Some(pair) = pairs.get(&stem) else {
            continue;
        };

        let delta = pair.delta().map_err(|source| PatchError::Tensor {
            key: key.clone(),
            source,
        })?;
        weight
            .add_scaled(&delta, strength * pair.scale())
            .map_err(|source| PatchError::Tensor {
                key: key.clone(),
                source,
            })?;

        used.push(stem);
        patched += 1;
    }

    for stem in pairs.keys().filter(|s| !used.contains(s)) {
        warn!(key = %format!("{}{}", prefix, stem), "lora key not loaded");
    }

    Ok(patched)
}

/// Merges LoRA adapters into [`WeightModel`] / [`WeightClip`] pairs
#[derive(Debug, Clone, Copy, Default)]
pub struct WeightPatcher;

impl WeightPatcher {
    pub fn new() -> Self {
        Self
    }
}

impl LoraPatcher for WeightPatcher {
    type Model = WeightModel;
    type Clip = WeightClip;

    fn merge(
        &self,
        mut model: WeightModel,
        mut clip: WeightClip,
        adapter: &AdapterWeights,
        strength_model: f32,
        strength_clip: f32,
    ) -> Result<(WeightModel, WeightClip), PatchError> {
        let mut model_patched = 0;
        let mut clip_patched = 0;

        if strength_model != 0.0 {
            model_patched = apply_pairs(&mut model.weights, adapter, UNET_PREFIX, strength_model)?;
        }
        if strength_clip != 0.0 {
            clip_patched = apply_pairs(
                &mut clip.weights,
                adapter,
                TEXT_ENCODER_PREFIX,
                strength_clip,
            )?;
        }

        let foreign = adapter
            .keys()
            .filter(|k| !k.starts_with(UNET_PREFIX) && !k.starts_with(TEXT_ENCODER_PREFIX))
            .count();
        if foreign > 0 {
            warn!(count = foreign, "Adapter keys with unknown prefix ignored");
        }

        debug!(
            model_patched,
            clip_patched, strength_model, strength_clip, "Merged adapter"
        );

        Ok((model, clip))
    }
}

//! The PromptLora node
//!
//! Applies every `<lora:...>` directive of the positive prompt to a model /
//! text-encoder pair, then encodes both prompts with the patched encoder.
//! The negative prompt is never scanned for directives.

use crate::cache::{AdapterCache, CacheError};
use promptlora_core::{
    AdapterDirective, Conditioning, EncodeError, LoraPatcher, PatchError, PathResolver,
    WeightLoader, parse_directives, prompt_encode, strip_directive,
};
use std::time::Instant;
use thiserror::Error;
use tracing::{Level, debug, info, span};

/// Node errors
#[derive(Debug, Error)]
pub enum NodeError {
    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error("Failed to merge adapter '{name}': {source}")]
    Merge {
        name: String,
        #[source]
        source: PatchError,
    },

    #[error("Failed to encode {prompt} prompt: {source}")]
    Encode {
        prompt: &'static str,
        #[source]
        source: EncodeError,
    },

    #[error("Missing collaborator: {0}")]
    MissingCollaborator(&'static str),
}

/// Node configuration
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Ask the loader for safe deserialization
    pub safe_load: bool,
    /// Maximum cached adapters (None = unbounded)
    pub cache_capacity: Option<usize>,
    /// Drop cached adapters the latest prompt did not use
    pub prune_unused: bool,
    /// Category shown by the host's node menu
    pub category: String,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            safe_load: true,
            cache_capacity: None,
            prune_unused: false,
            category: "loaders".to_string(),
        }
    }
}

impl NodeConfig {
    /// Keep only a handful of adapters in memory
    pub fn low_memory() -> Self {
        Self {
            cache_capacity: Some(4),
            prune_unused: true,
            ..Default::default()
        }
    }
}

/// Outputs of one `apply` call, in the node's declared order plus extras
#[derive(Debug, Clone)]
pub struct PromptLoraOutput<M, C> {
    pub model: M,
    pub clip: C,
    pub positive: Conditioning,
    pub negative: Conditioning,
    /// Directives merged, in order
    pub applied: Vec<AdapterDirective>,
    /// Positive prompt after directive removal
    pub positive_text: String,
}

/// Prompt-driven LoRA loader node
pub struct PromptLora<P: LoraPatcher> {
    patcher: P,
    cache: AdapterCache,
    config: NodeConfig,
}

impl<P: LoraPatcher> PromptLora<P> {
    /// Create a node builder
    pub fn builder(patcher: P) -> PromptLoraBuilder<P> {
        PromptLoraBuilder::new(patcher)
    }

    /// Merge the positive prompt's adapters and encode both prompts
    pub fn apply(
        &mut self,
        model: P::Model,
        clip: P::Clip,
        positive: &str,
        negative: &str,
    ) -> Result<PromptLoraOutput<P::Model, P::Clip>, NodeError> {
        let directives = parse_directives(positive);

        let span = span!(Level::DEBUG, "prompt_lora", directives = directives.len());
        let _enter = span.enter();

        let start = Instant::now();
        let mut model = model;
        let mut clip = clip;
        let mut positive = positive.to_string();

        for directive in &directives {
            let adapter = self.cache.get_or_load(&directive.name)?;

            (model, clip) = self
                .patcher
                .merge(
                    model,
                    clip,
                    &adapter,
                    directive.weight,
                    directive.clip_weight,
                )
                .map_err(|source| NodeError::Merge {
                    name: directive.name.clone(),
                    source,
                })?;

            positive = strip_directive(&positive, directive);

            debug!(
                name = %directive.name,
                weight = directive.weight,
                clip_weight = directive.clip_weight,
                "Applied adapter"
            );
        }

        if self.config.prune_unused {
            let used: Vec<&str> = directives.iter().map(|d| d.name.as_str()).collect();
            self.cache.retain_names(&used);
        }

        let positive_cond = prompt_encode(&clip, &positive).map_err(|source| NodeError::Encode {
            prompt: "positive",
            source,
        })?;
        let negative_cond = prompt_encode(&clip, negative).map_err(|source| NodeError::Encode {
            prompt: "negative",
            source,
        })?;

        info!(
            adapters = directives.len(),
            cached = self.cache.len(),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Prompt LoRA applied"
        );

        Ok(PromptLoraOutput {
            model,
            clip,
            positive: positive_cond,
            negative: negative_cond,
            applied: directives,
            positive_text: positive,
        })
    }

    /// Get the adapter cache
    pub fn cache(&self) -> &AdapterCache {
        &self.cache
    }

    /// Get mutable adapter cache
    pub fn cache_mut(&mut self) -> &mut AdapterCache {
        &mut self.cache
    }

    /// Get node configuration
    pub fn config(&self) -> &NodeConfig {
        &self.config
    }
}

/// Node builder
pub struct PromptLoraBuilder<P: LoraPatcher> {
    patcher: P,
    resolver: Option<Box<dyn PathResolver>>,
    loader: Option<Box<dyn WeightLoader>>,
    config: NodeConfig,
}

impl<P: LoraPatcher> PromptLoraBuilder<P> {
    /// Create a new builder
    pub fn new(patcher: P) -> Self {
        Self {
            patcher,
            resolver: None,
            loader: None,
            config: NodeConfig::default(),
        }
    }

    /// Set the adapter path resolver
    pub fn resolver(mut self, resolver: impl PathResolver + 'static) -> Self {
        self.resolver = Some(Box::new(resolver));
        self
    }

    /// Set the adapter weight loader
    pub fn loader(mut self, loader: impl WeightLoader + 'static) -> Self {
        self.loader = Some(Box::new(loader));
        self
    }

    /// Set configuration
    pub fn config(mut self, config: NodeConfig) -> Self {
        self.config = config;
        self
    }

    /// Bound the adapter cache
    pub fn cache_capacity(mut self, capacity: usize) -> Self {
        self.config.cache_capacity = Some(capacity);
        self
    }

    /// Build the node
    pub fn build(self) -> Result<PromptLora<P>, NodeError> {
        let resolver = self
            .resolver
            .ok_or(NodeError::MissingCollaborator("path resolver"))?;
        let loader = self
            .loader
            .ok_or(NodeError::MissingCollaborator("weight loader"))?;

        let mut cache =
            AdapterCache::from_boxed(resolver, loader).with_safe_load(self.config.safe_load);
        if let Some(capacity) = self.config.cache_capacity {
            cache = cache.with_capacity(capacity);
        }

        info!(
            capacity = ?self.config.cache_capacity,
            safe_load = self.config.safe_load,
            "Building PromptLora node"
        );

        Ok(PromptLora {
            patcher: self.patcher,
            cache,
            config: self.config,
        })
    }
}

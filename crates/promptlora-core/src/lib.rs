//! PromptLora Core - Directive parsing and shared types
//!
//! PromptLora is a graph node that reads LoRA directives out of a prompt,
//! merges the named adapters into a model / text-encoder pair and encodes
//! what remains of the prompt into conditioning.
//!
//! # Prompt Flow
//!
//! ```text
//! "<lora:ink:0.8> a cat" → [parse] → AdapterDirective("ink", 0.8, 1.0)
//!                                         ↓
//!                   model, clip → [merge adapter] → model', clip'
//!                                         ↓
//!                        " a cat" → [encode with clip'] → Conditioning
//! ```
//!
//! This crate holds the pieces every other crate agrees on: the directive
//! grammar, the tensor and conditioning types, and the traits that
//! collaborators (path resolvers, weight loaders, patchers, encoders)
//! implement.

pub mod adapter;
pub mod backend;
pub mod conditioning;
pub mod directive;
pub mod tensor;

// Re-export commonly used types
pub use adapter::AdapterWeights;
pub use backend::{
    LORA_CATEGORY, LoadError, LoraPatcher, PatchError, PathResolver, ResolveError, WeightLoader,
};
pub use conditioning::{
    Conditioning, ConditioningPart, EncodeError, EncoderExtras, EncoderOutput, TextEncoder, Tokens,
    prompt_encode,
};
pub use directive::{
    AdapterDirective, DirectiveOutcome, MalformedDirective, MalformedReason, parse_directives,
    scan_directives, strip_directive,
};
pub use tensor::{Tensor, TensorError, WeightMap};

//! PromptLora Pipeline - The prompt LoRA node
//!
//! Wires the directive parser, the adapter cache and the collaborators
//! into a single graph node.
//!
//! # Apply Flow
//!
//! ```text
//! positive ─→ [parse] ─→ directive₁ … directiveₙ
//!                            │
//!          AdapterCache ←────┤ get_or_load(name)
//!                            ↓
//! (model, clip) ─→ [merge₁] ─→ … ─→ [mergeₙ] ─→ (model', clip')
//!                                                     │
//! positive (stripped), negative ─→ [encode with clip'] ─→ conditioning
//! ```

pub mod cache;
pub mod node;
pub mod schema;

// Re-export commonly used types
pub use cache::{AdapterCache, CacheError, CacheStats, CachedAdapter};
pub use node::{NodeConfig, NodeError, PromptLora, PromptLoraBuilder, PromptLoraOutput};
pub use schema::{NodeRegistry, NodeSchema, ValueKind};

//! PromptLora LoRA - Adapter storage and merging
//!
//! Concrete collaborators for the PromptLora node:
//!
//! - [`FolderPaths`] resolves adapter names against search directories
//! - [`SafetensorsLoader`] reads `.safetensors` adapter files
//! - [`WeightPatcher`] merges LoRA up/down pairs into in-memory weights
//! - [`WeightClip`] is a small deterministic text encoder whose output
//!   depends on its (patchable) projection weights
//!
//! # Adapter Key Layout
//!
//! ```text
//! lora_unet_<stem>.lora_up.weight    [out, rank]
//! lora_unet_<stem>.lora_down.weight  [rank, in]
//! lora_unet_<stem>.alpha             scalar (optional)
//! lora_te_<stem>.*                   same, for the text encoder
//! ```
//!
//! `<stem>` is the base weight key without `.weight`, with `.` replaced by `_`.

pub mod encoder;
pub mod injector;
pub mod loader;
pub mod resolver;

pub use encoder::WeightClip;
pub use injector::{WeightModel, WeightPatcher};
pub use loader::{LoaderConfig, SafetensorsLoader, save_safetensors};
pub use resolver::{FolderPaths, ListedFile};

//! CLI command implementations

pub mod apply;
pub mod lora;
pub mod parse;
pub mod schema;

use promptlora_lora::FolderPaths;
use std::path::PathBuf;

/// Search paths: explicit directories replace the defaults
pub fn folder_paths(lora_dirs: &[PathBuf]) -> FolderPaths {
    if lora_dirs.is_empty() {
        return FolderPaths::new();
    }

    lora_dirs
        .iter()
        .fold(FolderPaths::empty(), |paths, dir| paths.with_lora_dir(dir))
}

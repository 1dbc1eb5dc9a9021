//! Adapter management commands

use super::folder_paths;
use promptlora_core::{LORA_CATEGORY, PathResolver, WeightLoader};
use promptlora_lora::SafetensorsLoader;
use std::path::PathBuf;

pub fn list(lora_dirs: &[PathBuf]) {
    let paths = folder_paths(lora_dirs);

    println!("LoRA Search Paths:");
    for path in paths.search_paths(LORA_CATEGORY) {
        println!("  - {}", path.display());
    }

    println!();

    let found = paths.list(LORA_CATEGORY);
    if found.is_empty() {
        println!("No LoRAs found.");
        return;
    }

    println!("Found {} LoRA(s):", found.len());
    for file in found {
        println!("  - {:<32} {}", file.name, file.path.display());
    }
}

pub fn inspect(name: &str, lora_dirs: &[PathBuf]) -> Result<(), Box<dyn std::error::Error>> {
    let paths = folder_paths(lora_dirs);

    let path = match paths.resolve(LORA_CATEGORY, name) {
        Ok(p) => p,
        Err(e) => {
            println!("{}", e);
            println!("Use 'promptlora list' to see available LoRAs.");
            return Ok(());
        }
    };

    let adapter = SafetensorsLoader::default().load(&path, true)?;

    println!("LoRA: {}", name);
    println!("==============================");
    println!("Path:    {}", path.display());
    println!("Tensors: {}", adapter.len());
    println!("Memory:  {} bytes", adapter.memory_size());
    if let Some(hash) = adapter.hash_hex() {
        println!("Hash:    {}", hash);
    }

    if !adapter.metadata.is_empty() {
        println!();
        println!("Metadata:");
        for (key, value) in &adapter.metadata {
            println!("  {}: {}", key, value);
        }
    }

    println!();
    println!("Tensors:");
    for (key, tensor) in &adapter.tensors {
        println!("  {:<64} {:?}", key, tensor.shape());
    }

    Ok(())
}

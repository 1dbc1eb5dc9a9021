//! Adapter path resolution
//!
//! Maps `(category, name)` to a file under one of the category's search
//! directories.

use promptlora_core::{LORA_CATEGORY, PathResolver, ResolveError};
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

/// File extensions recognised as model weights
pub const SUPPORTED_EXTENSIONS: &[&str] = &["safetensors", "ckpt", "pt", "pth", "bin"];

/// A weight file found while listing a category
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListedFile {
    /// Name relative to its search directory, usable with `resolve`
    pub name: String,
    /// Full path
    pub path: PathBuf,
}

/// Category → search directories
#[derive(Debug, Clone)]
pub struct FolderPaths {
    folders: HashMap<String, Vec<PathBuf>>,
}

impl FolderPaths {
    /// Create with the default `loras` search paths
    pub fn new() -> Self {
        let mut paths = Self::empty();
        paths.add_search_path(LORA_CATEGORY, PathBuf::from("models").join("loras"));
        paths.add_search_path(
            LORA_CATEGORY,
            dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("promptlora")
                .join("loras"),
        );
        paths
    }

    /// Create with no search paths at all
    pub fn empty() -> Self {
        Self {
            folders: HashMap::new(),
        }
    }

    /// Add a search path; earlier paths take precedence
    pub fn add_search_path(&mut self, category: &str, path: impl Into<PathBuf>) {
        self.folders
            .entry(category.to_string())
            .or_default()
            .push(path.into());
    }

    /// Add a LoRA search path
    pub fn with_lora_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.add_search_path(LORA_CATEGORY, path);
        self
    }

    /// Get search paths for a category
    pub fn search_paths(&self, category: &str) -> &[PathBuf] {
        self.folders.get(category).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Resolve a name to a file.
    ///
    /// An exact match in any directory wins; otherwise each supported
    /// extension is tried, so `<lora:ink:1>` finds `ink.safetensors`.
    pub fn get_full_path(&self, category: &str, name: &str) -> Result<PathBuf, ResolveError> {
        let dirs = self
            .folders
            .get(category)
            .ok_or_else(|| ResolveError::UnknownCategory(category.to_string()))?;

        validate_name(name)?;

        if let Some(path) = dirs.iter().map(|d| d.join(name)).find(|p| p.is_file()) {
            debug!(category, name, path = %path.display(), "Resolved exact path");
            return Ok(path);
        }

        if !has_supported_extension(Path::new(name)) {
            for dir in dirs {
                for ext in SUPPORTED_EXTENSIONS {
                    let path = dir.join(format!("{}.{}", name, ext));
                    if path.is_file() {
                        debug!(category, name, path = %path.display(), "Resolved by extension");
                        return Ok(path);
                    }
                }
            }
        }

        Err(ResolveError::NotFound {
            category: category.to_string(),
            name: name.to_string(),
        })
    }

    /// List weight files of a category, recursing into subdirectories
    pub fn list(&self, category: &str) -> Vec<ListedFile> {
        let mut found = Vec::new();

        for dir in self.search_paths(category) {
            collect_files(dir, dir, &mut found);
        }

        found.sort_by(|a, b| a.name.cmp(&b.name));
        found
    }
}

impl Default for FolderPaths {
    fn default() -> Self {
        Self::new()
    }
}

impl PathResolver for FolderPaths {
    fn resolve(&self, category: &str, name: &str) -> Result<PathBuf, ResolveError> {
        self.get_full_path(category, name)
    }
}

/// Names must stay inside their search directory
fn validate_name(name: &str) -> Result<(), ResolveError> {
    let path = Path::new(name);
    let escapes = path
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));

    if name.is_empty() || escapes {
        return Err(ResolveError::InvalidName(name.to_string()));
    }
    Ok(())
}

fn has_supported_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| SUPPORTED_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

fn collect_files(root: &Path, dir: &Path, found: &mut Vec<ListedFile>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };

    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_files(root, &path, found);
        } else if has_supported_extension(&path) {
            if let Ok(relative) = path.strip_prefix(root) {
                found.push(ListedFile {
                    name: relative.to_string_lossy().replace('\\', "/"),
                    path,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&path, b"x").unwrap();
        path
    }

    #[test]
    fn test_resolve_exact_name() {
        let dir = TempDir::new().unwrap();
        let path = touch(dir.path(), "ink.safetensors");

        let paths = FolderPaths::empty().with_lora_dir(dir.path());
        assert_eq!(paths.resolve(LORA_CATEGORY, "ink.safetensors").unwrap(), path);
    }

    #[test]
    fn test_resolve_without_extension() {
        let dir = TempDir::new().unwrap();
        let path = touch(dir.path(), "styles/ink.safetensors");

        let paths = FolderPaths::empty().with_lora_dir(dir.path());
        assert_eq!(paths.resolve(LORA_CATEGORY, "styles/ink").unwrap(), path);
    }

    #[test]
    fn test_earlier_search_path_wins() {
        let first = TempDir::new().unwrap();
        let second = TempDir::new().unwrap();
        touch(second.path(), "ink.safetensors");
        let expected = touch(first.path(), "ink.safetensors");

        let paths = FolderPaths::empty()
            .with_lora_dir(first.path())
            .with_lora_dir(second.path());
        assert_eq!(paths.resolve(LORA_CATEGORY, "ink").unwrap(), expected);
    }

    #[test]
    fn test_resolve_missing() {
        let dir = TempDir::new().unwrap();
        let paths = FolderPaths::empty().with_lora_dir(dir.path());

        let result = paths.resolve(LORA_CATEGORY, "nope");
        assert!(matches!(result, Err(ResolveError::NotFound { .. })));
    }

    #[test]
    fn test_unknown_category() {
        let paths = FolderPaths::empty();
        let result = paths.resolve("checkpoints", "model");
        assert!(matches!(result, Err(ResolveError::UnknownCategory(_))));
    }

    #[test]
    fn test_rejects_escaping_names() {
        let dir = TempDir::new().unwrap();
        let paths = FolderPaths::empty().with_lora_dir(dir.path());

        for name in ["../secret", "/etc/passwd", ""] {
            let result = paths.resolve(LORA_CATEGORY, name);
            assert!(
                matches!(result, Err(ResolveError::InvalidName(_))),
                "{name:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_list() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "b.safetensors");
        touch(dir.path(), "sub/a.pt");
        touch(dir.path(), "notes.txt");

        let paths = FolderPaths::empty().with_lora_dir(dir.path());
        let names: Vec<String> = paths
            .list(LORA_CATEGORY)
            .into_iter()
            .map(|f| f.name)
            .collect();

        assert_eq!(names, vec!["b.safetensors", "sub/a.pt"]);
    }

    #[test]
    fn test_default_search_paths() {
        let paths = FolderPaths::new();
        assert_eq!(paths.search_paths(LORA_CATEGORY).len(), 2);
        assert!(paths.search_paths("vae").is_empty());
    }
}

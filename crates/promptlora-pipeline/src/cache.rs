//! Adapter weight cache
//!
//! Keeps loaded adapters keyed by name so repeated directives do not hit the
//! disk again. Entries are never invalidated when the underlying file
//! changes. Without a capacity the cache only grows.

use promptlora_core::{
    AdapterWeights, LORA_CATEGORY, LoadError, PathResolver, ResolveError, WeightLoader,
};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info};

/// Cache errors
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Cannot resolve adapter '{name}': {source}")]
    Resolve {
        name: String,
        #[source]
        source: ResolveError,
    },

    #[error("Cannot load adapter '{name}' from {path}: {source}")]
    Load {
        name: String,
        path: PathBuf,
        #[source]
        source: LoadError,
    },
}

/// A cached adapter
#[derive(Debug, Clone)]
pub struct CachedAdapter {
    /// Name the adapter was requested under
    pub name: String,
    /// File it was loaded from
    pub filepath: PathBuf,
    /// Loaded weights
    pub adapter: Arc<AdapterWeights>,
    /// Cache entry creation time
    pub created_at: Instant,
    /// Last access time
    pub last_accessed: Instant,
    /// Access count
    pub access_count: u64,
    /// Cache-wide access sequence number of the last access
    pub last_used: u64,
}

impl CachedAdapter {
    /// Create a new cache entry
    pub fn new(name: impl Into<String>, filepath: PathBuf, adapter: Arc<AdapterWeights>) -> Self {
        let now = Instant::now();
        Self {
            name: name.into(),
            filepath,
            adapter,
            created_at: now,
            last_accessed: now,
            access_count: 0,
            last_used: 0,
        }
    }

    /// Mark as accessed at sequence number `tick`
    pub fn touch(&mut self, tick: u64) {
        self.last_accessed = Instant::now();
        self.last_used = tick;
        self.access_count += 1;
    }

    /// Estimate memory usage in bytes
    pub fn memory_size(&self) -> usize {
        self.adapter.memory_size() + std::mem::size_of::<Self>()
    }
}

/// Cache statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Total lookups
    pub lookups: u64,
    /// Cache hits
    pub hits: u64,
    /// Cache misses
    pub misses: u64,
    /// Evictions
    pub evictions: u64,
    /// Insertions
    pub insertions: u64,
}

impl CacheStats {
    /// Hit rate (0.0 - 1.0)
    pub fn hit_rate(&self) -> f64 {
        if self.lookups == 0 {
            0.0
        } else {
            self.hits as f64 / self.lookups as f64
        }
    }
}

/// Adapter cache that loads on miss
pub struct AdapterCache {
    /// Cached adapters by name
    entries: HashMap<String, CachedAdapter>,
    /// Maps names to files
    resolver: Box<dyn PathResolver>,
    /// Reads adapter files
    loader: Box<dyn WeightLoader>,
    /// Maximum number of entries (LRU eviction beyond it)
    capacity: Option<usize>,
    /// Ask the loader for safe deserialization
    safe_load: bool,
    /// Cache statistics
    stats: CacheStats,
    /// Access sequence counter; orders entries for eviction
    tick: u64,
}

impl AdapterCache {
    /// Create an unbounded cache
    pub fn new(
        resolver: impl PathResolver + 'static,
        loader: impl WeightLoader + 'static,
    ) -> Self {
        Self::from_boxed(Box::new(resolver), Box::new(loader))
    }

    /// Create an unbounded cache from boxed collaborators
    pub fn from_boxed(resolver: Box<dyn PathResolver>, loader: Box<dyn WeightLoader>) -> Self {
        Self {
            entries: HashMap::new(),
            resolver,
            loader,
            capacity: None,
            safe_load: true,
            stats: CacheStats::default(),
            tick: 0,
        }
    }

    /// Bound the cache to `capacity` entries (at least one)
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = Some(capacity.max(1));
        self
    }

    /// Enable/disable safe loading
    pub fn with_safe_load(mut self, safe_load: bool) -> Self {
        self.safe_load = safe_load;
        self
    }

    /// Return the adapter for `name`, loading it on a miss
    pub fn get_or_load(&mut self, name: &str) -> Result<Arc<AdapterWeights>, CacheError> {
        self.stats.lookups += 1;

        if let Some(entry) = self.entries.get_mut(name) {
            self.stats.hits += 1;
            self.tick += 1;
            entry.touch(self.tick);
            debug!(name, "Adapter cache hit");
            return Ok(Arc::clone(&entry.adapter));
        }

        self.stats.misses += 1;

        let path = self
            .resolver
            .resolve(LORA_CATEGORY, name)
            .map_err(|source| CacheError::Resolve {
                name: name.to_string(),
                source,
            })?;

        let adapter = self
            .loader
            .load(&path, self.safe_load)
            .map_err(|source| CacheError::Load {
                name: name.to_string(),
                path: path.clone(),
                source,
            })?;

        info!(name, path = %path.display(), tensors = adapter.len(), "Loaded adapter");

        let adapter = Arc::new(adapter);
        self.insert(CachedAdapter::new(name, path, Arc::clone(&adapter)));
        Ok(adapter)
    }

    /// Insert an entry, evicting the least recently used ones if bounded
    pub fn insert(&mut self, mut entry: CachedAdapter) {
        if let Some(capacity) = self.capacity {
            while self.entries.len() >= capacity && !self.entries.contains_key(&entry.name) {
                self.evict_one();
            }
        }

        self.tick += 1;
        entry.last_used = self.tick;
        self.entries.insert(entry.name.clone(), entry);
        self.stats.insertions += 1;
    }

    /// Look at an entry without counting an access
    pub fn peek(&self, name: &str) -> Option<&CachedAdapter> {
        self.entries.get(name)
    }

    /// Check if an adapter is cached
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Remove a cached adapter
    pub fn remove(&mut self, name: &str) -> Option<CachedAdapter> {
        self.entries.remove(name)
    }

    /// Drop every entry whose name is not in `keep`; returns how many went
    pub fn retain_names(&mut self, keep: &[&str]) -> usize {
        let before = self.entries.len();
        self.entries.retain(|name, _| keep.contains(&name.as_str()));
        let pruned = before - self.entries.len();
        if pruned > 0 {
            debug!(pruned, "Pruned unused adapters");
        }
        pruned
    }

    /// Clear all cached entries
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Cached names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Evict one entry (LRU policy)
    fn evict_one(&mut self) {
        let lru = self
            .entries
            .iter()
            .min_by_key(|(_, e)| e.last_used)
            .map(|(name, _)| name.clone());

        if let Some(name) = lru {
            self.entries.remove(&name);
            self.stats.evictions += 1;
            debug!(name = %name, "Evicted adapter");
        }
    }

    /// Get cache statistics
    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    /// Get the entry bound, if any
    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    /// Estimated memory held by cached adapters
    pub fn memory_size(&self) -> usize {
        self.entries.values().map(CachedAdapter::memory_size).sum()
    }

    /// Get number of cached entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if cache is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl std::fmt::Debug for AdapterCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterCache")
            .field("names", &self.names())
            .field("capacity", &self.capacity)
            .field("safe_load", &self.safe_load)
            .field("stats", &self.stats)
            .finish()
    }
}

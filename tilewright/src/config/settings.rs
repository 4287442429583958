//! Configuration structs, one per INI section.

use std::path::PathBuf;
use std::time::Duration;

/// Root configuration, loaded from `tilewright.ini`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TilewrightConfig {
    pub projects: ProjectsSettings,
    pub providers: CacheSettings,
    pub sources: CacheSettings,
    pub pool: PoolSettings,
    pub blob_cache: BlobCacheSettings,
}

/// `[projects]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectsSettings {
    /// Directory holding one sub-directory per project.
    pub root: PathBuf,
    /// Directory for compiled configuration artifacts.
    pub artifacts: PathBuf,
}

/// `[providers]` and `[sources]`: bounds of a handle cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheSettings {
    pub max_entries: u64,
    /// `None` when configured as 0.
    pub ttl: Option<Duration>,
}

/// `[pool]`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolSettings {
    /// Renderer instances per tile source.
    pub size: usize,
}

/// Blob cache backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlobBackend {
    Memory,
    Redis,
    None,
}

/// `[blob_cache]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobCacheSettings {
    pub backend: BlobBackend,
    /// Memory backend budget in bytes.
    pub max_size_bytes: u64,
    pub ttl: Option<Duration>,
    pub redis_url: String,
    pub key_prefix: String,
}

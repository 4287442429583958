//! Default values for every setting.

use std::path::PathBuf;
use std::time::Duration;

use super::settings::*;
use crate::pool::default_pool_size;

// =============================================================================
// Projects
// =============================================================================

pub const DEFAULT_PROJECTS_ROOT: &str = "./projects";
pub const DEFAULT_ARTIFACTS_DIR: &str = "./.tilewright/compiled";

// =============================================================================
// Handle caches
// =============================================================================

pub const DEFAULT_PROVIDER_MAX_ENTRIES: u64 = 64;
pub const DEFAULT_PROVIDER_TTL_SECS: u64 = 3600;
pub const DEFAULT_SOURCE_MAX_ENTRIES: u64 = 16;
pub const DEFAULT_SOURCE_TTL_SECS: u64 = 1800;

// =============================================================================
// Blob cache
// =============================================================================

/// 512 MB
pub const DEFAULT_BLOB_CACHE_SIZE: u64 = 512 * 1024 * 1024;
pub const DEFAULT_BLOB_CACHE_TTL_SECS: u64 = 3600;
pub const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1/";
pub const DEFAULT_KEY_PREFIX: &str = "tilewright";

impl Default for TilewrightConfig {
    fn default() -> Self {
        Self {
            projects: ProjectsSettings::default(),
            providers: CacheSettings {
                max_entries: DEFAULT_PROVIDER_MAX_ENTRIES,
                ttl: Some(Duration::from_secs(DEFAULT_PROVIDER_TTL_SECS)),
            },
            sources: CacheSettings {
                max_entries: DEFAULT_SOURCE_MAX_ENTRIES,
                ttl: Some(Duration::from_secs(DEFAULT_SOURCE_TTL_SECS)),
            },
            pool: PoolSettings::default(),
            blob_cache: BlobCacheSettings::default(),
        }
    }
}

impl Default for ProjectsSettings {
    fn default() -> Self {
        Self {
            root: PathBuf::from(DEFAULT_PROJECTS_ROOT),
            artifacts: PathBuf::from(DEFAULT_ARTIFACTS_DIR),
        }
    }
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            size: default_pool_size(),
        }
    }
}

impl Default for BlobCacheSettings {
    fn default() -> Self {
        Self {
            backend: BlobBackend::Memory,
            max_size_bytes: DEFAULT_BLOB_CACHE_SIZE,
            ttl: Some(Duration::from_secs(DEFAULT_BLOB_CACHE_TTL_SECS)),
            redis_url: DEFAULT_REDIS_URL.to_string(),
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
        }
    }
}

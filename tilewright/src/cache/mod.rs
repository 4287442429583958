//! Caching tiers.
//!
//! Two unrelated kinds of cache live here:
//!
//! - [`SingleFlightCache`]: holds expensive *handles* (providers, compiled
//!   configurations, tile sources) and guarantees one producer per key.
//!   Values are disposed when evicted.
//! - [`BlobCache`]: holds rendered tile *bytes*, in process ([`MemoryBlobCache`])
//!   or in Redis ([`RedisBlobCache`]). Nothing to dispose.

mod blob;
mod memory;
mod remote;
mod single_flight;

pub use blob::{blob_namespace, blob_tile_key, BlobCache, NoOpBlobCache};
pub use memory::MemoryBlobCache;
pub use remote::RedisBlobCache;
pub use single_flight::{Disposer, SingleFlightCache, SingleFlightConfig, SingleFlightStats};

use std::sync::Arc;

use tracing::info;

use crate::config::{BlobBackend, BlobCacheSettings};
use crate::error::TileResult;

/// Builds the blob cache backend selected in configuration.
///
/// Connecting to Redis happens here, so a bad URL fails at startup rather
/// than on the first tile.
pub async fn build_blob_cache(settings: &BlobCacheSettings) -> TileResult<Arc<dyn BlobCache>> {
    let cache: Arc<dyn BlobCache> = match settings.backend {
        BlobBackend::Memory => Arc::new(MemoryBlobCache::new(
            settings.max_size_bytes,
            settings.ttl,
        )),
        BlobBackend::Redis => Arc::new(
            RedisBlobCache::connect(&settings.redis_url, &settings.key_prefix, settings.ttl).await?,
        ),
        BlobBackend::None => Arc::new(NoOpBlobCache),
    };

    info!(backend = cache.name(), "Blob cache ready");
    Ok(cache)
}

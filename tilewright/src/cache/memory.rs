//! In-process blob cache backed by moka.
//!
//! Capacity is measured in payload bytes rather than entry count, so a few
//! large raster tiles and many small vector tiles share one budget.

use std::time::Duration;

use futures::future::BoxFuture;
use moka::sync::Cache;
use tracing::debug;

use crate::cache::blob::BlobCache;
use crate::error::TileResult;
use crate::tile::Tile;

/// (namespace, tile key)
type BlobKey = (String, String);

/// Bounded in-memory [`BlobCache`].
pub struct MemoryBlobCache {
    cache: Cache<BlobKey, Tile>,
    max_size_bytes: u64,
}

impl MemoryBlobCache {
    /// Creates a cache holding at most `max_size_bytes` of tile data.
    pub fn new(max_size_bytes: u64, ttl: Option<Duration>) -> Self {
        let mut builder = Cache::builder()
            .name("blob-memory")
            .max_capacity(max_size_bytes)
            .weigher(|key: &BlobKey, tile: &Tile| -> u32 {
                let weight = tile.len() + key.0.len() + key.1.len();
                u32::try_from(weight).unwrap_or(u32::MAX)
            });
        if let Some(ttl) = ttl {
            builder = builder.time_to_live(ttl);
        }

        Self {
            cache: builder.build(),
            max_size_bytes,
        }
    }

    /// Approximate number of cached tiles.
    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }

    /// Approximate bytes in use.
    pub fn weighted_size(&self) -> u64 {
        self.cache.weighted_size()
    }

    pub fn max_size_bytes(&self) -> u64 {
        self.max_size_bytes
    }

    /// Applies pending eviction work.
    pub fn run_pending_tasks(&self) {
        self.cache.run_pending_tasks();
    }

    fn key(namespace: &str, tile_key: &str) -> BlobKey {
        (namespace.to_string(), tile_key.to_string())
    }
}

impl BlobCache for MemoryBlobCache {
    fn get<'a>(
        &'a self,
        namespace: &'a str,
        tile_key: &'a str,
    ) -> BoxFuture<'a, TileResult<Option<Tile>>> {
        Box::pin(async move { Ok(self.cache.get(&Self::key(namespace, tile_key))) })
    }

    fn set<'a>(
        &'a self,
        namespace: &'a str,
        tile_key: &'a str,
        tile: &'a Tile,
    ) -> BoxFuture<'a, TileResult<()>> {
        Box::pin(async move {
            self.cache
                .insert(Self::key(namespace, tile_key), tile.clone());
            Ok(())
        })
    }

    fn reset<'a>(
        &'a self,
        namespace: &'a str,
        tile_key: Option<&'a str>,
    ) -> BoxFuture<'a, TileResult<()>> {
        Box::pin(async move {
            match tile_key {
                Some(tile_key) => self.cache.invalidate(&Self::key(namespace, tile_key)),
                None => {
                    let keys: Vec<_> = self
                        .cache
                        .iter()
                        .filter(|(key, _)| key.0 == namespace)
                        .map(|(key, _)| key)
                        .collect();
                    debug!(namespace, count = keys.len(), "Resetting blob namespace");
                    for key in keys {
                        self.cache.invalidate(key.as_ref());
                    }
                }
            }
            Ok(())
        })
    }

    fn name(&self) -> &str {
        "memory"
    }
}

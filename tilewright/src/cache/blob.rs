//! Rendered-tile cache capability.

use futures::future::BoxFuture;

use crate::coord::TileCoord;
use crate::error::TileResult;
use crate::tile::Tile;

/// Key/value store for rendered tiles.
///
/// Entries are grouped into namespaces of the form `<source>@<extension>` so
/// that every tile of one source and format can be dropped with a single
/// [`reset`](BlobCache::reset). Implementations own only bytes and headers;
/// nothing needs disposal on eviction.
pub trait BlobCache: Send + Sync {
    /// Returns the tile stored under `tile_key`, or `None` on a miss.
    fn get<'a>(
        &'a self,
        namespace: &'a str,
        tile_key: &'a str,
    ) -> BoxFuture<'a, TileResult<Option<Tile>>>;

    /// Stores `tile` under `tile_key`.
    fn set<'a>(
        &'a self,
        namespace: &'a str,
        tile_key: &'a str,
        tile: &'a Tile,
    ) -> BoxFuture<'a, TileResult<()>>;

    /// Drops one tile, or the whole namespace when `tile_key` is `None`.
    fn reset<'a>(
        &'a self,
        namespace: &'a str,
        tile_key: Option<&'a str>,
    ) -> BoxFuture<'a, TileResult<()>>;

    /// Backend name for logging.
    fn name(&self) -> &str;
}

/// Namespace holding every tile of `source` in one format.
pub fn blob_namespace(source: &str, extension: &str) -> String {
    format!("{}@{}", source, extension)
}

/// Key of one tile inside its namespace.
///
/// The renderer cache key comes first so tiles rendered with different
/// key-relevant parameters never collide.
pub fn blob_tile_key(renderer_cache_key: &str, coord: &TileCoord) -> String {
    format!(
        "{}/{}/{}/{}",
        renderer_cache_key,
        coord.z(),
        coord.x(),
        coord.y()
    )
}

/// Blob cache that stores nothing.
///
/// Used when caching is disabled in configuration.
#[derive(Debug, Clone, Default)]
pub struct NoOpBlobCache;

impl BlobCache for NoOpBlobCache {
    fn get<'a>(
        &'a self,
        _namespace: &'a str,
        _tile_key: &'a str,
    ) -> BoxFuture<'a, TileResult<Option<Tile>>> {
        Box::pin(async { Ok(None) })
    }

    fn set<'a>(
        &'a self,
        _namespace: &'a str,
        _tile_key: &'a str,
        _tile: &'a Tile,
    ) -> BoxFuture<'a, TileResult<()>> {
        Box::pin(async { Ok(()) })
    }

    fn reset<'a>(
        &'a self,
        _namespace: &'a str,
        _tile_key: Option<&'a str>,
    ) -> BoxFuture<'a, TileResult<()>> {
        Box::pin(async { Ok(()) })
    }

    fn name(&self) -> &str {
        "none"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coord::TileFormat;

    #[test]
    fn test_namespace_format() {
        assert_eq!(blob_namespace("roads", "pbf"), "roads@pbf");
        assert_eq!(blob_namespace("roads", "grid.json"), "roads@grid.json");
    }

    #[test]
    fn test_tile_key_includes_renderer_cache_key() {
        let coord = TileCoord::new(3, 4, 5, TileFormat::Png).unwrap();
        assert_eq!(blob_tile_key("", &coord), "/3/4/5");
        assert_eq!(blob_tile_key("lang=fr", &coord), "lang=fr/3/4/5");
    }

    #[tokio::test]
    async fn test_noop_always_misses() {
        let cache = NoOpBlobCache;
        let tile = Tile::new(vec![1, 2, 3]);

        cache.set("a@png", "/0/0/0", &tile).await.unwrap();
        assert!(cache.get("a@png", "/0/0/0").await.unwrap().is_none());
        assert!(cache.reset("a@png", None).await.is_ok());
    }
}

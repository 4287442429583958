//! Events emitted by engine components.

use crate::coord::{SourceKind, TileFormat};

/// Events emitted by the tile-source engine.
///
/// Events are fire-and-forget; producers never wait for a consumer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TileEvent {
    // =========================================================================
    // Provider lifecycle
    // =========================================================================
    /// A project was loaded and its provider opened.
    ProviderOpened { source: String },

    /// A provider was closed, or released by its last holder.
    ProviderClosed { source: String },

    /// A provider dropped its compiled configurations and reloaded the project.
    ProviderCleared { source: String },

    // =========================================================================
    // Tile sources
    // =========================================================================
    /// A configuration was compiled (or restored from an artifact).
    ConfigCompiled {
        source: String,
        cache_key: String,
        from_artifact: bool,
    },

    /// A ready tile source was built for one (cache key, kind) slot.
    SourcePrepared {
        source: String,
        cache_key: String,
        kind: SourceKind,
        composite: bool,
    },

    // =========================================================================
    // Resource pool
    // =========================================================================
    /// A renderer instance was opened by a pool.
    PoolInstanceCreated,

    /// A pooled renderer instance was destroyed when its pool closed.
    PoolInstanceDestroyed,

    // =========================================================================
    // Tiles
    // =========================================================================
    /// A tile was produced by the renderer.
    TileRendered {
        source: String,
        format: TileFormat,
        bytes: u64,
        duration_us: u64,
    },

    /// A tile was served from the blob cache.
    BlobCacheHit { source: String, format: TileFormat },

    /// The blob cache had no entry for a tile.
    BlobCacheMiss { source: String, format: TileFormat },

    /// The blob cache backend failed; the request degraded to a miss.
    BlobCacheError { source: String },

    /// All cached state of a source was invalidated.
    Invalidated { source: String },
}

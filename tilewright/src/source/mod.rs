//! Tile sources and their owners.
//!
//! ```text
//! TileSourceManager ──owns──► TileSourceProvider (one per project)
//!                                   │ owns
//!                                   ▼
//!                     PooledTileSource ──► ResourcePool<MapInstance>
//!                     CompositeTileSource ──borrows──► sibling sources
//! ```
//!
//! A [`TileSourceManager`] keeps one provider per project key. A provider
//! builds ready [`TileSource`]s lazily, one per (renderer cache key, source
//! kind). Closing a provider closes its sources at once; a cleared or
//! evicted provider or source is released when its last holder drops it.

mod composite;
mod manager;
mod pooled;
mod provider;

pub use composite::CompositeTileSource;
pub use manager::{validate_source_key, ManagerSettings, TileSourceManager};
pub use pooled::PooledTileSource;
pub use provider::{ProviderSettings, TileSourceProvider};

use futures::future::BoxFuture;

use crate::coord::TileCoord;
use crate::error::TileResult;
use crate::renderer::Metadata;
use crate::tile::Tile;

/// A ready handle that answers tile and metadata requests.
///
/// Owned by the provider that created it. Holders of an `Arc` may keep using
/// it after the provider dropped it. Only an explicit close cuts them off:
/// new renders then fail with
/// [`TileError::PoolClosed`](crate::error::TileError::PoolClosed).
pub trait TileSource: Send + Sync {
    fn get_tile<'a>(&'a self, coord: &'a TileCoord) -> BoxFuture<'a, TileResult<Tile>>;

    fn get_info(&self) -> BoxFuture<'_, TileResult<Metadata>>;

    /// Releases everything the source owns. Idempotent.
    fn close(&self) -> BoxFuture<'_, TileResult<()>>;
}

//! Tile source backed by a pool of renderer instances.

use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::warn;

use super::TileSource;
use crate::coord::TileCoord;
use crate::error::TileResult;
use crate::events::EventSink;
use crate::pool::{InstanceFactory, PoolStats, ResourcePool};
use crate::renderer::{CompiledConfig, MapInstance, Metadata, Renderer};
use crate::tile::{Tile, CONTENT_TYPE};

/// Renders one compiled configuration through a bounded set of map
/// instances.
///
/// Dropping the last handle closes the idle instances in the background.
pub struct PooledTileSource {
    pool: ResourcePool<Arc<dyn MapInstance>>,
}

impl PooledTileSource {
    pub fn new(
        source: &str,
        config: Arc<CompiledConfig>,
        renderer: Arc<dyn Renderer>,
        pool_size: usize,
        events: EventSink,
    ) -> Self {
        let factory = MapFactory {
            source: source.to_string(),
            config,
            renderer,
        };
        Self {
            pool: ResourcePool::new(source, Box::new(factory), pool_size, events),
        }
    }

    pub fn pool_stats(&self) -> PoolStats {
        self.pool.stats()
    }
}

impl TileSource for PooledTileSource {
    fn get_tile<'a>(&'a self, coord: &'a TileCoord) -> BoxFuture<'a, TileResult<Tile>> {
        let coord = *coord;
        Box::pin(async move {
            let tile = self
                .pool
                .with_instance(move |map| async move { map.render(&coord).await })
                .await?;

            if tile.header(CONTENT_TYPE).is_some() {
                Ok(tile)
            } else {
                Ok(tile.with_header(CONTENT_TYPE, coord.format().content_type()))
            }
        })
    }

    fn get_info(&self) -> BoxFuture<'_, TileResult<Metadata>> {
        Box::pin(async move {
            self.pool
                .with_instance(|map| async move { map.info().await })
                .await
        })
    }

    fn close(&self) -> BoxFuture<'_, TileResult<()>> {
        Box::pin(async move {
            self.pool.drain_and_close_all().await;
            Ok(())
        })
    }
}

impl Drop for PooledTileSource {
    fn drop(&mut self) {
        // Last holder gone without an explicit close
        self.pool.close_in_background();
    }
}

/// Opens map instances for one compiled configuration.
struct MapFactory {
    source: String,
    config: Arc<CompiledConfig>,
    renderer: Arc<dyn Renderer>,
}

impl InstanceFactory<Arc<dyn MapInstance>> for MapFactory {
    fn create(&self) -> BoxFuture<'_, TileResult<Arc<dyn MapInstance>>> {
        Box::pin(async move { self.renderer.open(&self.config).await })
    }

    fn destroy(&self, instance: Arc<dyn MapInstance>) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            if let Err(e) = instance.close().await {
                warn!(source = %self.source, error = %e, "Failed to close map instance");
            }
        })
    }
}

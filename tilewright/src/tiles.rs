//! Top-level tile service.
//!
//! [`TilesProvider`] is what the HTTP layer talks to. It resolves the
//! provider for a request, serves static sources through the blob cache and
//! renders dynamic ones directly.
//!
//! ```text
//! load_tile ──► provider ──► dynamic? ──yes──► render
//!                               │
//!                               no
//!                               ▼
//!                 blob cache ──hit──► tile
//!                     │
//!                    miss ──► coalesced render ──► store ──► tile
//! ```
//!
//! Every source carries an invalidation epoch. Renders are coalesced per
//! epoch, and a render that overlapped an invalidation of its source does
//! not leave its tile in the blob cache.

use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use tracing::{debug, info, warn};

use crate::cache::{
    blob_namespace, blob_tile_key, build_blob_cache, BlobCache, SingleFlightCache,
    SingleFlightConfig,
};
use crate::config::TilewrightConfig;
use crate::error::TileResult;
use crate::events::{EventSink, TileEvent};
use crate::renderer::{Collaborators, Metadata};
use crate::source::{ManagerSettings, TileSourceManager, TileSourceProvider};
use crate::tile::{InvalidateRequest, RenderParams, Tile, TileRequest};

/// (blob namespace, tile key, source generation)
type RenderKey = (String, String, u64);

/// Invalidation state of one source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Epoch {
    /// Bumped when an invalidation starts and again when it ends.
    generation: u64,
    /// Invalidations currently running.
    invalidating: u32,
}

type Epochs = Arc<DashMap<String, Epoch>>;

fn epoch_of(epochs: &Epochs, source: &str) -> Epoch {
    epochs.get(source).map(|e| *e).unwrap_or_default()
}

/// Marks one running invalidation; ends it on drop, even if the
/// invalidating future is cancelled.
struct Invalidation {
    epochs: Epochs,
    source: String,
}

impl Invalidation {
    fn begin(epochs: &Epochs, source: &str) -> Self {
        {
            let mut epoch = epochs.entry(source.to_string()).or_default();
            epoch.generation += 1;
            epoch.invalidating += 1;
        }
        Self {
            epochs: Arc::clone(epochs),
            source: source.to_string(),
        }
    }
}

impl Drop for Invalidation {
    fn drop(&mut self) {
        let mut epoch = self.epochs.entry(self.source.clone()).or_default();
        epoch.generation += 1;
        epoch.invalidating = epoch.invalidating.saturating_sub(1);
    }
}

/// Serves tiles from a [`TileSourceManager`] through a [`BlobCache`].
pub struct TilesProvider {
    manager: TileSourceManager,
    blob_cache: Arc<dyn BlobCache>,
    renders: SingleFlightCache<RenderKey, Tile>,
    epochs: Epochs,
    events: EventSink,
}

impl TilesProvider {
    pub fn new(
        manager: TileSourceManager,
        blob_cache: Arc<dyn BlobCache>,
        events: EventSink,
    ) -> Self {
        Self {
            manager,
            blob_cache,
            renders: SingleFlightCache::new("renders", SingleFlightConfig::coalescing_only()),
            epochs: Arc::new(DashMap::new()),
            events,
        }
    }

    /// Builds the manager and blob cache described by `config`.
    pub async fn from_config(
        config: &TilewrightConfig,
        collaborators: Collaborators,
        events: EventSink,
    ) -> TileResult<Self> {
        let blob_cache = build_blob_cache(&config.blob_cache).await?;
        let manager = TileSourceManager::new(
            ManagerSettings::from(config),
            collaborators,
            events.clone(),
        );
        Ok(Self::new(manager, blob_cache, events))
    }

    pub fn manager(&self) -> &TileSourceManager {
        &self.manager
    }

    /// Returns the tile for `request`.
    pub async fn load_tile(&self, request: &TileRequest) -> TileResult<Tile> {
        let epoch = epoch_of(&self.epochs, &request.source);
        let provider = self
            .manager
            .load_tile_source_provider(&request.source)
            .await?;

        if provider.is_dynamic_source(&request.params).await? {
            debug!(
                source = %request.source,
                tile = %request.coord,
                "Dynamic source, bypassing blob cache"
            );
            return RenderJob::new(self, provider, request).render().await;
        }

        let format = request.coord.format();
        let namespace = blob_namespace(&request.source, format.extension());
        let tile_key = blob_tile_key(&provider.cache_key(&request.params).await?, &request.coord);

        if !request.reload {
            match self.blob_cache.get(&namespace, &tile_key).await {
                Ok(Some(tile)) => {
                    debug!(namespace = %namespace, tile_key = %tile_key, "Blob cache hit");
                    self.events.emit(TileEvent::BlobCacheHit {
                        source: request.source.clone(),
                        format,
                    });
                    return Ok(tile);
                }
                Ok(None) => {
                    self.events.emit(TileEvent::BlobCacheMiss {
                        source: request.source.clone(),
                        format,
                    });
                }
                Err(e) => {
                    warn!(namespace = %namespace, error = %e, "Blob cache read failed, rendering");
                    self.events.emit(TileEvent::BlobCacheError {
                        source: request.source.clone(),
                    });
                }
            }
        }

        let store = StoreJob {
            blob_cache: Arc::clone(&self.blob_cache),
            epochs: Arc::clone(&self.epochs),
            started: epoch,
            namespace: namespace.clone(),
            tile_key: tile_key.clone(),
            events: self.events.clone(),
        };
        let job = RenderJob::new(self, provider, request);
        let key = (namespace, tile_key, epoch.generation);

        self.renders
            .get_or_create(key, move || async move {
                let tile = job.render().await?;
                store.run(job.source(), &tile).await;
                Ok(tile)
            })
            .await
    }

    /// Drops every cached tile of `request.source` in the requested formats
    /// and clears its provider.
    ///
    /// Both steps always run; the first failure is returned afterwards.
    pub async fn invalidate(&self, request: &InvalidateRequest) -> TileResult<()> {
        // Renders overlapping this call neither store their tiles nor are
        // joined by requests made after it returns.
        let _invalidation = Invalidation::begin(&self.epochs, &request.source);
        let mut first_error = None;

        for format in request.target_formats() {
            let namespace = blob_namespace(&request.source, format.extension());
            if let Err(e) = self.blob_cache.reset(&namespace, None).await {
                warn!(namespace = %namespace, error = %e, "Failed to reset blob namespace");
                first_error.get_or_insert(e);
            }
        }

        if let Err(e) = self
            .manager
            .clear_tile_source_provider(&request.source)
            .await
        {
            first_error.get_or_insert(e);
        }

        info!(source = %request.source, "Invalidated source");
        self.events.emit(TileEvent::Invalidated {
            source: request.source.clone(),
        });
        first_error.map_or(Ok(()), Err)
    }

    /// Metadata of `source` for `params`.
    pub async fn get_info(&self, source: &str, params: &RenderParams) -> TileResult<Metadata> {
        let provider = self.manager.load_tile_source_provider(source).await?;
        provider.get_info(&self.manager, params).await
    }

    /// Closes every provider.
    pub async fn close(&self) {
        self.manager.close().await;
    }
}

/// Writes a freshly rendered tile to the blob cache, unless its source was
/// invalidated while it rendered.
struct StoreJob {
    blob_cache: Arc<dyn BlobCache>,
    epochs: Epochs,
    /// Epoch of the source when the request arrived.
    started: Epoch,
    namespace: String,
    tile_key: String,
    events: EventSink,
}

impl StoreJob {
    fn is_current(&self, source: &str) -> bool {
        self.started.invalidating == 0
            && epoch_of(&self.epochs, source).generation == self.started.generation
    }

    async fn run(&self, source: &str, tile: &Tile) {
        if !self.is_current(source) {
            debug!(
                namespace = %self.namespace,
                tile_key = %self.tile_key,
                "Source invalidated during render, not storing"
            );
            return;
        }

        if let Err(e) = self.blob_cache.set(&self.namespace, &self.tile_key, tile).await {
            warn!(namespace = %self.namespace, error = %e, "Blob cache write failed");
            self.events.emit(TileEvent::BlobCacheError {
                source: source.to_string(),
            });
            return;
        }

        // An invalidate between the check and the write may have reset the
        // namespace before this tile landed in it.
        if !self.is_current(source) {
            if let Err(e) = self
                .blob_cache
                .reset(&self.namespace, Some(&self.tile_key))
                .await
            {
                warn!(namespace = %self.namespace, error = %e, "Failed to drop stale tile");
            }
        }
    }
}

/// Everything needed to render one tile, detached from the caller's borrow.
struct RenderJob {
    manager: TileSourceManager,
    provider: Arc<TileSourceProvider>,
    request: TileRequest,
    events: EventSink,
}

impl RenderJob {
    fn new(
        tiles: &TilesProvider,
        provider: Arc<TileSourceProvider>,
        request: &TileRequest,
    ) -> Self {
        Self {
            manager: tiles.manager.clone(),
            provider,
            request: request.clone(),
            events: tiles.events.clone(),
        }
    }

    fn source(&self) -> &str {
        &self.request.source
    }

    async fn render(&self) -> TileResult<Tile> {
        let coord = self.request.coord;
        let started = Instant::now();

        let kind = self.provider.source_kind(coord.format()).await?;
        let tile_source = self
            .provider
            .prepare_tile_source(&self.manager, &self.request.params, kind)
            .await?;
        let tile = tile_source.get_tile(&coord).await?;

        let elapsed = started.elapsed();
        debug!(
            source = %self.request.source,
            tile = %coord,
            bytes = tile.len(),
            elapsed_ms = elapsed.as_millis() as u64,
            "Rendered tile"
        );
        self.events.emit(TileEvent::TileRendered {
            source: self.request.source.clone(),
            format: coord.format(),
            bytes: tile.len() as u64,
            duration_us: elapsed.as_micros() as u64,
        });
        Ok(tile)
    }
}

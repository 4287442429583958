//! Owner of one project source.
//!
//! A [`TileSourceProvider`] loads its project once and builds ready tile
//! sources on demand. Two single-flight caches sit inside it:
//!
//! ```text
//! configs:  renderer cache key          -> Arc<CompiledConfig>
//! sources:  (renderer cache key, kind)  -> Arc<dyn TileSource>
//! ```
//!
//! The renderer cache key is derived from the parameters the compiled base
//! configuration declares as relevant, so requests differing only in other
//! parameters share one compile and one pool. For dynamic configurations
//! every parameter is relevant.
//!
//! Compiled configurations are also written to
//! `<artifact_root>/<source>/<hash>.json` and restored from there until the
//! provider is cleared.

use std::collections::hash_map::DefaultHasher;
use std::hash::Hasher;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::future::{try_join_all, BoxFuture};
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use super::composite::CompositeTileSource;
use super::manager::TileSourceManager;
use super::pooled::PooledTileSource;
use super::TileSource;
use crate::cache::{SingleFlightCache, SingleFlightConfig};
use crate::coord::{SourceKind, TileFormat};
use crate::error::{TileError, TileResult};
use crate::events::{EventSink, TileEvent};
use crate::renderer::{Collaborators, CompiledConfig, CompositeLayout, Metadata, ProjectDefinition};
use crate::tile::RenderParams;

/// Per-provider limits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderSettings {
    /// Root under which each provider keeps its compiled artifacts.
    pub artifact_root: PathBuf,
    /// Bounds of the compiled-config and tile-source caches.
    pub cache: SingleFlightConfig,
    /// Renderer instances per tile source.
    pub pool_size: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct SourceSlot {
    key: String,
    kind: SourceKind,
}

/// Produces ready tile sources for one project.
pub struct TileSourceProvider {
    source: String,
    directory: PathBuf,
    artifact_dir: PathBuf,
    settings: ProviderSettings,
    collaborators: Collaborators,
    project: RwLock<Option<Arc<ProjectDefinition>>>,
    closed: AtomicBool,
    configs: SingleFlightCache<String, Arc<CompiledConfig>>,
    sources: SingleFlightCache<SourceSlot, Arc<dyn TileSource>>,
    events: EventSink,
}

impl TileSourceProvider {
    /// Loads the project in `directory` and returns an open provider.
    pub async fn open(
        source: &str,
        directory: PathBuf,
        settings: ProviderSettings,
        collaborators: Collaborators,
        events: EventSink,
    ) -> TileResult<Arc<Self>> {
        let project = collaborators.loader.load(source, &directory).await?;

        let provider = Arc::new(Self {
            source: source.to_string(),
            artifact_dir: settings.artifact_root.join(source),
            directory,
            configs: SingleFlightCache::new(format!("{}/configs", source), settings.cache),
            sources: SingleFlightCache::new(format!("{}/sources", source), settings.cache),
            settings,
            collaborators,
            project: RwLock::new(Some(Arc::new(project))),
            closed: AtomicBool::new(false),
            events,
        });

        info!(
            source = %provider.source,
            directory = %provider.directory.display(),
            "Opened tile source provider"
        );
        provider.events.emit(TileEvent::ProviderOpened {
            source: provider.source.clone(),
        });
        Ok(provider)
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Returns a ready tile source for `params` and `kind`.
    ///
    /// Equivalent concurrent calls share one compile and one source build.
    /// Composite configurations asked for vector tiles resolve every layer
    /// through `manager` and merge them.
    ///
    /// The returned handle stays usable after the provider is cleared or
    /// evicted; it is closed once its last holder drops it.
    pub fn prepare_tile_source<'a>(
        self: &'a Arc<Self>,
        manager: &'a TileSourceManager,
        params: &'a RenderParams,
        kind: SourceKind,
    ) -> BoxFuture<'a, TileResult<Arc<dyn TileSource>>> {
        Box::pin(async move {
            let base = self.base_config().await?;
            let key = slot_key(&base, params);
            let slot = SourceSlot {
                key: key.clone(),
                kind,
            };

            // Layers of a composite build inside this slot's flight, so a
            // cycle has to be refused before joining it.
            if kind == SourceKind::Vector && self.sources.get(&slot).is_none() {
                self.check_composite_cycle(manager, params, Vec::new())
                    .await?;
            }

            let provider = Arc::clone(self);
            let manager = manager.clone();
            let params = params.clone();
            self.sources
                .get_or_create(slot, move || async move {
                    provider
                        .build_source(&manager, &base, key, params, kind)
                        .await
                })
                .await
        })
    }

    /// Follows composite layers from this source, failing when one leads
    /// back to a source already on `path`.
    ///
    /// Touches only projects and compiled configurations, never tile
    /// source slots.
    fn check_composite_cycle<'a>(
        self: &'a Arc<Self>,
        manager: &'a TileSourceManager,
        params: &'a RenderParams,
        mut path: Vec<String>,
    ) -> BoxFuture<'a, TileResult<()>> {
        Box::pin(async move {
            let base = self.base_config().await?;
            let config = self
                .config_for_key(&base, slot_key(&base, params), params)
                .await?;
            let Some(layout) = &config.composite else {
                return Ok(());
            };

            path.push(self.source.clone());
            for layer in &layout.layers {
                if path.contains(layer) {
                    return Err(TileError::configuration(
                        &self.source,
                        format!("composite cycle: {} -> {}", path.join(" -> "), layer),
                    ));
                }
                let provider = manager.load_tile_source_provider(layer).await?;
                provider
                    .check_composite_cycle(manager, params, path.clone())
                    .await?;
            }
            Ok(())
        })
    }

    async fn build_source(
        self: Arc<Self>,
        manager: &TileSourceManager,
        base: &CompiledConfig,
        key: String,
        params: RenderParams,
        kind: SourceKind,
    ) -> TileResult<Arc<dyn TileSource>> {
        let config = self.config_for_key(base, key.clone(), &params).await?;

        let source: Arc<dyn TileSource> = match (&config.composite, kind) {
            (Some(layout), SourceKind::Vector) => {
                Arc::new(self.build_composite(manager, layout, &params).await?)
            }
            _ => Arc::new(PooledTileSource::new(
                &self.source,
                Arc::clone(&config),
                Arc::clone(&self.collaborators.renderer),
                self.settings.pool_size,
                self.events.clone(),
            )),
        };

        debug!(source = %self.source, cache_key = %key, kind = %kind, "Prepared tile source");
        self.events.emit(TileEvent::SourcePrepared {
            source: self.source.clone(),
            cache_key: key,
            kind,
            composite: config.is_composite(),
        });
        Ok(source)
    }

    async fn build_composite(
        &self,
        manager: &TileSourceManager,
        layout: &CompositeLayout,
        params: &RenderParams,
    ) -> TileResult<CompositeTileSource> {
        let handles = try_join_all(layout.layers.iter().map(|layer| async move {
            let provider = manager.load_tile_source_provider(layer).await?;
            provider
                .prepare_tile_source(manager, params, SourceKind::Vector)
                .await
        }))
        .await?;

        Ok(CompositeTileSource::new(
            &self.source,
            layout.layers.iter().cloned().zip(handles).collect(),
            layout.interactivity.clone(),
        ))
    }

    /// True when the source's output depends on parameters at render time,
    /// which rules out blob caching.
    pub async fn is_dynamic_source(&self, params: &RenderParams) -> TileResult<bool> {
        let base = self.base_config().await?;
        if base.is_dynamic() {
            return Ok(true);
        }
        let config = self
            .config_for_key(&base, slot_key(&base, params), params)
            .await?;
        Ok(config.is_dynamic())
    }

    /// Slot kind that serves `format`.
    ///
    /// Composite projects answer both vector tiles and interactivity grids
    /// from their merged layers; everything else follows the format.
    pub async fn source_kind(&self, format: TileFormat) -> TileResult<SourceKind> {
        if (format.is_vector() || format.is_grid()) && self.base_config().await?.is_composite() {
            return Ok(SourceKind::Vector);
        }
        Ok(format.kind())
    }

    /// Renderer cache key for `params`, used to namespace cached tiles.
    pub async fn cache_key(&self, params: &RenderParams) -> TileResult<String> {
        Ok(self.base_config().await?.cache_key(params))
    }

    /// Metadata of the source that would answer requests with `params`.
    pub async fn get_info(
        self: &Arc<Self>,
        manager: &TileSourceManager,
        params: &RenderParams,
    ) -> TileResult<Metadata> {
        let kind = if self.base_config().await?.is_composite() {
            SourceKind::Vector
        } else {
            SourceKind::Raster
        };
        self.prepare_tile_source(manager, params, kind)
            .await?
            .get_info()
            .await
    }

    /// Drops compiled artifacts and cached sources and reloads the project.
    ///
    /// Prepares already in flight finish against the old configuration;
    /// calls made after this returns see the reloaded project.
    pub async fn clear(&self) -> TileResult<()> {
        self.ensure_open()?;
        let mut first_error = None;

        match tokio::fs::remove_dir_all(&self.artifact_dir).await {
            Ok(()) => debug!(source = %self.source, "Removed compiled artifacts"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                warn!(source = %self.source, error = %e, "Failed to remove compiled artifacts");
                first_error.get_or_insert(TileError::from(e));
            }
        }

        // Swap the project before invalidating so nothing built after the
        // invalidation can see the old one.
        match self
            .collaborators
            .loader
            .load(&self.source, &self.directory)
            .await
        {
            Ok(project) => *self.project.write() = Some(Arc::new(project)),
            Err(e) => {
                warn!(source = %self.source, error = %e, "Failed to reload project");
                first_error.get_or_insert(e);
            }
        }

        self.configs.invalidate_all();
        self.sources.invalidate_all();

        info!(source = %self.source, "Cleared tile source provider");
        self.events.emit(TileEvent::ProviderCleared {
            source: self.source.clone(),
        });
        first_error.map_or(Ok(()), Err)
    }

    /// Releases the project and closes every tile source. Idempotent.
    pub async fn close(&self) -> TileResult<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        self.project.write().take();
        self.configs.drain();

        let mut first_error = None;
        for tile_source in self.sources.drain() {
            if let Err(e) = tile_source.close().await {
                warn!(source = %self.source, error = %e, "Failed to close tile source");
                first_error.get_or_insert(e);
            }
        }

        info!(source = %self.source, "Closed tile source provider");
        self.events.emit(TileEvent::ProviderClosed {
            source: self.source.clone(),
        });
        first_error.map_or(Ok(()), Err)
    }

    /// Number of ready tile sources.
    pub fn source_count(&self) -> u64 {
        self.sources.run_pending_tasks();
        self.sources.entry_count()
    }

    fn ensure_open(&self) -> TileResult<()> {
        if self.is_closed() {
            return Err(TileError::configuration(&self.source, "provider is closed"));
        }
        Ok(())
    }

    fn project(&self) -> TileResult<Arc<ProjectDefinition>> {
        self.ensure_open()?;
        self.project
            .read()
            .clone()
            .ok_or_else(|| TileError::configuration(&self.source, "provider is closed"))
    }

    /// Configuration compiled without parameters; decides the key parameters
    /// and whether the source is dynamic.
    async fn base_config(&self) -> TileResult<Arc<CompiledConfig>> {
        self.compiled_config(String::new(), RenderParams::new(), true)
            .await
    }

    async fn config_for_key(
        &self,
        base: &CompiledConfig,
        key: String,
        params: &RenderParams,
    ) -> TileResult<Arc<CompiledConfig>> {
        if base.is_dynamic() {
            self.compiled_config(key, params.clone(), false).await
        } else {
            self.compiled_config(key, params.only(&base.key_params), true)
                .await
        }
    }

    async fn compiled_config(
        &self,
        key: String,
        params: RenderParams,
        persist: bool,
    ) -> TileResult<Arc<CompiledConfig>> {
        self.ensure_open()?;

        let compile = CompileJob {
            source: self.source.clone(),
            key: key.clone(),
            params,
            artifact_dir: persist.then(|| self.artifact_dir.clone()),
            project: self.project()?,
            collaborators: self.collaborators.clone(),
            events: self.events.clone(),
        };
        self.configs.get_or_create(key, move || compile.run()).await
    }
}

impl Drop for TileSourceProvider {
    fn drop(&mut self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        // Tile sources close themselves as their own last holders let go.
        info!(source = %self.source, "Released tile source provider");
        self.events.emit(TileEvent::ProviderClosed {
            source: self.source.clone(),
        });
    }
}

/// One compile, restored from or saved to disk when it has an artifact
/// directory.
struct CompileJob {
    source: String,
    key: String,
    params: RenderParams,
    artifact_dir: Option<PathBuf>,
    project: Arc<ProjectDefinition>,
    collaborators: Collaborators,
    events: EventSink,
}

impl CompileJob {
    async fn run(self) -> TileResult<Arc<CompiledConfig>> {
        let artifact = self
            .artifact_dir
            .as_ref()
            .map(|dir| artifact_path(dir, &self.project.revision, &self.key));

        if let Some(path) = &artifact {
            if let Some(config) = read_artifact(path).await {
                debug!(
                    source = %self.source,
                    cache_key = %self.key,
                    "Restored compiled configuration"
                );
                self.emit(true);
                return Ok(Arc::new(config));
            }
        }

        let config = self
            .collaborators
            .compiler
            .compile(&self.project, &self.params)
            .await?;

        if let Some(path) = &artifact {
            if let Err(e) = write_artifact(path, &config).await {
                warn!(
                    source = %self.source,
                    path = %path.display(),
                    error = %e,
                    "Failed to save compiled configuration"
                );
            }
        }

        debug!(source = %self.source, cache_key = %self.key, "Compiled configuration");
        self.emit(false);
        Ok(Arc::new(config))
    }

    fn emit(&self, from_artifact: bool) {
        self.events.emit(TileEvent::ConfigCompiled {
            source: self.source.clone(),
            cache_key: self.key.clone(),
            from_artifact,
        });
    }
}

/// Key of the source/config slot serving `params`.
fn slot_key(base: &CompiledConfig, params: &RenderParams) -> String {
    if base.is_dynamic() {
        params.to_query()
    } else {
        base.cache_key(params)
    }
}

fn artifact_path(dir: &Path, revision: &str, key: &str) -> PathBuf {
    let mut hasher = DefaultHasher::new();
    hasher.write(revision.as_bytes());
    hasher.write_u8(0);
    hasher.write(key.as_bytes());
    dir.join(format!("{:016x}.json", hasher.finish()))
}

async fn read_artifact(path: &Path) -> Option<CompiledConfig> {
    let raw = tokio::fs::read(path).await.ok()?;
    match serde_json::from_slice(&raw) {
        Ok(config) => Some(config),
        Err(e) => {
            debug!(path = %path.display(), error = %e, "Ignoring unreadable artifact");
            None
        }
    }
}

async fn write_artifact(path: &Path, config: &CompiledConfig) -> TileResult<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let raw = serde_json::to_vec_pretty(config)
        .map_err(|e| TileError::Internal(format!("serializing compiled configuration: {}", e)))?;
    tokio::fs::write(path, raw).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_key_static_uses_declared_params() {
        let base = CompiledConfig::new("doc").with_key_params(["lang"]);
        let params = RenderParams::new().with("lang", "fr").with("debug", "1");
        assert_eq!(slot_key(&base, &params), "lang=fr");
    }

    #[test]
    fn test_slot_key_dynamic_uses_every_param() {
        let base = CompiledConfig::new("doc")
            .with_key_params(["lang"])
            .with_dynamic(true);
        let params = RenderParams::new().with("lang", "fr").with("debug", "1");
        assert_eq!(slot_key(&base, &params), "debug=1&lang=fr");
    }

    #[test]
    fn test_artifact_path_depends_on_revision_and_key() {
        let dir = Path::new("/artifacts/roads");
        let a = artifact_path(dir, "r1", "");
        let b = artifact_path(dir, "r2", "");
        let c = artifact_path(dir, "r1", "lang=fr");

        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_eq!(a, artifact_path(dir, "r1", ""));
        assert!(a.starts_with(dir));
        assert_eq!(a.extension().and_then(|e| e.to_str()), Some("json"));
    }

    #[tokio::test]
    async fn test_artifact_round_trip() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = artifact_path(&temp.path().join("roads"), "r1", "");
        let config = CompiledConfig::new("doc").with_key_params(["lang"]);

        write_artifact(&path, &config).await.unwrap();
        assert_eq!(read_artifact(&path).await, Some(config));
    }

    #[tokio::test]
    async fn test_corrupt_artifact_is_ignored() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("bad.json");
        tokio::fs::write(&path, b"{ not json").await.unwrap();

        assert!(read_artifact(&path).await.is_none());
    }
}

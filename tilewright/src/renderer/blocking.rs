//! Adapter for renderers with blocking native APIs.
//!
//! Native map engines render synchronously and report failures as text. The
//! adapter moves every native call onto tokio's blocking pool so the async
//! workers are never stalled, and translates failure text into
//! [`TileError`](crate::error::TileError) once, here.

use std::sync::Arc;

use futures::future::BoxFuture;
use tokio::task::JoinError;

use super::{CompiledConfig, MapInstance, Metadata, Renderer};
use crate::coord::TileCoord;
use crate::error::{translate_native_error, TileError, TileResult};
use crate::tile::Tile;

/// A blocking native rendering engine.
pub trait NativeRenderer: Send + Sync + 'static {
    type Map: NativeMap;

    /// Opens a map for `config`. Errors are the engine's own message.
    fn open(&self, config: &CompiledConfig) -> Result<Self::Map, String>;
}

/// A map opened by a [`NativeRenderer`].
pub trait NativeMap: Send + Sync + 'static {
    fn render(&self, coord: &TileCoord) -> Result<Tile, String>;
    fn info(&self) -> Result<Metadata, String>;
    fn close(&self) -> Result<(), String>;
}

/// [`Renderer`] over a [`NativeRenderer`].
pub struct BlockingRenderer<R> {
    native: Arc<R>,
}

impl<R: NativeRenderer> BlockingRenderer<R> {
    pub fn new(native: R) -> Self {
        Self {
            native: Arc::new(native),
        }
    }
}

impl<R: NativeRenderer> Renderer for BlockingRenderer<R> {
    fn open<'a>(
        &'a self,
        config: &'a CompiledConfig,
    ) -> BoxFuture<'a, TileResult<Arc<dyn MapInstance>>> {
        let native = Arc::clone(&self.native);
        let config = config.clone();
        Box::pin(async move {
            let map = run_blocking(move || native.open(&config)).await?;
            Ok(Arc::new(BlockingMapInstance { map: Arc::new(map) }) as Arc<dyn MapInstance>)
        })
    }
}

struct BlockingMapInstance<M> {
    map: Arc<M>,
}

impl<M: NativeMap> MapInstance for BlockingMapInstance<M> {
    fn render<'a>(&'a self, coord: &'a TileCoord) -> BoxFuture<'a, TileResult<Tile>> {
        let map = Arc::clone(&self.map);
        let coord = *coord;
        Box::pin(run_blocking(move || map.render(&coord)))
    }

    fn info(&self) -> BoxFuture<'_, TileResult<Metadata>> {
        let map = Arc::clone(&self.map);
        Box::pin(run_blocking(move || map.info()))
    }

    fn close(&self) -> BoxFuture<'_, TileResult<()>> {
        let map = Arc::clone(&self.map);
        Box::pin(run_blocking(move || map.close()))
    }
}

async fn run_blocking<T, F>(call: F) -> TileResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, String> + Send + 'static,
{
    tokio::task::spawn_blocking(call)
        .await
        .map_err(join_error)?
        .map_err(|message| translate_native_error(&message))
}

fn join_error(e: JoinError) -> TileError {
    TileError::Internal(format!("native call aborted: {}", e))
}

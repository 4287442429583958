//! Boundary to the external map toolchain.
//!
//! The engine never renders pixels or parses stylesheets itself. It drives
//! three collaborators through the traits in this module:
//!
//! - [`ProjectLoader`] reads a project definition from its directory.
//! - [`ConfigCompiler`] turns a project plus render parameters into a
//!   [`CompiledConfig`] the renderer understands.
//! - [`Renderer`] opens a [`MapInstance`] for a compiled configuration.
//!
//! Every method returns a boxed future so the traits stay object safe and
//! can be injected as `Arc<dyn ...>`. Engines with blocking native APIs
//! implement [`NativeRenderer`] instead and are adapted by
//! [`BlockingRenderer`].

mod blocking;
mod config;
mod project;

pub use blocking::{BlockingRenderer, NativeMap, NativeRenderer};
pub use config::{CompiledConfig, CompositeLayout, JsonConfigCompiler};
pub use project::{JsonProjectLoader, ProjectDefinition, PROJECT_FILE};

use std::path::Path;
use std::sync::Arc;

use futures::future::BoxFuture;

use crate::coord::TileCoord;
use crate::error::TileResult;
use crate::tile::{RenderParams, Tile};

/// Source metadata (TileJSON-like object).
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// One opened native map, able to render tiles for a single configuration.
///
/// Instances are not assumed to be safe for concurrent renders; the pool
/// hands each one to a single caller at a time.
pub trait MapInstance: Send + Sync {
    /// Renders one tile.
    fn render<'a>(&'a self, coord: &'a TileCoord) -> BoxFuture<'a, TileResult<Tile>>;

    /// Returns the metadata of the map.
    fn info(&self) -> BoxFuture<'_, TileResult<Metadata>>;

    /// Releases native resources.
    fn close(&self) -> BoxFuture<'_, TileResult<()>>;
}

/// Opens map instances.
pub trait Renderer: Send + Sync {
    fn open<'a>(
        &'a self,
        config: &'a CompiledConfig,
    ) -> BoxFuture<'a, TileResult<Arc<dyn MapInstance>>>;
}

/// Compiles a project into a renderer configuration.
pub trait ConfigCompiler: Send + Sync {
    fn compile<'a>(
        &'a self,
        project: &'a ProjectDefinition,
        params: &'a RenderParams,
    ) -> BoxFuture<'a, TileResult<CompiledConfig>>;
}

/// Loads project definitions.
pub trait ProjectLoader: Send + Sync {
    /// Loads the project `name` stored in `directory`.
    fn load<'a>(
        &'a self,
        name: &'a str,
        directory: &'a Path,
    ) -> BoxFuture<'a, TileResult<ProjectDefinition>>;
}

/// The external toolchain a manager drives.
#[derive(Clone)]
pub struct Collaborators {
    pub loader: Arc<dyn ProjectLoader>,
    pub compiler: Arc<dyn ConfigCompiler>,
    pub renderer: Arc<dyn Renderer>,
}

impl Collaborators {
    pub fn new(
        loader: Arc<dyn ProjectLoader>,
        compiler: Arc<dyn ConfigCompiler>,
        renderer: Arc<dyn Renderer>,
    ) -> Self {
        Self {
            loader,
            compiler,
            renderer,
        }
    }
}

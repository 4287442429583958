//! Tilewright - tile source lifecycle, caching and dispatch
//!
//! This library sits between an HTTP tile endpoint and a map renderer. It
//! turns `(source, z/x/y.format, params)` requests into tiles while keeping
//! expensive renderer state alive and shared:
//!
//! - [`source::TileSourceManager`] keeps one [`source::TileSourceProvider`] per
//!   project, opened on first use and closed once evicted and released.
//! - Each provider compiles the project per cache key and keeps a pool of
//!   renderer instances ([`pool::ResourcePool`]) per compiled configuration.
//! - Composite vector projects stitch the tiles of their layer sources
//!   ([`source::CompositeTileSource`]).
//! - [`tiles::TilesProvider`] fronts everything with a blob cache
//!   (in-memory or Redis) and coalesces concurrent renders of the same tile.
//!
//! Concurrent requests for the same provider, configuration, tile source or
//! tile share a single construction ([`cache::SingleFlightCache`]).
//!
//! # Example
//!
//! ```ignore
//! use tilewright::config::TilewrightConfig;
//! use tilewright::coord::{TileCoord, TileFormat};
//! use tilewright::events::EventSink;
//! use tilewright::tile::TileRequest;
//! use tilewright::tiles::TilesProvider;
//!
//! let config = TilewrightConfig::load_from(Path::new("tilewright.ini"))?;
//! let tiles = TilesProvider::from_config(&config, collaborators, EventSink::disabled()).await?;
//!
//! let coord = TileCoord::new(3, 4, 2, TileFormat::Png)?;
//! let tile = tiles.load_tile(&TileRequest::new("world", coord)).await?;
//! ```

pub mod cache;
pub mod config;
pub mod coord;
pub mod error;
pub mod events;
pub mod logging;
pub mod pool;
pub mod renderer;
pub mod source;
pub mod tile;
pub mod tiles;

pub use error::{TileError, TileResult};
pub use tiles::TilesProvider;

/// Version of the tilewright library.
///
/// The version is defined in `Cargo.toml` and injected at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

//! Tile coordinates and output formats.
//!
//! A [`TileCoord`] pins down one tile (`z/x/y`) in one [`TileFormat`]. The
//! format also decides which renderer pipeline ([`SourceKind`]) serves it.

mod types;

pub use types::{SourceKind, TileCoord, TileFormat, MAX_ZOOM};

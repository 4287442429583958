//! Vector composite of several sibling sources.
//!
//! Vector tiles are protobuf messages, and concatenating two encoded
//! messages yields a valid message holding the layers of both. A composite
//! tile is therefore built by inflating each sub-tile, concatenating the raw
//! bytes in declaration order, and deflating once.

use std::io::{Read, Write};
use std::sync::Arc;

use flate2::read::{GzDecoder, ZlibDecoder};
use flate2::write::ZlibEncoder;
use flate2::Compression;
use futures::future::{join_all, BoxFuture};
use tracing::debug;

use super::TileSource;
use crate::coord::{TileCoord, TileFormat};
use crate::error::{TileError, TileResult};
use crate::renderer::Metadata;
use crate::tile::{Tile, CONTENT_ENCODING, CONTENT_TYPE};

/// Merges the tiles of N vector sub-sources.
///
/// The sub-sources belong to their own providers; closing the composite
/// releases nothing.
pub struct CompositeTileSource {
    source: String,
    layers: Vec<(String, Arc<dyn TileSource>)>,
    interactivity: Option<String>,
}

impl CompositeTileSource {
    pub fn new(
        source: impl Into<String>,
        layers: Vec<(String, Arc<dyn TileSource>)>,
        interactivity: Option<String>,
    ) -> Self {
        Self {
            source: source.into(),
            layers,
            interactivity,
        }
    }

    /// Sub-source names in output order.
    pub fn layer_names(&self) -> impl Iterator<Item = &str> {
        self.layers.iter().map(|(name, _)| name.as_str())
    }

    async fn merge(&self, coord: &TileCoord) -> TileResult<Tile> {
        // join_all yields results in input order whatever order they finish in
        let results = join_all(self.layers.iter().map(|(_, layer)| layer.get_tile(coord))).await;

        let mut raw = Vec::new();
        let mut present = 0;
        for ((name, _), result) in self.layers.iter().zip(results) {
            match result {
                Ok(tile) => {
                    let segment = inflate(&tile).map_err(|e| sub_source_error(name, e))?;
                    raw.extend_from_slice(&segment);
                    present += 1;
                }
                Err(e) if e.is_not_found() => {
                    debug!(source = %self.source, layer = %name, tile = %coord, "Sub-tile absent");
                }
                Err(e) => return Err(sub_source_error(name, e)),
            }
        }

        if present == 0 {
            return Err(TileError::TileNotFound);
        }

        let data = deflate(&raw)?;
        Ok(Tile::new(data)
            .with_header(CONTENT_TYPE, TileFormat::Pbf.content_type())
            .with_header(CONTENT_ENCODING, "deflate"))
    }

    async fn grid(&self, coord: &TileCoord) -> TileResult<Tile> {
        let Some(name) = &self.interactivity else {
            return Err(TileError::configuration(
                &self.source,
                "composite has no interactivity layer",
            ));
        };
        let Some((_, layer)) = self.layers.iter().find(|(layer, _)| layer == name) else {
            return Err(TileError::configuration(
                &self.source,
                format!("interactivity layer '{}' is not part of the composite", name),
            ));
        };
        layer.get_tile(coord).await
    }
}

impl TileSource for CompositeTileSource {
    fn get_tile<'a>(&'a self, coord: &'a TileCoord) -> BoxFuture<'a, TileResult<Tile>> {
        Box::pin(async move {
            let format = coord.format();
            if format.is_vector() {
                self.merge(coord).await
            } else if format.is_grid() {
                self.grid(coord).await
            } else {
                Err(TileError::InvalidRequest(format!(
                    "composite source '{}' cannot serve {} tiles",
                    self.source, format
                )))
            }
        })
    }

    fn get_info(&self) -> BoxFuture<'_, TileResult<Metadata>> {
        Box::pin(async move {
            let results = join_all(self.layers.iter().map(|(_, layer)| layer.get_info())).await;

            let mut merged = Metadata::new();
            for ((name, _), result) in self.layers.iter().zip(results) {
                let info = result.map_err(|e| sub_source_error(name, e))?;
                // Later layers win
                merged.extend(info);
            }
            Ok(merged)
        })
    }

    fn close(&self) -> BoxFuture<'_, TileResult<()>> {
        Box::pin(async { Ok(()) })
    }
}

fn sub_source_error(layer: &str, e: TileError) -> TileError {
    TileError::CompositeSubSource {
        layer: layer.to_string(),
        message: e.to_string(),
    }
}

/// Returns the raw payload of `tile`, undoing `deflate` or `gzip` encoding.
fn inflate(tile: &Tile) -> TileResult<Vec<u8>> {
    let mut out = Vec::with_capacity(tile.len() * 2);
    match tile.header(CONTENT_ENCODING).map(str::to_ascii_lowercase).as_deref() {
        None | Some("identity") => return Ok(tile.data.to_vec()),
        Some("deflate") => ZlibDecoder::new(tile.data.as_ref()).read_to_end(&mut out)?,
        Some("gzip") => GzDecoder::new(tile.data.as_ref()).read_to_end(&mut out)?,
        Some(other) => {
            return Err(TileError::InvalidRequest(format!(
                "unsupported content encoding '{}'",
                other
            )))
        }
    };
    Ok(out)
}

fn deflate(raw: &[u8]) -> TileResult<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::with_capacity(raw.len() / 2), Compression::default());
    encoder.write_all(raw)?;
    Ok(encoder.finish()?)
}

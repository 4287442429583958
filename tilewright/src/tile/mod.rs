//! Rendered tiles and the request surface.
//!
//! [`Tile`] is what every layer of the engine hands back: payload bytes plus
//! the response headers the renderer attached (content type, encoding).
//! [`TileRequest`] and [`InvalidateRequest`] are what the HTTP layer sends in.

mod request;

pub(crate) use request::query_pair;
pub use request::{InvalidateRequest, RenderParams, TileRequest};

use bytes::Bytes;
use std::collections::BTreeMap;

/// Response headers attached to a tile.
pub type TileHeaders = BTreeMap<String, String>;

/// Header carrying the payload encoding.
pub const CONTENT_ENCODING: &str = "Content-Encoding";

/// Header carrying the payload MIME type.
pub const CONTENT_TYPE: &str = "Content-Type";

/// A rendered tile: bytes plus headers.
///
/// `data` is reference counted so cached tiles can be handed out without
/// copying the payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tile {
    pub data: Bytes,
    pub headers: TileHeaders,
}

impl Tile {
    /// Creates a tile with no headers.
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            headers: TileHeaders::new(),
        }
    }

    /// Adds a header, replacing any existing value with the same name.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into();
        self.headers
            .retain(|existing, _| !existing.eq_ignore_ascii_case(&name));
        self.headers.insert(name, value.into());
        self
    }

    /// Looks up a header by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Payload size in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let tile = Tile::new(vec![1, 2, 3]).with_header("Content-Encoding", "deflate");
        assert_eq!(tile.header("content-encoding"), Some("deflate"));
        assert_eq!(tile.header("CONTENT-ENCODING"), Some("deflate"));
        assert_eq!(tile.header("Content-Type"), None);
    }

    #[test]
    fn test_with_header_replaces_existing() {
        let tile = Tile::new(Vec::new())
            .with_header("content-type", "image/png")
            .with_header("Content-Type", "image/jpeg");
        assert_eq!(tile.headers.len(), 1);
        assert_eq!(tile.header(CONTENT_TYPE), Some("image/jpeg"));
    }

    #[test]
    fn test_len() {
        let tile = Tile::new(vec![0u8; 10]);
        assert_eq!(tile.len(), 10);
        assert!(!tile.is_empty());
        assert!(Tile::new(Vec::new()).is_empty());
    }
}

//! Coordinate type definitions

use std::fmt;
use std::str::FromStr;

use crate::error::TileError;

/// Highest zoom level accepted by the tile path.
pub const MAX_ZOOM: u8 = 30;

/// Output format of a tile.
///
/// Raster formats (`Png`, `Jpeg`, `Svg`, `Pdf`) and interactivity grids share
/// the raster renderer pipeline; `Pbf` vector tiles use a separate one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TileFormat {
    Png,
    Jpeg,
    Pbf,
    GridJson,
    Svg,
    Pdf,
}

impl TileFormat {
    /// Every format the engine knows how to serve.
    pub const ALL: [TileFormat; 6] = [
        TileFormat::Png,
        TileFormat::Jpeg,
        TileFormat::Pbf,
        TileFormat::GridJson,
        TileFormat::Svg,
        TileFormat::Pdf,
    ];

    /// File extension used in URLs and cache keys.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpeg",
            Self::Pbf => "pbf",
            Self::GridJson => "grid.json",
            Self::Svg => "svg",
            Self::Pdf => "pdf",
        }
    }

    /// MIME type of a rendered tile in this format.
    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
            Self::Pbf => "application/x-protobuf",
            Self::GridJson => "application/json",
            Self::Svg => "image/svg+xml",
            Self::Pdf => "application/pdf",
        }
    }

    /// True for vector tiles.
    pub fn is_vector(&self) -> bool {
        matches!(self, Self::Pbf)
    }

    /// True for UTF interactivity grids.
    pub fn is_grid(&self) -> bool {
        matches!(self, Self::GridJson)
    }

    /// Renderer pipeline this format is produced by.
    pub fn kind(&self) -> SourceKind {
        if self.is_vector() {
            SourceKind::Vector
        } else {
            SourceKind::Raster
        }
    }
}

impl fmt::Display for TileFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for TileFormat {
    type Err = TileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "png" => Ok(Self::Png),
            "jpg" | "jpeg" => Ok(Self::Jpeg),
            "pbf" | "mvt" | "vector.pbf" | "vtile" => Ok(Self::Pbf),
            "grid.json" | "grid" => Ok(Self::GridJson),
            "svg" => Ok(Self::Svg),
            "pdf" => Ok(Self::Pdf),
            other => Err(TileError::InvalidRequest(format!(
                "unsupported tile format '{}'",
                other
            ))),
        }
    }
}

/// Renderer pipeline class.
///
/// Vector and raster requests use structurally different renderer pipelines
/// and never share a tile-source slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    Vector,
    Raster,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Vector => write!(f, "vector"),
            Self::Raster => write!(f, "raster"),
        }
    }
}

/// Tile coordinates in the XYZ (slippy map) scheme plus output format.
///
/// Fields are private so a constructed coordinate is always in range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileCoord {
    z: u8,
    x: u32,
    y: u32,
    format: TileFormat,
}

impl TileCoord {
    /// Creates a coordinate, validating zoom and x/y bounds.
    pub fn new(z: u8, x: u32, y: u32, format: TileFormat) -> Result<Self, TileError> {
        if z > MAX_ZOOM {
            return Err(TileError::InvalidRequest(format!(
                "zoom {} exceeds maximum {}",
                z, MAX_ZOOM
            )));
        }
        let limit = 1u64 << z;
        if u64::from(x) >= limit || u64::from(y) >= limit {
            return Err(TileError::InvalidRequest(format!(
                "tile {}/{}/{} outside the zoom {} grid",
                z, x, y, z
            )));
        }
        Ok(Self { z, x, y, format })
    }

    pub fn z(&self) -> u8 {
        self.z
    }

    pub fn x(&self) -> u32 {
        self.x
    }

    pub fn y(&self) -> u32 {
        self.y
    }

    pub fn format(&self) -> TileFormat {
        self.format
    }

    /// Same tile position in a different format.
    pub fn with_format(&self, format: TileFormat) -> Self {
        Self { format, ..*self }
    }
}

impl fmt::Display for TileCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}.{}", self.z, self.x, self.y, self.format)
    }
}

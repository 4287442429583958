//! Core error taxonomy.
//!
//! Every fallible operation on the tile path returns [`TileError`]. The type is
//! `Clone` so a single build failure can be delivered to every caller that
//! joined the same in-flight operation.

use std::sync::Arc;
use thiserror::Error;

/// Why a native render call failed.
///
/// Lets the transport layer pick a status code without parsing messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderFailure {
    /// The renderer could not read a referenced resource.
    Permission,
    /// A referenced resource (datasource, font, image) is missing.
    NotFound,
    /// Any other renderer fault.
    Other,
}

/// Stable classification of a [`TileError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Configuration,
    TileNotFound,
    Render,
    PoolClosed,
    CacheBackend,
    CompositeSubSource,
    InvalidRequest,
    Internal,
}

/// Errors produced by the tile-source engine.
#[derive(Debug, Clone, Error)]
pub enum TileError {
    /// Malformed or missing project definition.
    #[error("Configuration error for '{project}': {reason}")]
    Configuration { project: String, reason: String },

    /// The requested tile does not exist.
    #[error("Tile does not exist")]
    TileNotFound,

    /// The native renderer failed.
    #[error("Render error: {message}")]
    Render {
        failure: RenderFailure,
        message: String,
    },

    /// The resource pool is shutting down.
    #[error("Resource pool is closing")]
    PoolClosed,

    /// The blob cache backend is unreachable or misbehaving.
    #[error("Cache backend error: {0}")]
    CacheBackend(String),

    /// One layer of a composite source failed.
    #[error("Composite sub-source '{layer}' failed: {message}")]
    CompositeSubSource { layer: String, message: String },

    /// The request itself is malformed.
    #[error("Invalid tile request: {0}")]
    InvalidRequest(String),

    /// I/O failure while handling project files or artifacts.
    #[error("I/O error: {0}")]
    Io(Arc<std::io::Error>),

    /// A producer task died before delivering a result.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl TileError {
    /// Creates a configuration error for the given project.
    pub fn configuration(project: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Configuration {
            project: project.into(),
            reason: reason.into(),
        }
    }

    /// Returns the stable kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration { .. } => ErrorKind::Configuration,
            Self::TileNotFound => ErrorKind::TileNotFound,
            Self::Render { .. } => ErrorKind::Render,
            Self::PoolClosed => ErrorKind::PoolClosed,
            Self::CacheBackend(_) => ErrorKind::CacheBackend,
            Self::CompositeSubSource { .. } => ErrorKind::CompositeSubSource,
            Self::InvalidRequest(_) => ErrorKind::InvalidRequest,
            // Project files live with the configuration
            Self::Io(_) => ErrorKind::Configuration,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// True if the error means "this tile does not exist".
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::TileNotFound)
    }
}

impl From<std::io::Error> for TileError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(Arc::new(e))
    }
}

impl From<redis::RedisError> for TileError {
    fn from(e: redis::RedisError) -> Self {
        Self::CacheBackend(e.to_string())
    }
}

/// Translates a native renderer message into a [`TileError`].
///
/// Native engines report failures as free text. Messages that say the tile
/// itself does not exist become [`TileError::TileNotFound`]; permission and
/// missing-resource failures are tagged so the HTTP layer can map them.
pub fn translate_native_error(message: &str) -> TileError {
    let lower = message.to_lowercase();
    if lower.contains("tile does not exist") {
        return TileError::TileNotFound;
    }

    let failure = if lower.contains("permission denied") || lower.contains("eacces") {
        RenderFailure::Permission
    } else if lower.contains("no such file")
        || lower.contains("enoent")
        || lower.contains("not found")
    {
        RenderFailure::NotFound
    } else {
        RenderFailure::Other
    };

    TileError::Render {
        failure,
        message: message.to_string(),
    }
}

/// Result alias used throughout the crate.
pub type TileResult<T> = Result<T, TileError>;

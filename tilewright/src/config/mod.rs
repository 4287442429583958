//! Configuration for tilewright.
//!
//! Settings are read from an INI file (`tilewright.ini` by default). Every
//! key is optional; missing keys fall back to the values in [`defaults`].
//!
//! ```
//! use tilewright::config::{BlobBackend, TilewrightConfig};
//!
//! let config = TilewrightConfig::from_ini_str(
//!     "[pool]\nsize = 2\n\n[blob_cache]\nbackend = none\n",
//! )
//! .unwrap();
//!
//! assert_eq!(config.pool.size, 2);
//! assert_eq!(config.blob_cache.backend, BlobBackend::None);
//! ```

pub mod defaults;
mod file;
mod parser;
mod settings;
mod size;

pub use defaults::*;
pub use file::{ConfigFileError, CONFIG_FILE_NAME};
pub use settings::{
    BlobBackend, BlobCacheSettings, CacheSettings, PoolSettings, ProjectsSettings,
    TilewrightConfig,
};
pub use size::{format_size, parse_duration, parse_size, DurationParseError, SizeParseError};

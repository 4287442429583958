//! Loading `tilewright.ini`.

use ini::Ini;
use std::path::Path;
use thiserror::Error;

use super::settings::TilewrightConfig;

/// Default configuration file name.
pub const CONFIG_FILE_NAME: &str = "tilewright.ini";

/// Configuration file errors.
#[derive(Debug, Error)]
pub enum ConfigFileError {
    /// Failed to read or parse the file
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] ini::Error),

    /// Invalid configuration value
    #[error("Invalid configuration: {section}.{key} = '{value}' - {reason}")]
    InvalidValue {
        section: String,
        key: String,
        value: String,
        reason: String,
    },
}

impl TilewrightConfig {
    /// Loads configuration from `path`.
    ///
    /// A missing file yields the defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigFileError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let ini = Ini::load_from_file(path)?;
        super::parser::parse_ini(&ini)
    }

    /// Parses configuration from INI text.
    pub fn from_ini_str(text: &str) -> Result<Self, ConfigFileError> {
        let ini = Ini::load_from_str(text)
            .map_err(|e| ConfigFileError::ReadError(ini::Error::Parse(e)))?;
        super::parser::parse_ini(&ini)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_nonexistent_returns_defaults() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join(CONFIG_FILE_NAME);

        let config = TilewrightConfig::load_from(&path).unwrap();
        assert_eq!(config, TilewrightConfig::default());
    }

    #[test]
    fn test_load_from_file() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "[pool]\nsize = 2\n").unwrap();

        let config = TilewrightConfig::load_from(&path).unwrap();
        assert_eq!(config.pool.size, 2);
    }

    #[test]
    fn test_from_ini_str() {
        let config = TilewrightConfig::from_ini_str("[blob_cache]\nbackend = none\n").unwrap();
        assert_eq!(config.blob_cache.backend, super::super::BlobBackend::None);
    }
}

//! INI parsing: `Ini` → `TilewrightConfig`.
//!
//! The single place where INI key names are mapped to struct fields.

use ini::{Ini, Properties};
use std::path::PathBuf;
use std::time::Duration;

use super::file::ConfigFileError;
use super::settings::{BlobBackend, CacheSettings, TilewrightConfig};
use super::size::{parse_duration, parse_size};

fn invalid(section: &str, key: &str, value: &str, reason: impl Into<String>) -> ConfigFileError {
    ConfigFileError::InvalidValue {
        section: section.to_string(),
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.into(),
    }
}

/// A zero duration disables expiry.
fn parse_ttl(section: &str, key: &str, value: &str) -> Result<Option<Duration>, ConfigFileError> {
    let ttl = parse_duration(value).map_err(|e| invalid(section, key, value, e.to_string()))?;
    Ok((!ttl.is_zero()).then_some(ttl))
}

fn parse_path(section: &str, key: &str, value: &str) -> Result<PathBuf, ConfigFileError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(invalid(section, key, value, "must not be empty"));
    }
    Ok(PathBuf::from(value))
}

fn parse_cache_section(
    name: &str,
    section: &Properties,
    settings: &mut CacheSettings,
) -> Result<(), ConfigFileError> {
    if let Some(v) = section.get("max_entries") {
        settings.max_entries = v
            .trim()
            .parse()
            .map_err(|_| invalid(name, "max_entries", v, "must be a non-negative integer"))?;
    }
    if let Some(v) = section.get("ttl") {
        settings.ttl = parse_ttl(name, "ttl", v)?;
    }
    Ok(())
}

/// Parses an `Ini` into a `TilewrightConfig`.
///
/// Starts from `TilewrightConfig::default()` and overlays the values found.
pub(super) fn parse_ini(ini: &Ini) -> Result<TilewrightConfig, ConfigFileError> {
    let mut config = TilewrightConfig::default();

    // [projects]
    if let Some(section) = ini.section(Some("projects")) {
        if let Some(v) = section.get("root") {
            config.projects.root = parse_path("projects", "root", v)?;
        }
        if let Some(v) = section.get("artifacts") {
            config.projects.artifacts = parse_path("projects", "artifacts", v)?;
        }
    }

    // [providers] / [sources]
    if let Some(section) = ini.section(Some("providers")) {
        parse_cache_section("providers", section, &mut config.providers)?;
    }
    if let Some(section) = ini.section(Some("sources")) {
        parse_cache_section("sources", section, &mut config.sources)?;
    }

    // [pool]
    if let Some(section) = ini.section(Some("pool")) {
        if let Some(v) = section.get("size") {
            let size: usize = v
                .trim()
                .parse()
                .map_err(|_| invalid("pool", "size", v, "must be a positive integer"))?;
            if size == 0 {
                return Err(invalid("pool", "size", v, "must be at least 1"));
            }
            config.pool.size = size;
        }
    }

    // [blob_cache]
    if let Some(section) = ini.section(Some("blob_cache")) {
        if let Some(v) = section.get("backend") {
            config.blob_cache.backend = match v.trim().to_lowercase().as_str() {
                "memory" => BlobBackend::Memory,
                "redis" => BlobBackend::Redis,
                "none" | "off" => BlobBackend::None,
                _ => {
                    return Err(invalid(
                        "blob_cache",
                        "backend",
                        v,
                        "must be one of: memory, redis, none",
                    ))
                }
            };
        }
        if let Some(v) = section.get("max_size") {
            config.blob_cache.max_size_bytes =
                parse_size(v).map_err(|e| invalid("blob_cache", "max_size", v, e.to_string()))?;
        }
        if let Some(v) = section.get("ttl") {
            config.blob_cache.ttl = parse_ttl("blob_cache", "ttl", v)?;
        }
        if let Some(v) = section.get("redis_url") {
            let v = v.trim();
            if !v.starts_with("redis://") && !v.starts_with("rediss://") {
                return Err(invalid(
                    "blob_cache",
                    "redis_url",
                    v,
                    "must start with redis:// or rediss://",
                ));
            }
            config.blob_cache.redis_url = v.to_string();
        }
        if let Some(v) = section.get("key_prefix") {
            let v = v.trim();
            if v.is_empty() {
                return Err(invalid("blob_cache", "key_prefix", v, "must not be empty"));
            }
            config.blob_cache.key_prefix = v.to_string();
        }
    }

    Ok(config)
}

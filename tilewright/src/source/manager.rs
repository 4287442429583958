//! One provider per project.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{info, warn};

use super::provider::{ProviderSettings, TileSourceProvider};
use crate::cache::{SingleFlightCache, SingleFlightConfig};
use crate::config::TilewrightConfig;
use crate::error::{TileError, TileResult};
use crate::events::EventSink;
use crate::renderer::Collaborators;

/// Where projects live and how many providers to keep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagerSettings {
    /// Parent directory of every project directory.
    pub projects_root: PathBuf,
    /// Bounds of the provider cache.
    pub providers: SingleFlightConfig,
    pub provider: ProviderSettings,
}

impl From<&TilewrightConfig> for ManagerSettings {
    fn from(config: &TilewrightConfig) -> Self {
        Self {
            projects_root: config.projects.root.clone(),
            providers: SingleFlightConfig::new(config.providers.max_entries, config.providers.ttl),
            provider: ProviderSettings {
                artifact_root: config.projects.artifacts.clone(),
                cache: SingleFlightConfig::new(config.sources.max_entries, config.sources.ttl),
                pool_size: config.pool.size,
            },
        }
    }
}

/// Keeps one open [`TileSourceProvider`] per project key.
///
/// Providers are opened on first use. An evicted (LRU or TTL) or cleared
/// provider closes once the last request holding it finishes; closing the
/// manager closes every provider at once. Cloning is cheap and clones share
/// the same providers.
#[derive(Clone)]
pub struct TileSourceManager {
    providers: SingleFlightCache<String, Arc<TileSourceProvider>>,
    settings: Arc<ManagerSettings>,
    collaborators: Collaborators,
    events: EventSink,
}

impl TileSourceManager {
    pub fn new(settings: ManagerSettings, collaborators: Collaborators, events: EventSink) -> Self {
        Self {
            providers: SingleFlightCache::new("providers", settings.providers),
            settings: Arc::new(settings),
            collaborators,
            events,
        }
    }

    /// Returns the open provider for `source`, opening it on first use.
    ///
    /// A failed open is not cached.
    pub async fn load_tile_source_provider(
        &self,
        source: &str,
    ) -> TileResult<Arc<TileSourceProvider>> {
        validate_source_key(source)?;

        let name = source.to_string();
        let directory = self.settings.projects_root.join(source);
        let provider_settings = self.settings.provider.clone();
        let collaborators = self.collaborators.clone();
        let events = self.events.clone();

        self.providers
            .get_or_create(source.to_string(), move || async move {
                TileSourceProvider::open(&name, directory, provider_settings, collaborators, events)
                    .await
            })
            .await
    }

    /// Clears the provider for `source`, forgets it, and lets it close.
    ///
    /// The entry is dropped even when clearing fails. Requests already
    /// holding the provider finish on it; it closes when the last of them
    /// lets go, or right here when none does.
    pub async fn clear_tile_source_provider(&self, source: &str) -> TileResult<()> {
        let key = source.to_string();
        let provider = match self.providers.get(&key) {
            Some(provider) => provider,
            None => self.load_tile_source_provider(source).await?,
        };

        let cleared = provider.clear().await;
        self.providers.take(&key);
        drop(provider);

        if let Err(e) = &cleared {
            warn!(source, error = %e, "Failed to clear provider");
        }
        cleared
    }

    /// Closes every provider.
    pub async fn close(&self) {
        let providers = self.providers.drain();
        info!(count = providers.len(), "Closing tile source providers");
        for provider in providers {
            if let Err(e) = provider.close().await {
                warn!(source = %provider.source(), error = %e, "Failed to close provider");
            }
        }
    }

    /// Number of open providers.
    pub fn provider_count(&self) -> u64 {
        self.providers.run_pending_tasks();
        self.providers.entry_count()
    }

    pub fn settings(&self) -> &ManagerSettings {
        &self.settings
    }
}

/// Rejects source keys that are not a single, plain path segment.
pub fn validate_source_key(source: &str) -> TileResult<()> {
    let invalid = source.is_empty()
        || source == "."
        || source == ".."
        || source.contains(['/', '\\', '\0']);
    if invalid {
        return Err(TileError::InvalidRequest(format!(
            "invalid source key '{}'",
            source
        )));
    }
    Ok(())
}

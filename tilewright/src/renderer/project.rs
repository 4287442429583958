//! Project definitions and the JSON project loader.

use std::collections::hash_map::DefaultHasher;
use std::hash::Hasher;
use std::path::{Path, PathBuf};

use futures::future::BoxFuture;
use tracing::debug;

use super::ProjectLoader;
use crate::error::{TileError, TileResult};

/// File name of a project definition inside its directory.
pub const PROJECT_FILE: &str = "project.json";

/// A loaded, validated project.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectDefinition {
    /// Project source key.
    pub name: String,
    pub directory: PathBuf,
    pub document: serde_json::Value,
    /// Content hash; changes whenever the definition file changes.
    pub revision: String,
}

/// Loads `<directory>/project.json`.
#[derive(Debug, Clone, Default)]
pub struct JsonProjectLoader;

impl ProjectLoader for JsonProjectLoader {
    fn load<'a>(
        &'a self,
        name: &'a str,
        directory: &'a Path,
    ) -> BoxFuture<'a, TileResult<ProjectDefinition>> {
        Box::pin(async move {
            let path = directory.join(PROJECT_FILE);
            let raw = match tokio::fs::read(&path).await {
                Ok(raw) => raw,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    return Err(TileError::configuration(
                        name,
                        format!("missing {}", path.display()),
                    ))
                }
                Err(e) => return Err(e.into()),
            };

            let document: serde_json::Value = serde_json::from_slice(&raw).map_err(|e| {
                TileError::configuration(name, format!("invalid {}: {}", PROJECT_FILE, e))
            })?;
            if !document.is_object() {
                return Err(TileError::configuration(
                    name,
                    format!("{} must contain a JSON object", PROJECT_FILE),
                ));
            }

            let revision = content_revision(&raw);
            debug!(source = %name, revision = %revision, "Loaded project");

            Ok(ProjectDefinition {
                name: name.to_string(),
                directory: directory.to_path_buf(),
                document,
                revision,
            })
        })
    }
}

fn content_revision(raw: &[u8]) -> String {
    let mut hasher = DefaultHasher::new();
    hasher.write(raw);
    format!("{:016x}", hasher.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn write_project(dir: &Path, contents: &str) {
        tokio::fs::write(dir.join(PROJECT_FILE), contents)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_load_valid_project() {
        let temp = TempDir::new().unwrap();
        write_project(temp.path(), r#"{"style": "x"}"#).await;

        let project = JsonProjectLoader.load("roads", temp.path()).await.unwrap();

        assert_eq!(project.name, "roads");
        assert_eq!(project.directory, temp.path());
        assert_eq!(project.document["style"], "x");
        assert_eq!(project.revision.len(), 16);
    }

    #[tokio::test]
    async fn test_missing_project_is_configuration_error() {
        let temp = TempDir::new().unwrap();
        let err = JsonProjectLoader.load("roads", temp.path()).await.unwrap_err();
        assert!(matches!(err, TileError::Configuration { .. }));
    }

    #[tokio::test]
    async fn test_malformed_project_is_configuration_error() {
        let temp = TempDir::new().unwrap();
        write_project(temp.path(), "{ nope").await;

        let err = JsonProjectLoader.load("roads", temp.path()).await.unwrap_err();
        assert!(matches!(err, TileError::Configuration { .. }));
    }

    #[tokio::test]
    async fn test_revision_tracks_contents() {
        let temp = TempDir::new().unwrap();
        write_project(temp.path(), r#"{"v": 1}"#).await;
        let first = JsonProjectLoader.load("a", temp.path()).await.unwrap();

        write_project(temp.path(), r#"{"v": 2}"#).await;
        let second = JsonProjectLoader.load("a", temp.path()).await.unwrap();

        assert_ne!(first.revision, second.revision);
    }
}

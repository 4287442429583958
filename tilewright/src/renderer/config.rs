//! Compiled map configurations.

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{ConfigCompiler, ProjectDefinition};
use crate::error::{TileError, TileResult};
use crate::tile::{query_pair, RenderParams};

/// Vector sub-sources merged into one composite answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompositeLayout {
    /// Sibling source keys, in output order.
    pub layers: Vec<String>,
    /// Layer that answers interactivity-grid requests.
    #[serde(default)]
    pub interactivity: Option<String>,
}

/// A project compiled for one set of render parameters.
///
/// Serializable so compiled output can be written to disk and restored
/// without recompiling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompiledConfig {
    /// Renderer-specific document (map XML, style JSON, ...).
    pub document: String,
    /// Parameter names that change the rendered output and therefore the
    /// renderer cache key.
    #[serde(default)]
    pub key_params: Vec<String>,
    /// Output depends on parameters at render time; never blob-cached.
    #[serde(default)]
    pub dynamic: bool,
    #[serde(default)]
    pub composite: Option<CompositeLayout>,
}

impl CompiledConfig {
    pub fn new(document: impl Into<String>) -> Self {
        Self {
            document: document.into(),
            key_params: Vec::new(),
            dynamic: false,
            composite: None,
        }
    }

    pub fn with_key_params<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.key_params = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_dynamic(mut self, dynamic: bool) -> Self {
        self.dynamic = dynamic;
        self
    }

    pub fn with_composite(mut self, composite: CompositeLayout) -> Self {
        self.composite = Some(composite);
        self
    }

    /// Renderer cache key for `params`.
    ///
    /// Percent-encoded `name=value` pairs of the declared key parameters, in
    /// declaration order, joined by `&`. Parameters not supplied are
    /// skipped, so a request without any of them yields the empty key.
    pub fn cache_key(&self, params: &RenderParams) -> String {
        self.key_params
            .iter()
            .filter_map(|name| params.get(name).map(|value| query_pair(name, value)))
            .collect::<Vec<_>>()
            .join("&")
    }

    pub fn is_dynamic(&self) -> bool {
        self.dynamic
    }

    pub fn is_composite(&self) -> bool {
        self.composite.is_some()
    }
}

/// Compiler for projects whose definition is already renderer-ready JSON.
///
/// Reads its directives from top-level project keys:
///
/// ```json
/// {
///   "cache_key_params": ["lang"],
///   "dynamic": false,
///   "composite": { "layers": ["roads", "labels"], "interactivity": "labels" }
/// }
/// ```
///
/// The emitted document is the project with the parameters attached.
#[derive(Debug, Clone, Default)]
pub struct JsonConfigCompiler;

impl JsonConfigCompiler {
    fn compile_sync(
        &self,
        project: &ProjectDefinition,
        params: &RenderParams,
    ) -> TileResult<CompiledConfig> {
        let Some(root) = project.document.as_object() else {
            return Err(TileError::configuration(
                &project.name,
                "project document must be a JSON object",
            ));
        };

        let key_params = match root.get("cache_key_params") {
            None => Vec::new(),
            Some(value) => serde_json::from_value::<Vec<String>>(value.clone()).map_err(|e| {
                TileError::configuration(&project.name, format!("cache_key_params: {}", e))
            })?,
        };

        let dynamic = match root.get("dynamic") {
            None => false,
            Some(Value::Bool(flag)) => *flag,
            Some(other) => {
                return Err(TileError::configuration(
                    &project.name,
                    format!("dynamic must be a boolean, got {}", other),
                ))
            }
        };

        let composite = match root.get("composite") {
            None | Some(Value::Null) => None,
            Some(value) => {
                let layout: CompositeLayout = serde_json::from_value(value.clone()).map_err(|e| {
                    TileError::configuration(&project.name, format!("composite: {}", e))
                })?;
                validate_composite(&project.name, &layout)?;
                Some(layout)
            }
        };

        let params: serde_json::Map<String, Value> = params
            .iter()
            .map(|(k, v)| (k.to_string(), Value::String(v.to_string())))
            .collect();
        let document = json!({ "project": project.document, "params": params }).to_string();

        Ok(CompiledConfig {
            document,
            key_params,
            dynamic,
            composite,
        })
    }
}

impl ConfigCompiler for JsonConfigCompiler {
    fn compile<'a>(
        &'a self,
        project: &'a ProjectDefinition,
        params: &'a RenderParams,
    ) -> BoxFuture<'a, TileResult<CompiledConfig>> {
        Box::pin(async move { self.compile_sync(project, params) })
    }
}

fn validate_composite(project: &str, layout: &CompositeLayout) -> TileResult<()> {
    if layout.layers.is_empty() {
        return Err(TileError::configuration(project, "composite has no layers"));
    }
    if let Some(layer) = &layout.interactivity {
        if !layout.layers.contains(layer) {
            return Err(TileError::configuration(
                project,
                format!("interactivity layer '{}' is not a composite layer", layer),
            ));
        }
    }
    Ok(())
}

//! Request types consumed from the HTTP layer.

use std::collections::BTreeMap;

use crate::coord::{TileCoord, TileFormat};

/// Caller-supplied render overrides.
///
/// Ordered so that anything derived from it (cache keys, artifact names) is
/// deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct RenderParams(BTreeMap<String, String>);

impl RenderParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a parameter, returning `self` for chaining.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Keeps only the parameters named in `names`.
    pub fn only(&self, names: &[String]) -> Self {
        Self(
            self.0
                .iter()
                .filter(|(k, _)| names.contains(k))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        )
    }

    /// `k1=v1&k2=v2` in key order, names and values percent-encoded; empty
    /// for no parameters.
    pub fn to_query(&self) -> String {
        self.0
            .iter()
            .map(|(k, v)| query_pair(k, v))
            .collect::<Vec<_>>()
            .join("&")
    }
}

/// One percent-encoded `name=value` pair.
pub(crate) fn query_pair(name: &str, value: &str) -> String {
    format!(
        "{}={}",
        urlencoding::encode(name),
        urlencoding::encode(value)
    )
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for RenderParams {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// A request for one tile.
#[derive(Debug, Clone)]
pub struct TileRequest {
    /// Project source key.
    pub source: String,
    pub coord: TileCoord,
    pub params: RenderParams,
    /// Skip the blob cache lookup and overwrite whatever is stored.
    pub reload: bool,
}

impl TileRequest {
    pub fn new(source: impl Into<String>, coord: TileCoord) -> Self {
        Self {
            source: source.into(),
            coord,
            params: RenderParams::default(),
            reload: false,
        }
    }

    pub fn with_params(mut self, params: RenderParams) -> Self {
        self.params = params;
        self
    }

    pub fn with_reload(mut self, reload: bool) -> Self {
        self.reload = reload;
        self
    }
}

/// A request to drop every cached artifact of a source.
#[derive(Debug, Clone)]
pub struct InvalidateRequest {
    pub source: String,
    /// Formats whose blob cache entries should be reset. `None` means all.
    pub formats: Option<Vec<TileFormat>>,
}

impl InvalidateRequest {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            formats: None,
        }
    }

    pub fn with_formats(mut self, formats: Vec<TileFormat>) -> Self {
        self.formats = Some(formats);
        self
    }

    /// Formats to reset, expanding `None` to every known format.
    pub fn target_formats(&self) -> Vec<TileFormat> {
        match &self.formats {
            Some(formats) => formats.clone(),
            None => TileFormat::ALL.to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_params_are_ordered() {
        let params: RenderParams = [("b", "2"), ("a", "1")].into_iter().collect();
        let keys: Vec<&str> = params.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["a", "b"]);
    }

    #[test]
    fn test_render_params_get() {
        let params = RenderParams::new().with("style", "dark");
        assert_eq!(params.get("style"), Some("dark"));
        assert_eq!(params.get("missing"), None);
        assert!(!params.is_empty());
    }

    #[test]
    fn test_render_params_only_and_query() {
        let params = RenderParams::new()
            .with("lang", "fr")
            .with("color", "red")
            .with("debug", "1");

        let kept = params.only(&["lang".to_string(), "color".to_string()]);
        assert_eq!(kept.to_query(), "color=red&lang=fr");
        assert_eq!(RenderParams::new().to_query(), "");
    }

    #[test]
    fn test_to_query_escapes_names_and_values() {
        let params = RenderParams::new().with("a", "1&b=2").with("style/x", "dark mode");
        assert_eq!(params.to_query(), "a=1%26b%3D2&style%2Fx=dark%20mode");

        let split = RenderParams::new().with("a", "1").with("b", "2");
        assert_ne!(params.to_query(), split.to_query());
    }

    #[test]
    fn test_invalidate_defaults_to_all_formats() {
        let request = InvalidateRequest::new("roads");
        assert_eq!(request.target_formats().len(), TileFormat::ALL.len());

        let request = InvalidateRequest::new("roads").with_formats(vec![TileFormat::Png]);
        assert_eq!(request.target_formats(), vec![TileFormat::Png]);
    }

    #[test]
    fn test_tile_request_builders() {
        let coord = TileCoord::new(1, 0, 0, TileFormat::Png).unwrap();
        let request = TileRequest::new("A", coord)
            .with_params(RenderParams::new().with("k", "v"))
            .with_reload(true);
        assert_eq!(request.source, "A");
        assert!(request.reload);
        assert_eq!(request.params.get("k"), Some("v"));
    }
}

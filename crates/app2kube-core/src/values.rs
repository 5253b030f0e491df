//! Untyped values tree
//!
//! Every source (files, URLs, stdin, `--set*` flags) lands in one
//! [`Values`] mapping before it is decoded into an [`crate::Application`].

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use crate::error::{CoreError, Result};
use crate::strvals::{self, SetMode};

/// A values mapping; sources are layered onto it with [`Values::merge`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Values(pub JsonValue);

impl Values {
    pub fn new() -> Self {
        Self(JsonValue::Object(Map::new()))
    }

    /// Parse one YAML document
    ///
    /// An empty document yields empty values; any other non-mapping
    /// document is rejected.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        match serde_yaml::from_str::<JsonValue>(yaml)? {
            JsonValue::Null => Ok(Self::new()),
            doc @ JsonValue::Object(_) => Ok(Self(doc)),
            other => Err(CoreError::config(format!(
                "values document must be a mapping, got {}",
                kind_name(&other)
            ))),
        }
    }

    /// Layer `overlay` on top: mappings merge key by key, anything else
    /// (scalars and sequences alike) is replaced wholesale
    pub fn merge(&mut self, overlay: &Values) {
        layer(&mut self.0, &overlay.0);
    }

    /// Look up a dotted path; numeric segments index into sequences
    pub fn get(&self, path: &str) -> Option<&JsonValue> {
        path.split('.').try_fold(&self.0, |node, segment| match node {
            JsonValue::Object(map) => map.get(segment),
            JsonValue::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        })
    }

    /// Apply a `--set` expression (`a.b=1,list[0]=x`) with type inference
    pub fn apply_set(&mut self, expr: &str) -> Result<()> {
        self.apply("--set", expr, SetMode::Typed, &mut no_reader)
    }

    /// Apply a `--set-string` expression, keeping every value a string
    pub fn apply_set_string(&mut self, expr: &str) -> Result<()> {
        self.apply("--set-string", expr, SetMode::String, &mut no_reader)
    }

    /// Apply a `--set-file` expression; `reader` turns each path into the
    /// string stored at its key
    pub fn apply_set_file<F>(&mut self, expr: &str, mut reader: F) -> Result<()>
    where
        F: FnMut(&str) -> std::result::Result<String, String>,
    {
        let mut read = |path: &str| reader(path).map(JsonValue::String);
        self.apply("--set-file", expr, SetMode::File, &mut read)
    }

    fn apply(
        &mut self,
        flag: &'static str,
        expr: &str,
        mode: SetMode,
        reader: &mut dyn FnMut(&str) -> std::result::Result<JsonValue, String>,
    ) -> Result<()> {
        strvals::parse_into(expr, &mut self.0, mode, reader)
            .map_err(|message| CoreError::SetParse { flag, message })
    }

    /// YAML rendering with sorted mapping keys
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(&self.0)?)
    }

    pub fn inner(&self) -> &JsonValue {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.as_object().is_none_or(Map::is_empty)
    }
}

fn no_reader(_: &str) -> std::result::Result<JsonValue, String> {
    Err("file values are not allowed here".to_string())
}

fn kind_name(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "a boolean",
        JsonValue::Number(_) => "a number",
        JsonValue::String(_) => "a string",
        JsonValue::Array(_) => "a sequence",
        JsonValue::Object(_) => "a mapping",
    }
}

fn layer(base: &mut JsonValue, overlay: &JsonValue) {
    if let (JsonValue::Object(into), JsonValue::Object(from)) = (&mut *base, overlay) {
        for (key, value) in from {
            match into.get_mut(key) {
                Some(existing) => layer(existing, value),
                None => {
                    into.insert(key.clone(), value.clone());
                }
            }
        }
    } else {
        *base = overlay.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn yaml(text: &str) -> Values {
        Values::from_yaml(text).unwrap()
    }

    #[test]
    fn test_merge_nested_mappings() {
        let mut values = yaml("common:\n  image:\n    repository: example/app\n    tag: v1\nreplicas: 1\n");
        values.merge(&yaml("common:\n  image:\n    tag: v2\n    pullPolicy: Always\nreplicas: 3\n"));

        assert_eq!(values.get("common.image.repository").unwrap(), "example/app");
        assert_eq!(values.get("common.image.tag").unwrap(), "v2");
        assert_eq!(values.get("common.image.pullPolicy").unwrap(), "Always");
        assert_eq!(values.get("replicas").unwrap(), 3);
    }

    #[test]
    fn test_merge_replaces_sequences() {
        let mut values = yaml("ingress:\n  - host: a.example.com\n  - host: b.example.com\n");
        values.merge(&yaml("ingress:\n  - host: c.example.com\n"));

        assert_eq!(values.get("ingress").unwrap().as_array().unwrap().len(), 1);
        assert_eq!(values.get("ingress.0.host").unwrap(), "c.example.com");
        assert!(values.get("ingress.1").is_none());
    }

    #[test]
    fn test_later_source_wins() {
        let first = yaml("name: first\nenv:\n  A: '1'\n");
        let second = yaml("name: second\nenv:\n  B: '2'\n");

        let mut values = Values::new();
        values.merge(&first);
        values.merge(&second);

        assert_eq!(values.get("name").unwrap(), "second");
        assert_eq!(values.get("env.A").unwrap(), "1");
        assert_eq!(values.get("env.B").unwrap(), "2");
    }

    #[test]
    fn test_empty_document_is_empty_values() {
        assert!(yaml("").is_empty());
        assert!(yaml("# only a comment\n").is_empty());
        assert!(!yaml("name: web\n").is_empty());
    }

    #[test]
    fn test_non_mapping_document_rejected() {
        let err = Values::from_yaml("- a\n- b\n").unwrap_err();
        assert_eq!(err.to_string(), "values document must be a mapping, got a sequence");
    }

    #[test]
    fn test_set_infers_types() {
        let mut values = Values::new();
        for expr in ["common.image.tag=v2", "deployment.replicaCount=5", "common.letsencrypt=true"] {
            values.apply_set(expr).unwrap();
        }

        assert_eq!(values.get("common.image.tag").unwrap(), "v2");
        assert_eq!(values.get("deployment.replicaCount").unwrap(), 5);
        assert_eq!(values.get("common.letsencrypt").unwrap(), true);
    }

    #[test]
    fn test_set_string_keeps_strings() {
        let mut values = Values::new();
        values.apply_set_string("common.image.tag=1234,flag=true").unwrap();

        assert_eq!(values.get("common.image.tag").unwrap(), "1234");
        assert_eq!(values.get("flag").unwrap(), "true");
    }

    #[test]
    fn test_set_file_reads_content() {
        let mut values = Values::new();
        values
            .apply_set_file("secrets.cert=/tmp/cert.pem", |path| {
                assert_eq!(path, "/tmp/cert.pem");
                Ok("-----BEGIN-----".to_string())
            })
            .unwrap();

        assert_eq!(values.get("secrets.cert").unwrap(), "-----BEGIN-----");
    }

    #[test]
    fn test_set_file_reader_error() {
        let mut values = Values::new();
        let err = values
            .apply_set_file("a=missing.txt", |_| Err("no such file".to_string()))
            .unwrap_err();

        assert!(err.to_string().contains("--set-file"));
        assert!(err.to_string().contains("no such file"));
    }

    #[test]
    fn test_set_overrides_existing_tree() {
        let mut values = yaml("deployment:\n  containers:\n    app:\n      image: example/app:v1\n");
        values
            .apply_set("deployment.containers.app.image=example/app:v3")
            .unwrap();

        assert_eq!(
            values.get("deployment.containers.app.image").unwrap(),
            "example/app:v3"
        );
    }
}

//! Per-invocation settings shared by every command
//!
//! The CLI builds one `InvocationContext` from its flags and passes it down;
//! nothing here is global.

use std::path::{Path, PathBuf};

use crate::secrets::SecretKeys;

/// Values file picked up from the working directory when present
pub const DEFAULT_VALUES_FILE: &str = ".app2kube.yml";

/// Where the values tree comes from, in merge order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValueSources {
    /// Files or URLs; `-` is stdin and a trailing `?` marks the source optional
    pub files: Vec<String>,
    /// `--set` expressions
    pub set: Vec<String>,
    /// `--set-string` expressions
    pub set_string: Vec<String>,
    /// `--set-file` expressions
    pub set_file: Vec<String>,
}

impl ValueSources {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a `-f` argument, splitting comma separated lists
    pub fn add_files(&mut self, spec: &str) {
        self.files.extend(
            spec.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from),
        );
    }

    /// Put the default values file first when it exists in `dir`
    pub fn with_default_file(mut self, dir: &Path) -> Self {
        if dir.join(DEFAULT_VALUES_FILE).is_file() {
            let path = dir.join(DEFAULT_VALUES_FILE).to_string_lossy().into_owned();
            if !self.files.contains(&path) {
                self.files.insert(0, path);
            }
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
            && self.set.is_empty()
            && self.set_string.is_empty()
            && self.set_file.is_empty()
    }
}

/// Everything a command needs besides its own arguments
#[derive(Debug, Clone, Default)]
pub struct InvocationContext {
    pub sources: ValueSources,
    /// Namespace flag; wins over the values
    pub namespace: Option<String>,
    /// Emit the Namespace object in "all" output
    pub include_namespace: bool,
    /// Write the merged values here before loading the application
    pub snapshot: Option<PathBuf>,
    /// Print the merged values to stderr
    pub verbose: bool,
    /// Name the Deployment after the blue-green color the cluster expects next
    pub blue_green: bool,
    pub keys: SecretKeys,
}

impl InvocationContext {
    pub fn new(sources: ValueSources) -> Self {
        Self {
            sources,
            keys: SecretKeys::from_env(),
            ..Default::default()
        }
    }

    pub fn with_namespace(mut self, namespace: Option<String>) -> Self {
        self.namespace = namespace.filter(|ns| !ns.is_empty());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_files_splits_commas() {
        let mut sources = ValueSources::new();
        sources.add_files("a.yml, b.yml,,https://example.com/c.yml?");
        sources.add_files("-");
        assert_eq!(
            sources.files,
            vec!["a.yml", "b.yml", "https://example.com/c.yml?", "-"]
        );
    }

    #[test]
    fn test_default_file_goes_first() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(DEFAULT_VALUES_FILE), "name: web\n").unwrap();

        let mut sources = ValueSources::new();
        sources.add_files("override.yml");
        let sources = sources.with_default_file(dir.path());

        assert_eq!(sources.files.len(), 2);
        assert!(sources.files[0].ends_with(DEFAULT_VALUES_FILE));
        assert_eq!(sources.files[1], "override.yml");
    }

    #[test]
    fn test_default_file_absent() {
        let dir = tempfile::tempdir().unwrap();
        let sources = ValueSources::new().with_default_file(dir.path());
        assert!(sources.is_empty());
    }

    #[test]
    fn test_set_only_is_not_empty() {
        let sources = ValueSources {
            set: vec!["name=web".to_string()],
            ..Default::default()
        };
        assert!(!sources.is_empty());
    }

    #[test]
    fn test_empty_namespace_flag_ignored() {
        let ctx = InvocationContext::default().with_namespace(Some(String::new()));
        assert_eq!(ctx.namespace, None);
    }
}

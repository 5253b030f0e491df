//! Configuration loader
//!
//! Reads every values source (local files, stdin, HTTP URLs), runs the
//! templating pass, parses the result and merges the documents left to right.
//! `--set`, `--set-string` and `--set-file` overrides are applied afterwards,
//! in that order.

use std::path::Path;
use std::time::Duration;

use app2kube_core::{ValueSources, Values};
use tokio::io::AsyncReadExt;

use crate::engine::Engine;
use crate::error::{EngineError, Result};

/// Marks a values source as optional
pub const OPTIONAL_SUFFIX: char = '?';

/// Reads values from standard input
pub const STDIN_SOURCE: &str = "-";

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Loads and merges values sources
pub struct ValuesLoader {
    engine: Engine,
    client: reqwest::Client,
    stdin: Option<String>,
}

impl ValuesLoader {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .user_agent(concat!("app2kube/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| EngineError::Network {
                url: String::new(),
                message: e.to_string(),
            })?;

        Ok(Self {
            engine: Engine::default(),
            client,
            stdin: None,
        })
    }

    /// Serve `-` from this content instead of the process stdin
    pub fn with_stdin(mut self, content: impl Into<String>) -> Self {
        self.stdin = Some(content.into());
        self
    }

    /// Load, template, parse and merge every source
    pub async fn load(&self, sources: &ValueSources) -> Result<Values> {
        if sources.is_empty() {
            return Err(EngineError::config("values are required"));
        }

        let mut merged = Values::new();

        for spec in &sources.files {
            let (source, optional) = match spec.strip_suffix(OPTIONAL_SUFFIX) {
                Some(source) => (source, true),
                None => (spec.as_str(), false),
            };

            let Some(content) = self.read_source(source, optional).await? else {
                continue;
            };

            let rendered = self.engine.render_values(&content, source)?;
            let values = Values::from_yaml(&rendered).map_err(|e| EngineError::Parse {
                source_name: source.to_string(),
                message: e.to_string(),
            })?;

            tracing::debug!(source, "merged values source");
            merged.merge(&values);
        }

        for expr in &sources.set {
            merged.apply_set(expr)?;
        }
        for expr in &sources.set_string {
            merged.apply_set_string(expr)?;
        }
        for expr in &sources.set_file {
            merged.apply_set_file(expr, |path| {
                std::fs::read_to_string(path).map_err(|e| format!("{path}: {e}"))
            })?;
        }

        Ok(merged)
    }

    /// Read one source; `None` when an optional source is unavailable
    async fn read_source(&self, source: &str, optional: bool) -> Result<Option<String>> {
        let result = if source == STDIN_SOURCE {
            self.read_stdin().await
        } else if is_url(source) {
            self.fetch(source).await
        } else {
            tokio::fs::read_to_string(source)
                .await
                .map_err(|error| EngineError::ReadSource {
                    source_name: source.to_string(),
                    error,
                })
        };

        match result {
            Ok(content) => Ok(Some(content)),
            Err(e) if optional => {
                tracing::warn!(source, error = %e, "skipping optional values source");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn read_stdin(&self) -> Result<String> {
        if let Some(content) = &self.stdin {
            return Ok(content.clone());
        }

        let mut content = String::new();
        tokio::io::stdin()
            .read_to_string(&mut content)
            .await
            .map_err(|error| EngineError::ReadSource {
                source_name: "stdin".to_string(),
                error,
            })?;
        Ok(content)
    }

    async fn fetch(&self, url: &str) -> Result<String> {
        let network = |message: String| EngineError::Network {
            url: url.to_string(),
            message,
        };

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(network(format!("HTTP {status}")));
        }

        response.text().await.map_err(|e| network(e.to_string()))
    }
}

fn is_url(source: &str) -> bool {
    url::Url::parse(source)
        .map(|u| matches!(u.scheme(), "http" | "https"))
        .unwrap_or(false)
}

/// Merged values with a provenance header
pub fn snapshot_text(values: &Values) -> Result<String> {
    let header = format!(
        "# Snapshot of values saved by app2kube {} in {}\n---\n",
        env!("CARGO_PKG_VERSION"),
        chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC")
    );
    Ok(header + &values.to_yaml()?)
}

/// Write the merged values snapshot to `path`
pub fn write_snapshot(values: &Values, path: &Path) -> Result<()> {
    std::fs::write(path, snapshot_text(values)?)?;
    tracing::info!(path = %path.display(), "saved values snapshot");
    Ok(())
}

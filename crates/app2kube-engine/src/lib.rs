//! app2kube Engine - from values sources to Kubernetes manifests
//!
//! This crate turns layered values into resources:
//! - `ValuesLoader`: reads files, stdin and URLs, runs the MiniJinja pass and merges
//! - `process_container`: fills containers from the application's shared settings
//! - `builders`: one builder per resource kind
//! - `Manifest`: ordered assembly and YAML/JSON serialization

pub mod builders;
pub mod container;
pub mod engine;
pub mod error;
pub mod filters;
pub mod functions;
pub mod loader;
pub mod manifest;
pub mod suggestions;

pub use container::{effective_services, process_container};
pub use engine::Engine;
pub use error::{EngineError, Result, TemplateError, TemplateErrorKind};
pub use loader::{ValuesLoader, snapshot_text, write_snapshot};
pub use manifest::{Manifest, ManifestObject, OutputFormat, OutputKind, assemble};
pub use suggestions::{AVAILABLE_FILTERS, AVAILABLE_FUNCTIONS};

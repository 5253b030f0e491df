//! app2kube Core - Application model and values handling
//!
//! This crate provides the foundational types used throughout app2kube:
//! - `Values`: Untyped configuration tree with deep merge and `--set` support
//! - `Application`: Typed, normalized application description
//! - `InvocationContext`: Per-invocation sources and flags
//! - `SecretKeys`: AES/RSA encryption of secret values

pub mod app;
pub mod context;
pub mod error;
pub mod secrets;
mod strvals;
pub mod values;

pub use app::{
    Application, Color, Common, CronJobSpec, DeploymentSpec, ImageSpec, IngressDefaults,
    IngressRule, LABEL_COLOR, LABEL_INSTANCE, LABEL_MANAGED_BY, LABEL_NAME, MANAGED_BY,
    ServiceSpec, VolumeSpec,
};
pub use context::{DEFAULT_VALUES_FILE, InvocationContext, ValueSources};
pub use error::{CoreError, Result};
pub use secrets::SecretKeys;
pub use values::Values;

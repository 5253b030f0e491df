//! Error types for app2kube-kube

use thiserror::Error;

/// Result type for cluster operations
pub type Result<T> = std::result::Result<T, KubeError>;

/// Errors that can occur while talking to the cluster
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum KubeError {
    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    Api(#[from] kube::Error),

    /// Rollout did not become ready before the deadline
    #[error("timed out after {after} waiting for {resource}")]
    Timeout { resource: String, after: String },

    /// No Service matched the application selector
    #[error("no services found for selector '{selector}' in namespace '{namespace}'")]
    NoServices { namespace: String, selector: String },

    /// The live Service carries no color in its selector
    #[error("color not found in selector of service '{service}'")]
    NoColor { service: String },

    /// One or more objects failed during apply or delete
    #[error("{operation} failed for {count} object(s):\n{details}")]
    OperationFailed {
        operation: String,
        count: usize,
        details: String,
    },

    /// Invalid configuration (kubeconfig, unknown resource type, bad flag)
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Manifest could not be built
    #[error(transparent)]
    Engine(#[from] app2kube_engine::EngineError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for KubeError {
    fn from(e: serde_json::Error) -> Self {
        KubeError::Serialization(e.to_string())
    }
}

impl KubeError {
    /// Check if this is a Kubernetes 404 Not Found error
    pub fn is_not_found(&self) -> bool {
        matches!(self, KubeError::Api(kube::Error::Api(resp)) if resp.code == 404)
    }

    /// Check if this is a conflict error (409)
    pub fn is_conflict(&self) -> bool {
        matches!(self, KubeError::Api(kube::Error::Api(resp)) if resp.code == 409)
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, KubeError::Timeout { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::core::ErrorResponse;

    fn api_error(code: u16) -> KubeError {
        KubeError::Api(kube::Error::Api(ErrorResponse {
            status: "Failure".to_string(),
            message: "boom".to_string(),
            reason: String::new(),
            code,
        }))
    }

    #[test]
    fn test_status_helpers() {
        assert!(api_error(404).is_not_found());
        assert!(!api_error(404).is_conflict());
        assert!(api_error(409).is_conflict());
        assert!(!KubeError::InvalidConfig("x".into()).is_not_found());
    }

    #[test]
    fn test_timeout_display() {
        let err = KubeError::Timeout {
            resource: "deployment/web-blue".to_string(),
            after: "1m".to_string(),
        };
        assert!(err.is_timeout());
        assert_eq!(err.to_string(), "timed out after 1m waiting for deployment/web-blue");
    }

    #[test]
    fn test_no_services_display() {
        let err = KubeError::NoServices {
            namespace: "default".to_string(),
            selector: "app.kubernetes.io/name=web".to_string(),
        };
        assert!(err.to_string().starts_with("no services found"));
    }
}

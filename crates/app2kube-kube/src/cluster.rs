//! The cluster seam
//!
//! Everything app2kube needs from Kubernetes goes through [`Cluster`], so the
//! blue-green flow and the rollout tracker run the same way against a real
//! API server ([`crate::KubeCluster`]) and in tests ([`crate::MockCluster`]).

use std::collections::BTreeMap;
use std::time::Duration;

use app2kube_core::{Color, LABEL_COLOR};
use app2kube_engine::Manifest;
use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::{KubeError, Result};

/// Name, labels and selector of a live Service
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceInfo {
    pub name: String,
    pub labels: BTreeMap<String, String>,
    pub selector: BTreeMap<String, String>,
}

impl ServiceInfo {
    /// Color the Service currently routes to
    pub fn color(&self) -> Option<Color> {
        self.selector.get(LABEL_COLOR)?.parse().ok()
    }
}

/// Replica counts of a Deployment rollout
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RolloutStatus {
    pub desired: i32,
    pub ready: i32,
    pub updated: i32,
    pub available: i32,
    pub generation: i64,
    pub observed_generation: i64,
    /// Messages of failing conditions, if any
    pub message: Option<String>,
}

impl RolloutStatus {
    /// A rollout that is complete with `replicas` pods
    pub fn ready(replicas: i32) -> Self {
        Self {
            desired: replicas,
            ready: replicas,
            updated: replicas,
            available: replicas,
            generation: 1,
            observed_generation: 1,
            message: None,
        }
    }

    /// Every replica updated, ready and available for the current generation
    pub fn is_ready(&self) -> bool {
        self.observed_generation >= self.generation
            && self.ready == self.desired
            && self.updated == self.desired
            && self.available == self.desired
    }

    pub fn progress(&self) -> String {
        let counts = format!(
            "{}/{} ready, {}/{} updated, {}/{} available",
            self.ready, self.desired, self.updated, self.desired, self.available, self.desired
        );
        match &self.message {
            Some(message) => format!("{counts} ({message})"),
            None => counts,
        }
    }
}

/// Options for [`Cluster::apply`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyOptions {
    /// Send the request with server-side dry run
    pub dry_run: bool,
    /// Delete objects of the applied kinds that match this selector but are
    /// absent from the manifest
    pub prune_selector: Option<String>,
}

/// One line of container output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLine {
    pub pod: String,
    pub container: String,
    pub line: String,
}

/// Summary of apply/delete operations
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OperationSummary {
    /// Successfully processed objects
    pub succeeded: Vec<String>,
    /// Failed objects with errors
    pub failed: Vec<(String, String)>,
    /// Skipped objects with the reason
    pub skipped: Vec<(String, String)>,
}

impl OperationSummary {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failed.len() + self.skipped.len()
    }

    /// Format as human-readable summary
    pub fn summary(&self) -> String {
        let mut parts = Vec::with_capacity(3);
        if !self.succeeded.is_empty() {
            parts.push(format!("{} succeeded", self.succeeded.len()));
        }
        if !self.failed.is_empty() {
            parts.push(format!("{} failed", self.failed.len()));
        }
        if !self.skipped.is_empty() {
            parts.push(format!("{} skipped", self.skipped.len()));
        }
        if parts.is_empty() {
            "No resources processed".to_string()
        } else {
            parts.join(", ")
        }
    }

    /// Turn recorded failures into an error
    pub fn into_result(self, operation: &str) -> Result<Self> {
        if self.is_success() {
            return Ok(self);
        }

        let details = self
            .failed
            .iter()
            .map(|(name, error)| format!("  {name}: {error}"))
            .collect::<Vec<_>>()
            .join("\n");
        Err(KubeError::OperationFailed {
            operation: operation.to_string(),
            count: self.failed.len(),
            details,
        })
    }
}

/// Cluster operations used by the commands and the blue-green flow
#[async_trait]
pub trait Cluster: Send + Sync {
    /// Services in `namespace` whose labels match `selector`
    async fn list_services(&self, namespace: &str, selector: &str) -> Result<Vec<ServiceInfo>>;

    /// Server-side apply every object of `manifest`, in order
    async fn apply(
        &self,
        namespace: &str,
        manifest: &Manifest,
        options: &ApplyOptions,
    ) -> Result<OperationSummary>;

    /// Delete every object of `manifest`, in reverse order
    async fn delete(
        &self,
        namespace: &str,
        manifest: &Manifest,
        ignore_not_found: bool,
    ) -> Result<OperationSummary>;

    async fn delete_deployment(&self, namespace: &str, name: &str) -> Result<()>;

    /// Set one key of a Service's selector
    async fn patch_service_selector(
        &self,
        namespace: &str,
        name: &str,
        key: &str,
        value: &str,
    ) -> Result<()>;

    /// Current rollout of a Deployment; `None` when it does not exist
    async fn deployment_status(&self, namespace: &str, name: &str)
    -> Result<Option<RolloutStatus>>;

    /// Follow the logs of every container in pods matching `selector`,
    /// starting `since` ago (`None` for everything retained)
    async fn follow_logs(
        &self,
        namespace: &str,
        selector: &str,
        since: Option<Duration>,
    ) -> Result<BoxStream<'static, Result<LogLine>>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_color() {
        let mut service = ServiceInfo {
            name: "web-http".to_string(),
            ..Default::default()
        };
        assert_eq!(service.color(), None);

        service
            .selector
            .insert(LABEL_COLOR.to_string(), "green".to_string());
        assert_eq!(service.color(), Some(Color::Green));

        service
            .selector
            .insert(LABEL_COLOR.to_string(), "purple".to_string());
        assert_eq!(service.color(), None);
    }

    #[test]
    fn test_rollout_readiness() {
        assert!(RolloutStatus::ready(3).is_ready());

        let scaling = RolloutStatus {
            ready: 1,
            ..RolloutStatus::ready(3)
        };
        assert!(!scaling.is_ready());
        assert_eq!(scaling.progress(), "1/3 ready, 3/3 updated, 3/3 available");

        let stale = RolloutStatus {
            generation: 2,
            ..RolloutStatus::ready(1)
        };
        assert!(!stale.is_ready());
    }

    #[test]
    fn test_progress_with_message() {
        let status = RolloutStatus {
            ready: 0,
            message: Some("Available: MinimumReplicasUnavailable".to_string()),
            ..RolloutStatus::ready(1)
        };
        assert!(status.progress().ends_with("(Available: MinimumReplicasUnavailable)"));
    }

    #[test]
    fn test_operation_summary() {
        let summary = OperationSummary {
            succeeded: vec!["Deployment/web".to_string(), "Service/web-http".to_string()],
            skipped: vec![("Secret/web".to_string(), "not found".to_string())],
            ..Default::default()
        };
        assert!(summary.is_success());
        assert_eq!(summary.total(), 3);
        assert_eq!(summary.summary(), "2 succeeded, 1 skipped");
        assert!(summary.into_result("apply").is_ok());

        assert_eq!(OperationSummary::default().summary(), "No resources processed");
    }

    #[test]
    fn test_operation_summary_failures() {
        let summary = OperationSummary {
            failed: vec![("Ingress/web".to_string(), "forbidden".to_string())],
            ..Default::default()
        };
        let err = summary.into_result("apply").unwrap_err();
        assert_eq!(
            err.to_string(),
            "apply failed for 1 object(s):\n  Ingress/web: forbidden"
        );
    }
}

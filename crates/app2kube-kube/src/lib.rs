//! app2kube Kube - cluster operations
//!
//! This crate provides:
//! - **Cluster interface**: the [`Cluster`] trait, its kube-rs implementation
//!   and an in-memory mock for tests
//! - **Rollout tracking**: wait for a Deployment to become ready, follow logs
//! - **Blue-green**: color detection, deploy with cutover, rollback and prune

pub mod bluegreen;
pub mod client;
pub mod cluster;
pub mod error;
pub mod mock;
pub mod tracker;

pub use bluegreen::{BlueGreen, DeployOptions, DeployReport, RollbackReport, Stage};
pub use client::{FIELD_MANAGER, KubeCluster};
pub use cluster::{
    ApplyOptions, Cluster, LogLine, OperationSummary, RolloutStatus, ServiceInfo,
};
pub use error::{KubeError, Result};
pub use mock::MockCluster;
pub use tracker::{
    DEFAULT_POLL_INTERVAL, DEFAULT_TIMEOUT_MINUTES, LogsSince, RolloutTracker,
    timeout_from_minutes,
};

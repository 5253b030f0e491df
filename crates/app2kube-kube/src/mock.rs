//! In-memory [`Cluster`] for tests
//!
//! Applied Services and Deployments become live objects, so a blue-green
//! cycle can be driven end to end. Every mutating call is recorded.

use std::collections::{BTreeMap, VecDeque};
use std::time::Duration;

use app2kube_engine::Manifest;
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use serde_json::Value as JsonValue;
use tokio::sync::Mutex;

use crate::cluster::{
    ApplyOptions, Cluster, LogLine, OperationSummary, RolloutStatus, ServiceInfo,
};
use crate::error::{KubeError, Result};

type Key = (String, String);

#[derive(Debug, Default)]
struct MockState {
    services: BTreeMap<Key, ServiceInfo>,
    /// Scripted rollout statuses; the last one sticks
    rollouts: BTreeMap<Key, VecDeque<RolloutStatus>>,
    logs: Vec<LogLine>,
    calls: Vec<String>,
    fail_list: bool,
}

/// Records calls and keeps Services and Deployments in memory
#[derive(Debug, Default)]
pub struct MockCluster {
    state: Mutex<MockState>,
}

impl MockCluster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a live Service
    pub fn with_service(mut self, namespace: &str, service: ServiceInfo) -> Self {
        self.state
            .get_mut()
            .services
            .insert((namespace.to_string(), service.name.clone()), service);
        self
    }

    /// Seed the statuses a Deployment reports, one per poll
    pub fn with_rollout(
        mut self,
        namespace: &str,
        name: &str,
        statuses: impl IntoIterator<Item = RolloutStatus>,
    ) -> Self {
        self.state
            .get_mut()
            .rollouts
            .insert((namespace.to_string(), name.to_string()), statuses.into_iter().collect());
        self
    }

    pub fn with_logs(mut self, logs: impl IntoIterator<Item = LogLine>) -> Self {
        self.state.get_mut().logs.extend(logs);
        self
    }

    /// Make `list_services` fail
    pub fn with_failing_list(mut self) -> Self {
        self.state.get_mut().fail_list = true;
        self
    }

    /// Calls in order, e.g. `apply default Deployment/web-blue`
    pub async fn calls(&self) -> Vec<String> {
        self.state.lock().await.calls.clone()
    }

    pub async fn service(&self, namespace: &str, name: &str) -> Option<ServiceInfo> {
        self.state
            .lock()
            .await
            .services
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    pub async fn has_deployment(&self, namespace: &str, name: &str) -> bool {
        self.state
            .lock()
            .await
            .rollouts
            .contains_key(&(namespace.to_string(), name.to_string()))
    }
}

fn string_map(value: &JsonValue) -> BTreeMap<String, String> {
    value
        .as_object()
        .map(|map| {
            map.iter()
                .filter_map(|(k, v)| Some((k.clone(), v.as_str()?.to_string())))
                .collect()
        })
        .unwrap_or_default()
}

fn matches_selector(labels: &BTreeMap<String, String>, selector: &str) -> bool {
    selector
        .split(',')
        .filter(|term| !term.is_empty())
        .all(|term| match term.split_once('=') {
            Some((key, value)) => labels.get(key).map(String::as_str) == Some(value),
            None => labels.contains_key(term),
        })
}

#[async_trait]
impl Cluster for MockCluster {
    async fn list_services(&self, namespace: &str, selector: &str) -> Result<Vec<ServiceInfo>> {
        let mut state = self.state.lock().await;
        state.calls.push(format!("list-services {namespace} {selector}"));
        if state.fail_list {
            return Err(KubeError::InvalidConfig("cluster unreachable".to_string()));
        }

        Ok(state
            .services
            .iter()
            .filter(|((ns, _), service)| ns == namespace && matches_selector(&service.labels, selector))
            .map(|(_, service)| service.clone())
            .collect())
    }

    async fn apply(
        &self,
        namespace: &str,
        manifest: &Manifest,
        options: &ApplyOptions,
    ) -> Result<OperationSummary> {
        let mut state = self.state.lock().await;
        let mut summary = OperationSummary::default();

        for object in manifest.objects() {
            let name = format!("{}/{}", object.kind, object.name);
            state.calls.push(format!("apply {namespace} {name}"));
            summary.succeeded.push(name);

            if options.dry_run {
                continue;
            }

            let key = (namespace.to_string(), object.name.clone());
            match object.kind.as_str() {
                "Service" => {
                    let service = ServiceInfo {
                        name: object.name.clone(),
                        labels: string_map(&object.value["metadata"]["labels"]),
                        selector: string_map(&object.value["spec"]["selector"]),
                    };
                    state.services.insert(key, service);
                }
                "Deployment" => {
                    let replicas = object.value["spec"]["replicas"].as_i64().unwrap_or(1) as i32;
                    state
                        .rollouts
                        .entry(key)
                        .or_insert_with(|| VecDeque::from([RolloutStatus::ready(replicas)]));
                }
                _ => {}
            }
        }

        if let Some(selector) = &options.prune_selector {
            state.calls.push(format!("prune {namespace} {selector}"));
        }
        Ok(summary)
    }

    async fn delete(
        &self,
        namespace: &str,
        manifest: &Manifest,
        ignore_not_found: bool,
    ) -> Result<OperationSummary> {
        let mut state = self.state.lock().await;
        let mut summary = OperationSummary::default();

        for object in manifest.objects().iter().rev() {
            let name = format!("{}/{}", object.kind, object.name);
            state.calls.push(format!("delete {namespace} {name}"));

            let key = (namespace.to_string(), object.name.clone());
            let existed = match object.kind.as_str() {
                "Service" => state.services.remove(&key).is_some(),
                "Deployment" => state.rollouts.remove(&key).is_some(),
                _ => true,
            };

            if existed {
                summary.succeeded.push(name);
            } else if ignore_not_found {
                summary.skipped.push((name, "not found".to_string()));
            } else {
                summary.failed.push((name, "not found".to_string()));
            }
        }
        Ok(summary)
    }

    async fn delete_deployment(&self, namespace: &str, name: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        state.calls.push(format!("delete-deployment {namespace} {name}"));
        state
            .rollouts
            .remove(&(namespace.to_string(), name.to_string()));
        Ok(())
    }

    async fn patch_service_selector(
        &self,
        namespace: &str,
        name: &str,
        key: &str,
        value: &str,
    ) -> Result<()> {
        let mut state = self.state.lock().await;
        state
            .calls
            .push(format!("patch-selector {namespace} {name} {key}={value}"));

        let service = state
            .services
            .get_mut(&(namespace.to_string(), name.to_string()))
            .ok_or_else(|| KubeError::InvalidConfig(format!("service {name} not found")))?;
        service.selector.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn deployment_status(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<RolloutStatus>> {
        let mut state = self.state.lock().await;
        let Some(statuses) = state
            .rollouts
            .get_mut(&(namespace.to_string(), name.to_string()))
        else {
            return Ok(None);
        };

        let status = if statuses.len() > 1 {
            statuses.pop_front()
        } else {
            statuses.front().cloned()
        };
        Ok(status)
    }

    async fn follow_logs(
        &self,
        namespace: &str,
        selector: &str,
        since: Option<Duration>,
    ) -> Result<BoxStream<'static, Result<LogLine>>> {
        let mut state = self.state.lock().await;
        state
            .calls
            .push(format!("follow-logs {namespace} {selector} {since:?}"));

        let lines: Vec<Result<LogLine>> = state.logs.iter().cloned().map(Ok).collect();
        Ok(futures::stream::iter(lines).boxed())
    }
}

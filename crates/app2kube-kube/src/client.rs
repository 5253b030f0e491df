//! kube-rs implementation of [`Cluster`]
//!
//! Objects are applied with Server-Side Apply as `DynamicObject`s resolved
//! through discovery, so one code path serves every kind the manifest emits.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use app2kube_engine::{Manifest, ManifestObject};
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::{AsyncBufReadExt, StreamExt, TryStreamExt};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Pod, Service};
use kube::api::{
    Api, DeleteParams, DynamicObject, ListParams, LogParams, Patch, PatchParams,
};
use kube::config::{Config, KubeConfigOptions};
use kube::core::GroupVersionKind;
use kube::discovery::{ApiCapabilities, ApiResource, Discovery, Scope};
use kube::Client;
use tokio::sync::OnceCell;

use crate::cluster::{
    ApplyOptions, Cluster, LogLine, OperationSummary, RolloutStatus, ServiceInfo,
};
use crate::error::{KubeError, Result};

/// Field manager name for Server-Side Apply
pub const FIELD_MANAGER: &str = "app2kube";

/// API groups of every kind the manifest can contain
const DISCOVERY_GROUPS: &[&str] = &["", "apps", "batch", "networking.k8s.io"];

/// A manifest object resolved against the API server
struct ResolvedObject {
    obj: DynamicObject,
    gvk: GroupVersionKind,
    api_resource: ApiResource,
    capabilities: ApiCapabilities,
}

impl ResolvedObject {
    fn display_name(&self) -> String {
        let name = self.obj.metadata.name.as_deref().unwrap_or("unnamed");
        format!("{}/{}", self.gvk.kind, name)
    }
}

/// [`Cluster`] backed by a live API server
pub struct KubeCluster {
    client: Client,
    discovery: OnceCell<Discovery>,
}

impl KubeCluster {
    /// Connect using the kubeconfig `context`, or the inferred configuration
    pub async fn connect(context: Option<&str>) -> Result<Self> {
        let config = match context {
            Some(context) => {
                let options = KubeConfigOptions {
                    context: Some(context.to_string()),
                    ..Default::default()
                };
                Config::from_kubeconfig(&options)
                    .await
                    .map_err(|e| KubeError::InvalidConfig(e.to_string()))?
            }
            None => Config::infer()
                .await
                .map_err(|e| KubeError::InvalidConfig(e.to_string()))?,
        };

        tracing::debug!(cluster = %config.cluster_url, context, "connecting to cluster");
        Ok(Self::with_client(Client::try_from(config)?))
    }

    pub fn with_client(client: Client) -> Self {
        Self {
            client,
            discovery: OnceCell::new(),
        }
    }

    async fn discovery(&self) -> Result<&Discovery> {
        self.discovery
            .get_or_try_init(|| async {
                Discovery::new(self.client.clone())
                    .filter(DISCOVERY_GROUPS)
                    .run()
                    .await
                    .map_err(KubeError::Api)
            })
            .await
    }

    async fn resolve(&self, object: &ManifestObject, namespace: &str) -> Result<ResolvedObject> {
        let mut obj: DynamicObject = serde_json::from_value(object.value.clone())?;
        let gvk = gvk_from_api_version(&object.api_version, &object.kind);

        let (api_resource, capabilities) =
            self.discovery().await?.resolve_gvk(&gvk).ok_or_else(|| {
                KubeError::InvalidConfig(format!(
                    "unknown resource type: {}/{}",
                    object.api_version, object.kind
                ))
            })?;

        if capabilities.scope == Scope::Namespaced {
            obj.metadata.namespace = Some(namespace.to_string());
        }

        Ok(ResolvedObject {
            obj,
            gvk,
            api_resource,
            capabilities,
        })
    }

    fn api_for(&self, resource: &ResolvedObject, namespace: &str) -> Api<DynamicObject> {
        if resource.capabilities.scope == Scope::Namespaced {
            Api::namespaced_with(self.client.clone(), namespace, &resource.api_resource)
        } else {
            Api::all_with(self.client.clone(), &resource.api_resource)
        }
    }

    async fn apply_one(
        &self,
        resource: &ResolvedObject,
        namespace: &str,
        dry_run: bool,
    ) -> Result<()> {
        let name = resource.obj.metadata.name.as_deref().ok_or_else(|| {
            KubeError::InvalidConfig("resource missing metadata.name".to_string())
        })?;

        let mut params = PatchParams::apply(FIELD_MANAGER).force();
        params.dry_run = dry_run;

        self.api_for(resource, namespace)
            .patch(name, &params, &Patch::Apply(&resource.obj))
            .await?;
        Ok(())
    }

    /// Delete namespaced objects of the applied kinds that match `selector`
    /// and were not part of this apply
    async fn prune(
        &self,
        resolved: &[ResolvedObject],
        namespace: &str,
        selector: &str,
        dry_run: bool,
        summary: &mut OperationSummary,
    ) -> Result<()> {
        let mut keep: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        let mut kinds = Vec::new();
        for resource in resolved {
            if resource.capabilities.scope != Scope::Namespaced {
                continue;
            }
            let names = keep.entry(resource.gvk.kind.clone()).or_insert_with(|| {
                kinds.push(resource);
                BTreeSet::new()
            });
            names.extend(resource.obj.metadata.name.clone());
        }

        let params = DeleteParams {
            dry_run,
            ..DeleteParams::background()
        };

        for resource in kinds {
            let api = self.api_for(resource, namespace);
            let live = api.list(&ListParams::default().labels(selector)).await?;
            let wanted = &keep[&resource.gvk.kind];

            for item in live.items {
                let Some(name) = item.metadata.name else {
                    continue;
                };
                if wanted.contains(&name) {
                    continue;
                }

                let display = format!("{}/{}", resource.gvk.kind, name);
                match api.delete(&name, &params).await {
                    Ok(_) => summary.succeeded.push(format!("{display} (pruned)")),
                    Err(kube::Error::Api(resp)) if resp.code == 404 => {}
                    Err(e) => summary.failed.push((display, e.to_string())),
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Cluster for KubeCluster {
    async fn list_services(&self, namespace: &str, selector: &str) -> Result<Vec<ServiceInfo>> {
        let api: Api<Service> = Api::namespaced(self.client.clone(), namespace);
        let list = api.list(&ListParams::default().labels(selector)).await?;

        Ok(list
            .items
            .into_iter()
            .map(|service| ServiceInfo {
                name: service.metadata.name.unwrap_or_default(),
                labels: service.metadata.labels.unwrap_or_default(),
                selector: service.spec.and_then(|s| s.selector).unwrap_or_default(),
            })
            .collect())
    }

    async fn apply(
        &self,
        namespace: &str,
        manifest: &Manifest,
        options: &ApplyOptions,
    ) -> Result<OperationSummary> {
        let mut resolved = Vec::with_capacity(manifest.objects().len());
        for object in manifest.objects() {
            resolved.push(self.resolve(object, namespace).await?);
        }

        let mut summary = OperationSummary::default();
        for resource in &resolved {
            let name = resource.display_name();
            match self.apply_one(resource, namespace, options.dry_run).await {
                Ok(()) => {
                    tracing::debug!(object = %name, dry_run = options.dry_run, "applied");
                    summary.succeeded.push(name);
                }
                Err(e) => summary.failed.push((name, e.to_string())),
            }
        }

        if let Some(selector) = &options.prune_selector
            && summary.is_success()
        {
            self.prune(&resolved, namespace, selector, options.dry_run, &mut summary)
                .await?;
        }

        tracing::info!(namespace, summary = %summary.summary(), "apply finished");
        Ok(summary)
    }

    async fn delete(
        &self,
        namespace: &str,
        manifest: &Manifest,
        ignore_not_found: bool,
    ) -> Result<OperationSummary> {
        let params = DeleteParams::background();
        let mut summary = OperationSummary::default();

        for object in manifest.objects().iter().rev() {
            let resource = self.resolve(object, namespace).await?;
            let name = resource.display_name();

            match self
                .api_for(&resource, namespace)
                .delete(&object.name, &params)
                .await
            {
                Ok(_) => summary.succeeded.push(name),
                Err(kube::Error::Api(resp)) if resp.code == 404 && ignore_not_found => {
                    summary.skipped.push((name, "not found".to_string()));
                }
                Err(e) => summary.failed.push((name, e.to_string())),
            }
        }

        tracing::info!(namespace, summary = %summary.summary(), "delete finished");
        Ok(summary)
    }

    async fn delete_deployment(&self, namespace: &str, name: &str) -> Result<()> {
        let api: Api<Deployment> = Api::namespaced(self.client.clone(), namespace);
        api.delete(name, &DeleteParams::background()).await?;
        Ok(())
    }

    async fn patch_service_selector(
        &self,
        namespace: &str,
        name: &str,
        key: &str,
        value: &str,
    ) -> Result<()> {
        let api: Api<Service> = Api::namespaced(self.client.clone(), namespace);
        let patch = serde_json::json!({ "spec": { "selector": { key: value } } });
        api.patch(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        Ok(())
    }

    async fn deployment_status(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<RolloutStatus>> {
        let api: Api<Deployment> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?.map(|d| rollout_status(&d)))
    }

    async fn follow_logs(
        &self,
        namespace: &str,
        selector: &str,
        since: Option<Duration>,
    ) -> Result<BoxStream<'static, Result<LogLine>>> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let pods = api.list(&ListParams::default().labels(selector)).await?;

        let mut streams = Vec::new();
        for pod in pods.items {
            let Some(pod_name) = pod.metadata.name else {
                continue;
            };
            let containers = pod.spec.map(|s| s.containers).unwrap_or_default();

            for container in containers {
                let params = LogParams {
                    container: Some(container.name.clone()),
                    follow: true,
                    since_seconds: since.map(|d| d.as_secs().max(1) as i64),
                    ..Default::default()
                };

                let pod = pod_name.clone();
                let lines = api
                    .log_stream(&pod_name, &params)
                    .await?
                    .lines()
                    .map_err(KubeError::Io)
                    .map_ok(move |line| LogLine {
                        pod: pod.clone(),
                        container: container.name.clone(),
                        line,
                    });
                streams.push(lines.boxed());
            }
        }

        tracing::debug!(namespace, selector, streams = streams.len(), "following logs");
        Ok(futures::stream::select_all(streams).boxed())
    }
}

fn rollout_status(deployment: &Deployment) -> RolloutStatus {
    let spec = deployment.spec.as_ref();
    let status = deployment.status.as_ref();

    let message = status
        .and_then(|s| s.conditions.as_ref())
        .map(|conditions| {
            conditions
                .iter()
                .filter(|c| c.status == "False")
                .filter_map(|c| c.message.as_ref().map(|m| format!("{}: {}", c.type_, m)))
                .collect::<Vec<_>>()
                .join("; ")
        })
        .filter(|m| !m.is_empty());

    RolloutStatus {
        desired: spec.and_then(|s| s.replicas).unwrap_or(1),
        ready: status.and_then(|s| s.ready_replicas).unwrap_or(0),
        updated: status.and_then(|s| s.updated_replicas).unwrap_or(0),
        available: status.and_then(|s| s.available_replicas).unwrap_or(0),
        generation: deployment.metadata.generation.unwrap_or(0),
        observed_generation: status.and_then(|s| s.observed_generation).unwrap_or(0),
        message,
    }
}

/// `apps/v1` → group `apps`, version `v1`; `v1` → core group
fn gvk_from_api_version(api_version: &str, kind: &str) -> GroupVersionKind {
    let (group, version) = api_version.rsplit_once('/').unwrap_or(("", api_version));
    GroupVersionKind::gvk(group, version, kind)
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::apps::v1::{DeploymentCondition, DeploymentSpec, DeploymentStatus};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    #[test]
    fn test_gvk_from_api_version() {
        let gvk = gvk_from_api_version("apps/v1", "Deployment");
        assert_eq!(gvk.group, "apps");
        assert_eq!(gvk.version, "v1");
        assert_eq!(gvk.kind, "Deployment");

        let gvk = gvk_from_api_version("v1", "Service");
        assert_eq!(gvk.group, "");
        assert_eq!(gvk.version, "v1");

        let gvk = gvk_from_api_version("networking.k8s.io/v1", "Ingress");
        assert_eq!(gvk.group, "networking.k8s.io");
    }

    #[test]
    fn test_rollout_status_from_deployment() {
        let deployment = Deployment {
            metadata: ObjectMeta {
                generation: Some(3),
                ..Default::default()
            },
            spec: Some(DeploymentSpec {
                replicas: Some(2),
                ..Default::default()
            }),
            status: Some(DeploymentStatus {
                ready_replicas: Some(1),
                updated_replicas: Some(2),
                available_replicas: Some(1),
                observed_generation: Some(3),
                conditions: Some(vec![
                    DeploymentCondition {
                        type_: "Available".to_string(),
                        status: "False".to_string(),
                        message: Some("Deployment does not have minimum availability.".into()),
                        ..Default::default()
                    },
                    DeploymentCondition {
                        type_: "Progressing".to_string(),
                        status: "True".to_string(),
                        message: Some("ReplicaSet is progressing.".into()),
                        ..Default::default()
                    },
                ]),
                ..Default::default()
            }),
        };

        let status = rollout_status(&deployment);
        assert_eq!(status.desired, 2);
        assert_eq!(status.ready, 1);
        assert_eq!(status.observed_generation, 3);
        assert!(!status.is_ready());
        assert_eq!(
            status.message.as_deref(),
            Some("Available: Deployment does not have minimum availability.")
        );
    }

    #[test]
    fn test_rollout_status_defaults() {
        let status = rollout_status(&Deployment::default());
        assert_eq!(status.desired, 1);
        assert_eq!(status.ready, 0);
        assert!(!status.is_ready());
    }

    #[test]
    fn test_field_manager_constant() {
        assert_eq!(FIELD_MANAGER, "app2kube");
    }
}

use app2kube_core::Application;
use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::PodTemplateSpec;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};

use super::{pod_spec, process_named};
use crate::container::effective_services;
use crate::error::Result;

/// The application Deployment; `None` without containers
pub fn build_deployment(app: &Application) -> Result<Option<Deployment>> {
    let spec = &app.deployment;
    if spec.containers.is_empty() {
        return Ok(None);
    }

    // Port naming problems surface here even when services are not requested.
    effective_services(app)?;

    let containers = process_named(&spec.containers, app)?;
    let init_containers = process_named(&spec.init_containers, app)?;
    let labels = app.color_labels();

    let mut metadata = app.object_meta(app.deployment_name());
    if app.blue_green_color().is_some() {
        metadata.labels = Some(labels.clone());
    }

    Ok(Some(Deployment {
        metadata,
        spec: Some(DeploymentSpec {
            replicas: Some(spec.replica_count.max(1)),
            revision_history_limit: Some(spec.revision_history_limit),
            selector: LabelSelector {
                match_labels: Some(labels.clone()),
                ..Default::default()
            },
            strategy: spec.strategy.clone(),
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels),
                    ..Default::default()
                }),
                spec: Some(pod_spec(app, containers, init_containers)?),
            },
            ..Default::default()
        }),
        ..Default::default()
    }))
}

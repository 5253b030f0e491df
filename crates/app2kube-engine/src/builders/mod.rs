//! Resource builders
//!
//! One builder per resource kind. Each consumes the normalized
//! [`Application`] and returns a typed `k8s-openapi` object, an `Option` when
//! the application may not configure that kind at all, or a `Vec` for kinds
//! that appear once per entry (services, ingresses, cron jobs, volumes).

mod config;
mod cronjob;
mod deployment;
mod ingress;
mod namespace;
mod service;
mod volume;

pub use config::{build_config_map, build_secret};
pub use cronjob::build_cron_jobs;
pub use deployment::build_deployment;
pub use ingress::{build_ingress_secrets, build_ingresses};
pub use namespace::build_namespace;
pub use service::{build_services, resolve_ports};
pub use volume::build_volume_claims;

use std::collections::BTreeMap;

use app2kube_core::Application;
use k8s_openapi::api::core::v1::{
    Container, EmptyDirVolumeSource, LocalObjectReference, PersistentVolumeClaimVolumeSource,
    PodSpec, Volume,
};

use crate::container::{SHARED_DATA_VOLUME, process_container};
use crate::error::Result;

/// Process every container of a name-keyed map, in key order
fn process_named(
    containers: &BTreeMap<String, Container>,
    app: &Application,
) -> Result<Vec<Container>> {
    containers
        .iter()
        .map(|(name, container)| {
            let mut container = container.clone();
            container.name = name.to_lowercase();
            process_container(&mut container, app)?;
            Ok(container)
        })
        .collect()
}

/// Pod-level settings shared by Deployments and CronJobs
fn pod_spec(
    app: &Application,
    containers: Vec<Container>,
    init_containers: Vec<Container>,
) -> Result<PodSpec> {
    let common = &app.common;

    let mut volumes = Vec::new();
    if !common.shared_data.is_empty() && containers.len() > 1 {
        volumes.push(Volume {
            name: SHARED_DATA_VOLUME.to_string(),
            empty_dir: Some(EmptyDirVolumeSource::default()),
            ..Default::default()
        });
    }
    for name in app.volumes.keys() {
        volumes.push(Volume {
            name: name.clone(),
            persistent_volume_claim: Some(PersistentVolumeClaimVolumeSource {
                claim_name: volume::claim_name(app, name),
                ..Default::default()
            }),
            ..Default::default()
        });
    }

    Ok(PodSpec {
        affinity: app.affinity()?,
        automount_service_account_token: Some(common.mount_service_account_token),
        containers,
        init_containers: non_empty(init_containers),
        dns_policy: common.dns_policy.clone().filter(|p| !p.is_empty()),
        enable_service_links: Some(common.enable_service_links),
        image_pull_secrets: (!common.image.pull_secrets.is_empty()).then(|| {
            vec![LocalObjectReference {
                name: common.image.pull_secrets.clone(),
            }]
        }),
        node_selector: (!common.node_selector.is_empty()).then(|| common.node_selector.clone()),
        termination_grace_period_seconds: (common.grace_period > 0).then_some(common.grace_period),
        tolerations: non_empty(common.tolerations.clone()),
        volumes: non_empty(volumes),
        ..Default::default()
    })
}

fn non_empty<T>(items: Vec<T>) -> Option<Vec<T>> {
    (!items.is_empty()).then_some(items)
}

#[cfg(test)]
pub(crate) mod test_support {
    use app2kube_core::{Application, SecretKeys, Values};

    pub fn app(yaml: &str) -> Application {
        Application::from_values(&Values::from_yaml(yaml).unwrap(), SecretKeys::default()).unwrap()
    }

    pub const WEB: &str = "\
name: web
common:
  image:
    repository: example/web
    tag: v1
deployment:
  containers:
    app:
      ports:
        - name: http
          containerPort: 8080
";
}

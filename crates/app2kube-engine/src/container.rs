//! Container processing
//!
//! Fills a container from the application's shared settings: the common
//! image and tag, environment, config/secret references, volume mounts, pull
//! policy and a default liveness probe.

use std::collections::BTreeMap;

use app2kube_core::{Application, ServiceSpec};
use k8s_openapi::api::core::v1::{
    ConfigMapEnvSource, Container, EnvFromSource, EnvVar, Probe, SecretEnvSource,
    TCPSocketAction, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;

use crate::error::{EngineError, Result};

/// Name of the emptyDir volume shared between containers
pub const SHARED_DATA_VOLUME: &str = "shared-data";

const DEFAULT_PROBE_DELAY_SECONDS: i32 = 5;

/// Apply the application settings to `container` in place
pub fn process_container(container: &mut Container, app: &Application) -> Result<()> {
    let common_image = &app.common.image;

    let image = container.image.get_or_insert_with(String::new);
    if image.is_empty() {
        if common_image.repository.is_empty() {
            return Err(EngineError::config(format!(
                "image required for container {}",
                container.name
            )));
        }
        *image = format!("{}:{}", common_image.repository, common_image.tag);
    }

    let mut third_party = false;
    if !common_image.repository.is_empty() {
        let parts: Vec<&str> = image.split(':').collect();
        if parts.len() == 2 && parts[0] == common_image.repository {
            *image = format!("{}:{}", common_image.repository, common_image.tag);
        } else {
            third_party = true;
        }
    }

    if !third_party {
        inject_app_settings(container, app);
    }

    if container.image_pull_policy.as_deref().unwrap_or_default().is_empty()
        && !common_image.pull_policy.is_empty()
    {
        container.image_pull_policy = Some(common_image.pull_policy.clone());
    }

    if app.is_staging() {
        container.resources = None;
    }

    default_probes(container);

    Ok(())
}

fn inject_app_settings(container: &mut Container, app: &Application) {
    if !app.env.is_empty() {
        container
            .env
            .get_or_insert_with(Vec::new)
            .extend(app.env.iter().map(|(name, value)| EnvVar {
                name: name.clone(),
                value: Some(value.clone()),
                ..Default::default()
            }));
    }

    let release = app.release_name();
    if !app.config_map.is_empty() {
        container
            .env_from
            .get_or_insert_with(Vec::new)
            .push(EnvFromSource {
                config_map_ref: Some(ConfigMapEnvSource {
                    name: release.clone(),
                    ..Default::default()
                }),
                ..Default::default()
            });
    }
    if !app.secrets.is_empty() {
        container
            .env_from
            .get_or_insert_with(Vec::new)
            .push(EnvFromSource {
                secret_ref: Some(SecretEnvSource {
                    name: release,
                    ..Default::default()
                }),
                ..Default::default()
            });
    }

    let mut mounts = Vec::new();
    if !app.common.shared_data.is_empty() {
        mounts.push(VolumeMount {
            name: SHARED_DATA_VOLUME.to_string(),
            mount_path: app.common.shared_data.clone(),
            ..Default::default()
        });
    }
    mounts.extend(app.volumes.iter().map(|(name, volume)| VolumeMount {
        name: name.clone(),
        mount_path: volume.mount_path.clone(),
        ..Default::default()
    }));
    if !mounts.is_empty() {
        container
            .volume_mounts
            .get_or_insert_with(Vec::new)
            .extend(mounts);
    }
}

fn port_missing(port: &IntOrString) -> bool {
    match port {
        IntOrString::Int(n) => *n == 0,
        IntOrString::String(s) => s.is_empty(),
    }
}

/// TCP liveness probe for single-port containers, and port backfill for
/// HTTP probes declared without one
fn default_probes(container: &mut Container) {
    let ports = container.ports.as_deref().unwrap_or_default();
    let [port] = ports else {
        return;
    };
    let port = IntOrString::Int(port.container_port);

    match container.liveness_probe.as_mut() {
        None => {
            container.liveness_probe = Some(Probe {
                tcp_socket: Some(TCPSocketAction {
                    port: port.clone(),
                    ..Default::default()
                }),
                initial_delay_seconds: Some(DEFAULT_PROBE_DELAY_SECONDS),
                ..Default::default()
            });
        }
        Some(probe) => backfill_probe_port(probe, &port),
    }

    if let Some(probe) = container.readiness_probe.as_mut() {
        backfill_probe_port(probe, &port);
    }
}

fn backfill_probe_port(probe: &mut Probe, port: &IntOrString) {
    if let Some(http) = probe.http_get.as_mut()
        && port_missing(&http.port)
    {
        http.port = port.clone();
    }
    if let Some(tcp) = probe.tcp_socket.as_mut()
        && port_missing(&tcp.port)
    {
        tcp.port = port.clone();
    }
}

/// Services in effect for the application
///
/// Declared services win. Without any, and when ingress rules exist and the
/// deployment has exactly one container, one service is derived per named
/// container port.
pub fn effective_services(app: &Application) -> Result<BTreeMap<String, ServiceSpec>> {
    if !app.service.is_empty() || app.ingress.is_empty() || app.deployment.containers.len() != 1
    {
        return Ok(app.service.clone());
    }

    let Some((key, container)) = app.deployment.containers.iter().next() else {
        return Ok(BTreeMap::new());
    };
    let ports = container.ports.as_deref().unwrap_or_default();
    if ports.is_empty() {
        return Ok(BTreeMap::new());
    }

    let container_name = if container.name.is_empty() {
        key.to_lowercase()
    } else {
        container.name.clone()
    };

    let mut services = BTreeMap::new();
    for port in ports {
        let Some(name) = port.name.as_deref().filter(|n| !n.is_empty()) else {
            continue;
        };
        if services.contains_key(name) {
            return Err(EngineError::config(format!(
                "container port names must be different: {container_name}"
            )));
        }
        services.insert(
            name.to_string(),
            ServiceSpec {
                port: port.container_port,
                protocol: port.protocol.clone(),
                ..Default::default()
            },
        );
    }

    if services.is_empty() {
        return Err(EngineError::config(format!(
            "named container port required to create service for container: {container_name}"
        )));
    }

    tracing::debug!(count = services.len(), "derived services from container ports");
    Ok(services)
}

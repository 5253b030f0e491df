use app2kube_core::Application;
use k8s_openapi::ByteString;
use k8s_openapi::api::core::v1::{ConfigMap, Secret};

use crate::error::Result;

/// The `configmap` section as a ConfigMap named after the release
pub fn build_config_map(app: &Application) -> Option<ConfigMap> {
    if app.config_map.is_empty() {
        return None;
    }

    Some(ConfigMap {
        metadata: app.object_meta(app.release_name()),
        data: Some(app.config_map.clone()),
        ..Default::default()
    })
}

/// The `secrets` section, decrypted, as an Opaque Secret named after the release
pub fn build_secret(app: &Application) -> Result<Option<Secret>> {
    if app.secrets.is_empty() {
        return Ok(None);
    }

    let data = app
        .decrypted_secrets()?
        .into_iter()
        .map(|(key, value)| (key, ByteString(value.into_bytes())))
        .collect();

    Ok(Some(Secret {
        metadata: app.object_meta(app.release_name()),
        data: Some(data),
        ..Default::default()
    }))
}

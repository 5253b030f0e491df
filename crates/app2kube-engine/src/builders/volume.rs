use app2kube_core::Application;
use k8s_openapi::api::core::v1::PersistentVolumeClaim;

use crate::error::{EngineError, Result};

/// Claim name for a `volumes` entry
pub(crate) fn claim_name(app: &Application, volume: &str) -> String {
    format!("{}-{}", app.release_name(), volume)
}

/// One PersistentVolumeClaim per `volumes` entry
pub fn build_volume_claims(app: &Application) -> Result<Vec<PersistentVolumeClaim>> {
    app.volumes
        .iter()
        .map(|(name, volume)| {
            if volume.mount_path.is_empty() {
                return Err(EngineError::config(format!(
                    "mount path required for PVC: {name}"
                )));
            }
            Ok(PersistentVolumeClaim {
                metadata: app.object_meta(claim_name(app, name)),
                spec: Some(volume.spec.clone()),
                ..Default::default()
            })
        })
        .collect()
}

use std::collections::BTreeMap;

use app2kube_core::{Application, LABEL_MANAGED_BY};
use k8s_openapi::api::core::v1::Namespace;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

/// The target namespace; `None` when the application names none
pub fn build_namespace(app: &Application) -> Option<Namespace> {
    if app.namespace.is_empty() {
        return None;
    }

    let labels: BTreeMap<String, String> = app
        .labels
        .get_key_value(LABEL_MANAGED_BY)
        .map(|(k, v)| (k.clone(), v.clone()))
        .into_iter()
        .collect();

    Some(Namespace {
        metadata: ObjectMeta {
            name: Some(app.namespace.clone()),
            labels: (!labels.is_empty()).then_some(labels),
            ..Default::default()
        },
        ..Default::default()
    })
}

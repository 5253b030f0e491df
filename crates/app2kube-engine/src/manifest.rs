//! Manifest assembly
//!
//! Runs the resource builders for a set of requested kinds and serializes
//! the results, in a fixed dependency order, as a multi-document stream.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use app2kube_core::Application;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::{Metadata, Resource};
use serde::Serialize;
use serde_json::Value as JsonValue;

use crate::builders;
use crate::error::{EngineError, Result};

// =============================================================================
// OUTPUT KINDS
// =============================================================================

/// A resource kind (or group of kinds) requested for output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputKind {
    /// Everything except the Namespace
    All,
    /// What the Deployment needs to run: Secret, ConfigMap, PVC, Deployment
    AllForDeployment,
    /// CronJob, Service, ingress TLS secrets and Ingress
    AllOther,
    ConfigMap,
    CronJob,
    Deployment,
    Ingress,
    Namespace,
    Pvc,
    /// The application Secret and the ingress TLS secrets
    Secret,
    Service,
}

impl OutputKind {
    pub const NAMES: &'static [&'static str] = &[
        "all",
        "all-for-deployment",
        "all-other",
        "configmap",
        "cronjob",
        "deployment",
        "ingress",
        "namespace",
        "pvc",
        "secret",
        "service",
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::All => "all",
            Self::AllForDeployment => "all-for-deployment",
            Self::AllOther => "all-other",
            Self::ConfigMap => "configmap",
            Self::CronJob => "cronjob",
            Self::Deployment => "deployment",
            Self::Ingress => "ingress",
            Self::Namespace => "namespace",
            Self::Pvc => "pvc",
            Self::Secret => "secret",
            Self::Service => "service",
        }
    }

    fn sections(self) -> &'static [Section] {
        use Section::*;
        match self {
            Self::All => &[
                Secret,
                ConfigMap,
                Pvc,
                CronJob,
                Deployment,
                Service,
                IngressSecrets,
                Ingress,
            ],
            Self::AllForDeployment => &[Secret, ConfigMap, Pvc, Deployment],
            Self::AllOther => &[CronJob, Service, IngressSecrets, Ingress],
            Self::ConfigMap => &[ConfigMap],
            Self::CronJob => &[CronJob],
            Self::Deployment => &[Deployment],
            Self::Ingress => &[Ingress],
            Self::Namespace => &[Namespace],
            Self::Pvc => &[Pvc],
            Self::Secret => &[Secret, IngressSecrets],
            Self::Service => &[Service],
        }
    }
}

impl fmt::Display for OutputKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutputKind {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        let kind = match s.to_lowercase().as_str() {
            "all" => Self::All,
            "all-for-deployment" => Self::AllForDeployment,
            "all-other" => Self::AllOther,
            "configmap" => Self::ConfigMap,
            "cronjob" => Self::CronJob,
            "deployment" => Self::Deployment,
            "ingress" => Self::Ingress,
            "namespace" => Self::Namespace,
            "pvc" => Self::Pvc,
            "secret" => Self::Secret,
            "service" => Self::Service,
            other => {
                return Err(EngineError::config(format!(
                    "unknown resource type '{other}' (expected one of: {})",
                    Self::NAMES.join(", ")
                )));
            }
        };
        Ok(kind)
    }
}

/// Emission order of the builders; Namespace always comes first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Section {
    Namespace,
    Secret,
    ConfigMap,
    Pvc,
    CronJob,
    Deployment,
    Service,
    IngressSecrets,
    Ingress,
}

// =============================================================================
// OUTPUT FORMAT
// =============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Yaml,
    Json,
}

impl FromStr for OutputFormat {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "yaml" | "yml" => Ok(Self::Yaml),
            "json" => Ok(Self::Json),
            other => Err(EngineError::config(format!(
                "unknown output format '{other}' (expected yaml or json)"
            ))),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Yaml => "yaml",
            Self::Json => "json",
        })
    }
}

// =============================================================================
// MANIFEST
// =============================================================================

/// One built resource, ready to print or apply
#[derive(Debug, Clone, PartialEq)]
pub struct ManifestObject {
    pub api_version: String,
    pub kind: String,
    pub name: String,
    pub value: JsonValue,
}

impl ManifestObject {
    fn from_resource<K>(resource: &K) -> Result<Self>
    where
        K: Resource + Metadata<Ty = ObjectMeta> + Serialize,
    {
        let mut value = serde_json::to_value(resource)?;
        if let JsonValue::Object(map) = &mut value {
            map.remove("status");
        }
        strip_volatile(&mut value);

        Ok(Self {
            api_version: K::API_VERSION.to_string(),
            kind: K::KIND.to_string(),
            name: resource.metadata().name.clone().unwrap_or_default(),
            value,
        })
    }

    /// `---`, a `# Kind: name` comment, then the body
    pub fn render(&self, format: OutputFormat) -> Result<String> {
        let body = match format {
            OutputFormat::Yaml => serde_yaml::to_string(&self.value)?,
            OutputFormat::Json => serde_json::to_string_pretty(&self.value)? + "\n",
        };
        Ok(format!("---\n# {}: {}\n{}\n", self.kind, self.name, body))
    }
}

/// Object metadata blocks the builders can emit: the object's own, pod
/// templates and CronJob job templates
const METADATA_PATHS: &[&[&str]] = &[
    &["metadata"],
    &["spec", "template", "metadata"],
    &["spec", "jobTemplate", "metadata"],
    &["spec", "jobTemplate", "spec", "template", "metadata"],
];

/// Drop the null creation timestamps k8s-openapi emits in object metadata
fn strip_volatile(value: &mut JsonValue) {
    for path in METADATA_PATHS {
        let meta = path
            .iter()
            .try_fold(&mut *value, |node, key| node.get_mut(*key));
        if let Some(JsonValue::Object(meta)) = meta {
            meta.remove("creationTimestamp");
        }
    }
}

/// Built resources in emission order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Manifest {
    objects: Vec<ManifestObject>,
}

impl Manifest {
    /// Run the builders for `kinds`; the first builder error aborts
    pub fn build(app: &Application, kinds: &[OutputKind]) -> Result<Self> {
        let sections: BTreeSet<Section> = kinds
            .iter()
            .flat_map(|kind| kind.sections().iter().copied())
            .collect();

        let mut manifest = Self::default();
        for section in sections {
            manifest.build_section(app, section)?;
        }

        tracing::debug!(
            release = %app.release_name(),
            objects = manifest.objects.len(),
            "assembled manifest"
        );
        Ok(manifest)
    }

    fn build_section(&mut self, app: &Application, section: Section) -> Result<()> {
        match section {
            Section::Namespace => self.extend(builders::build_namespace(app)),
            Section::Secret => self.extend(builders::build_secret(app)?),
            Section::ConfigMap => self.extend(builders::build_config_map(app)),
            Section::Pvc => self.extend(builders::build_volume_claims(app)?),
            Section::CronJob => self.extend(builders::build_cron_jobs(app)?),
            Section::Deployment => self.extend(builders::build_deployment(app)?),
            Section::Service => self.extend(builders::build_services(app)?),
            Section::IngressSecrets => self.extend(builders::build_ingress_secrets(app)?),
            Section::Ingress => self.extend(builders::build_ingresses(app)?),
        }
    }

    fn extend<K, I>(&mut self, resources: I) -> Result<()>
    where
        K: Resource + Metadata<Ty = ObjectMeta> + Serialize,
        I: IntoIterator<Item = K>,
    {
        for resource in resources {
            self.objects.push(ManifestObject::from_resource(&resource)?);
        }
        Ok(())
    }

    pub fn objects(&self) -> &[ManifestObject] {
        &self.objects
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Concatenated documents in emission order
    pub fn render(&self, format: OutputFormat) -> Result<String> {
        self.objects.iter().map(|object| object.render(format)).collect()
    }
}

/// Build and serialize the requested kinds
pub fn assemble(app: &Application, kinds: &[OutputKind], format: OutputFormat) -> Result<String> {
    Manifest::build(app, kinds)?.render(format)
}

#[cfg(test)]
mod tests {
    use super::*;
    use app2kube_core::{SecretKeys, Values};

    const FULL: &str = "\
name: web
namespace: shop
common:
  image:
    repository: example/web
    tag: v1
configmap:
  LOG_LEVEL: info
secrets:
  TOKEN: abc
cronjob:
  cleanup:
    schedule: '@daily'
    container:
      command: [./cleanup]
deployment:
  containers:
    app:
      ports:
        - name: http
          containerPort: 8080
ingress:
  - host: example.com
    tlsCrt: CERT
    tlsKey: KEY
volumes:
  data:
    mountPath: /data
    spec:
      accessModes: [ReadWriteOnce]
";

    fn app(yaml: &str) -> Application {
        Application::from_values(&Values::from_yaml(yaml).unwrap(), SecretKeys::default()).unwrap()
    }

    fn kinds_of(manifest: &Manifest) -> Vec<(&str, &str)> {
        manifest
            .objects()
            .iter()
            .map(|o| (o.kind.as_str(), o.name.as_str()))
            .collect()
    }

    #[test]
    fn test_all_order() {
        let manifest = Manifest::build(&app(FULL), &[OutputKind::All]).unwrap();
        assert_eq!(
            kinds_of(&manifest),
            [
                ("Secret", "web"),
                ("ConfigMap", "web"),
                ("PersistentVolumeClaim", "web-data"),
                ("CronJob", "web-cleanup"),
                ("Deployment", "web"),
                ("Service", "web-http"),
                ("Secret", "tls-example.com"),
                ("Ingress", "web-example.com"),
            ]
        );
    }

    #[test]
    fn test_groups() {
        let app = app(FULL);

        let deploy = Manifest::build(&app, &[OutputKind::AllForDeployment]).unwrap();
        let kinds: Vec<_> = kinds_of(&deploy).into_iter().map(|(k, _)| k).collect();
        assert_eq!(kinds, ["Secret", "ConfigMap", "PersistentVolumeClaim", "Deployment"]);

        let other = Manifest::build(&app, &[OutputKind::AllOther]).unwrap();
        let kinds: Vec<_> = kinds_of(&other).into_iter().map(|(k, _)| k).collect();
        assert_eq!(kinds, ["CronJob", "Service", "Secret", "Ingress"]);
    }

    #[test]
    fn test_kinds_are_a_set() {
        let app = app(FULL);
        let manifest = Manifest::build(
            &app,
            &[
                OutputKind::Ingress,
                OutputKind::Namespace,
                OutputKind::Service,
                OutputKind::AllOther,
            ],
        )
        .unwrap();
        assert_eq!(
            kinds_of(&manifest),
            [
                ("Namespace", "shop"),
                ("CronJob", "web-cleanup"),
                ("Service", "web-http"),
                ("Secret", "tls-example.com"),
                ("Ingress", "web-example.com"),
            ]
        );
    }

    #[test]
    fn test_secret_kind_includes_tls_secrets() {
        let manifest = Manifest::build(&app(FULL), &[OutputKind::Secret]).unwrap();
        assert_eq!(
            kinds_of(&manifest),
            [("Secret", "web"), ("Secret", "tls-example.com")]
        );
    }

    #[test]
    fn test_render_yaml() {
        let app = app("name: web\nconfigmap:\n  B: '2'\n  A: '1'\n");
        let text = assemble(&app, &[OutputKind::ConfigMap], OutputFormat::Yaml).unwrap();

        assert!(text.starts_with("---\n# ConfigMap: web\napiVersion: v1\n"));
        assert!(text.contains("kind: ConfigMap\n"));
        assert!(text.contains("data:\n  A: '1'\n  B: '2'\n"));
        assert!(text.ends_with("\n\n"));
        assert!(!text.contains("creationTimestamp"));
        assert!(!text.contains("status"));
    }

    #[test]
    fn test_render_json() {
        let app = app("name: web\nconfigmap:\n  A: '1'\n");
        let text = assemble(&app, &[OutputKind::ConfigMap], OutputFormat::Json).unwrap();

        let body = text.strip_prefix("---\n# ConfigMap: web\n").unwrap();
        let value: JsonValue = serde_json::from_str(body.trim()).unwrap();
        assert_eq!(value["kind"], "ConfigMap");
        assert_eq!(value["data"]["A"], "1");
    }

    #[test]
    fn test_compilation_is_deterministic() {
        let app = app(FULL);
        let first = assemble(&app, &[OutputKind::All], OutputFormat::Yaml).unwrap();
        let second = assemble(&app, &[OutputKind::All], OutputFormat::Yaml).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_builder_error_short_circuits() {
        let app = app("name: web\ncronjob:\n  cleanup:\n    container:\n      command: [x]\n");
        let err = assemble(&app, &[OutputKind::All], OutputFormat::Yaml).unwrap_err();
        assert!(err.to_string().contains("schedule required for cron: cleanup"));
    }

    #[test]
    fn test_parse_kinds() {
        assert_eq!("all-other".parse::<OutputKind>().unwrap(), OutputKind::AllOther);
        assert_eq!("PVC".parse::<OutputKind>().unwrap(), OutputKind::Pvc);
        assert!("pods".parse::<OutputKind>().is_err());
        for name in OutputKind::NAMES {
            assert_eq!(name.parse::<OutputKind>().unwrap().as_str(), *name);
        }
        assert_eq!("json".parse::<OutputFormat>().unwrap(), OutputFormat::Json);
        assert!("xml".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn test_strip_volatile() {
        let mut value = serde_json::json!({
            "metadata": {"name": "a", "creationTimestamp": null},
            "spec": {
                "template": {"metadata": {"creationTimestamp": null}},
                "jobTemplate": {
                    "metadata": {"creationTimestamp": null},
                    "spec": {"template": {"metadata": {"creationTimestamp": null}}}
                }
            }
        });
        strip_volatile(&mut value);
        assert_eq!(
            value,
            serde_json::json!({
                "metadata": {"name": "a"},
                "spec": {
                    "template": {"metadata": {}},
                    "jobTemplate": {"metadata": {}, "spec": {"template": {"metadata": {}}}}
                }
            })
        );
    }

    #[test]
    fn test_user_creation_timestamp_keys_survive() {
        let app = app("name: web\nconfigmap:\n  creationTimestamp: '2024'\n  A: '1'\nsecrets:\n  creationTimestamp: s\n");
        let text = assemble(&app, &[OutputKind::ConfigMap, OutputKind::Secret], OutputFormat::Yaml).unwrap();

        assert!(text.contains("data:\n  A: '1'\n  creationTimestamp: '2024'\n"));
        let secret = &text[text.find("# Secret: web").unwrap()..];
        assert!(secret.contains("creationTimestamp:"));
        assert!(!text.contains("creationTimestamp: null"));
    }
}

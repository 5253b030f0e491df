//! Application model
//!
//! `Application` is the typed projection of the merged values tree. It is
//! built once per invocation by [`Application::from_values`], which applies
//! defaults and the normalization rules (name sanitizing, staging overrides),
//! and is read-only afterwards except for the blue-green color.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use k8s_openapi::api::apps::v1::DeploymentStrategy;
use k8s_openapi::api::core::v1::{
    Affinity, Container, PersistentVolumeClaimSpec, PodAffinityTerm, PodAntiAffinity, Toleration,
    WeightedPodAffinityTerm,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{
    LabelSelector, LabelSelectorRequirement, ObjectMeta,
};
use serde::de::{Deserializer, Error as _};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::{CoreError, Result};
use crate::secrets::SecretKeys;
use crate::values::Values;

/// Maximum length of a Kubernetes label value
pub const MAX_NAME_LENGTH: usize = 63;

pub const LABEL_NAME: &str = "app.kubernetes.io/name";
pub const LABEL_INSTANCE: &str = "app.kubernetes.io/instance";
pub const LABEL_MANAGED_BY: &str = "app.kubernetes.io/managed-by";
pub const LABEL_COLOR: &str = "app.kubernetes.io/color";

pub const MANAGED_BY: &str = "app2kube";
pub const DEFAULT_INSTANCE: &str = "production";
pub const DEFAULT_NAMESPACE: &str = "default";
pub const DEFAULT_IMAGE_TAG: &str = "latest";
pub const DEFAULT_REVISION_HISTORY_LIMIT: i32 = 2;

const HOSTNAME_TOPOLOGY_KEY: &str = "kubernetes.io/hostname";

// =============================================================================
// BLUE-GREEN COLOR
// =============================================================================

/// Blue-green deployment variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Color {
    Blue,
    Green,
}

impl Color {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Blue => "blue",
            Self::Green => "green",
        }
    }

    /// Color to deploy next given the live one: green after blue, blue otherwise
    pub fn target_after(current: Option<Color>) -> Self {
        match current {
            Some(Self::Blue) => Self::Green,
            _ => Self::Blue,
        }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Color {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "blue" => Ok(Self::Blue),
            "green" => Ok(Self::Green),
            other => Err(CoreError::config(format!(
                "unknown blue-green color '{other}' (expected blue or green)"
            ))),
        }
    }
}

// =============================================================================
// SCHEMA
// =============================================================================

/// Typed application description
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Application {
    #[serde(deserialize_with = "scalar_string")]
    pub name: String,
    #[serde(deserialize_with = "scalar_string")]
    pub namespace: String,
    /// Environment suffix (e.g. a PR number); enables staging rules
    #[serde(deserialize_with = "scalar_string")]
    pub staging: String,
    /// Sub-environment suffix within staging
    #[serde(deserialize_with = "scalar_string")]
    pub branch: String,
    #[serde(deserialize_with = "scalar_map")]
    pub labels: BTreeMap<String, String>,
    pub common: Common,
    #[serde(rename = "configmap", deserialize_with = "scalar_map")]
    pub config_map: BTreeMap<String, String>,
    #[serde(deserialize_with = "null_as_default")]
    pub cronjob: BTreeMap<String, CronJobSpec>,
    pub deployment: DeploymentSpec,
    #[serde(deserialize_with = "scalar_map")]
    pub env: BTreeMap<String, String>,
    #[serde(deserialize_with = "null_as_default")]
    pub ingress: Vec<IngressRule>,
    #[serde(deserialize_with = "scalar_map")]
    pub secrets: BTreeMap<String, String>,
    #[serde(deserialize_with = "null_as_default")]
    pub service: BTreeMap<String, ServiceSpec>,
    #[serde(deserialize_with = "null_as_default")]
    pub volumes: BTreeMap<String, VolumeSpec>,

    /// Key material for decrypting `secrets`
    #[serde(skip)]
    pub keys: SecretKeys,
}

impl Default for Application {
    fn default() -> Self {
        Self {
            name: String::new(),
            namespace: String::new(),
            staging: String::new(),
            branch: String::new(),
            labels: BTreeMap::from([(LABEL_INSTANCE.to_string(), DEFAULT_INSTANCE.to_string())]),
            common: Common::default(),
            config_map: BTreeMap::new(),
            cronjob: BTreeMap::new(),
            deployment: DeploymentSpec::default(),
            env: BTreeMap::new(),
            ingress: Vec::new(),
            secrets: BTreeMap::new(),
            service: BTreeMap::new(),
            volumes: BTreeMap::new(),
            keys: SecretKeys::default(),
        }
    }
}

/// Settings shared by every workload
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Common {
    /// Suspend every CronJob
    pub cronjob_suspend: bool,
    pub dns_policy: Option<String>,
    pub enable_service_links: bool,
    /// Termination grace period in seconds (0 keeps the cluster default)
    pub grace_period: i64,
    pub image: ImageSpec,
    pub ingress: IngressDefaults,
    pub mount_service_account_token: bool,
    #[serde(deserialize_with = "scalar_map")]
    pub node_selector: BTreeMap<String, String>,
    /// `preferred` or `required`
    #[serde(deserialize_with = "scalar_string")]
    pub pod_anti_affinity: String,
    /// Mount path of the `shared-data` volume
    #[serde(deserialize_with = "scalar_string")]
    pub shared_data: String,
    #[serde(deserialize_with = "null_as_default")]
    pub tolerations: Vec<Toleration>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ImageSpec {
    #[serde(deserialize_with = "scalar_string")]
    pub pull_policy: String,
    /// Name of the image pull secret
    #[serde(deserialize_with = "scalar_string")]
    pub pull_secrets: String,
    #[serde(deserialize_with = "scalar_string")]
    pub repository: String,
    #[serde(deserialize_with = "scalar_string")]
    pub tag: String,
}

impl Default for ImageSpec {
    fn default() -> Self {
        Self {
            pull_policy: String::new(),
            pull_secrets: String::new(),
            repository: String::new(),
            tag: DEFAULT_IMAGE_TAG.to_string(),
        }
    }
}

/// Ingress settings applied to every rule unless the rule overrides them
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IngressDefaults {
    #[serde(deserialize_with = "scalar_map")]
    pub annotations: BTreeMap<String, String>,
    #[serde(deserialize_with = "scalar_string")]
    pub class: String,
    pub letsencrypt: bool,
    #[serde(deserialize_with = "scalar_string")]
    pub service_name: String,
    pub service_port: i32,
    pub ssl_redirect: bool,
}

/// One ingress entry
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IngressRule {
    #[serde(deserialize_with = "scalar_string")]
    pub host: String,
    #[serde(deserialize_with = "scalar_string")]
    pub path: String,
    #[serde(deserialize_with = "null_as_default")]
    pub aliases: Vec<String>,
    #[serde(deserialize_with = "scalar_string")]
    pub tls_crt: String,
    #[serde(deserialize_with = "scalar_string")]
    pub tls_key: String,
    #[serde(deserialize_with = "scalar_string")]
    pub tls_secret_name: String,
    #[serde(deserialize_with = "scalar_map")]
    pub annotations: BTreeMap<String, String>,
    #[serde(deserialize_with = "scalar_string")]
    pub class: String,
    pub letsencrypt: bool,
    #[serde(deserialize_with = "scalar_string")]
    pub service_name: String,
    pub service_port: i32,
    pub ssl_redirect: bool,
}

impl IngressRule {
    /// TLS is on for letsencrypt, an explicit secret, or an inline cert/key pair
    pub fn tls_enabled(&self) -> bool {
        self.letsencrypt || !self.tls_secret_name.is_empty() || self.has_inline_cert()
    }

    pub fn has_inline_cert(&self) -> bool {
        !self.tls_crt.is_empty() && !self.tls_key.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServiceSpec {
    pub external_port: i32,
    pub internal_port: i32,
    /// Shorthand for both internal and external port
    pub port: i32,
    pub protocol: Option<String>,
    #[serde(rename = "type")]
    pub service_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DeploymentSpec {
    #[serde(deserialize_with = "scalar_string")]
    pub blue_green_color: String,
    #[serde(deserialize_with = "named_containers")]
    pub containers: BTreeMap<String, Container>,
    #[serde(deserialize_with = "named_containers")]
    pub init_containers: BTreeMap<String, Container>,
    pub replica_count: i32,
    pub replica_count_staging: i32,
    pub revision_history_limit: i32,
    pub strategy: Option<DeploymentStrategy>,
}

impl Default for DeploymentSpec {
    fn default() -> Self {
        Self {
            blue_green_color: String::new(),
            containers: BTreeMap::new(),
            init_containers: BTreeMap::new(),
            replica_count: 0,
            replica_count_staging: 0,
            revision_history_limit: DEFAULT_REVISION_HISTORY_LIMIT,
            strategy: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CronJobSpec {
    pub active_deadline_seconds: i64,
    pub backoff_limit: i32,
    pub concurrency_policy: Option<String>,
    /// Single job container; only used when it declares a command
    #[serde(deserialize_with = "optional_container")]
    pub container: Option<Container>,
    #[serde(deserialize_with = "named_containers")]
    pub containers: BTreeMap<String, Container>,
    pub failed_jobs_history_limit: i32,
    pub restart_policy: Option<String>,
    #[serde(deserialize_with = "scalar_string")]
    pub schedule: String,
    pub successful_jobs_history_limit: i32,
    pub suspend: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VolumeSpec {
    pub spec: PersistentVolumeClaimSpec,
    #[serde(deserialize_with = "scalar_string")]
    pub mount_path: String,
}

// =============================================================================
// LOADING AND NORMALIZATION
// =============================================================================

impl Application {
    /// Create an application with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Project merged values onto the schema and normalize the result
    pub fn from_values(values: &Values, keys: SecretKeys) -> Result<Self> {
        let mut app: Application = serde_json::from_value(values.inner().clone())
            .map_err(|e| CoreError::config(format!("invalid values: {e}")))?;
        app.keys = keys;
        app.normalize()?;
        tracing::debug!(
            name = %app.name,
            release = %app.release_name(),
            staging = app.is_staging(),
            "loaded application"
        );
        Ok(app)
    }

    /// Apply name sanitizing, default labels and staging rules
    pub fn normalize(&mut self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(CoreError::validation("application name is required"));
        }

        self.name = sanitize_name(&self.name);
        if self.name.is_empty() {
            return Err(CoreError::validation("application name is required"));
        }

        self.labels
            .entry(LABEL_INSTANCE.to_string())
            .or_insert_with(|| DEFAULT_INSTANCE.to_string());
        self.labels.insert(LABEL_NAME.to_string(), self.name.clone());
        self.labels
            .insert(LABEL_MANAGED_BY.to_string(), MANAGED_BY.to_string());

        if self.is_staging() {
            self.apply_staging()?;
        } else {
            self.deployment.blue_green_color = self.deployment.blue_green_color.to_lowercase();
        }

        Ok(())
    }

    fn apply_staging(&mut self) -> Result<()> {
        if let Some(rule) = self.ingress.iter().find(|r| r.host.starts_with('*')) {
            return Err(CoreError::validation(format!(
                "staging cannot be used with wildcard domain: {}",
                rule.host
            )));
        }

        self.staging = self.staging.to_lowercase();
        self.branch = self.branch.to_lowercase();

        self.common.image.pull_policy = "Always".to_string();
        self.deployment.blue_green_color.clear();
        self.deployment.revision_history_limit = 0;
        self.deployment.replica_count = if self.deployment.replica_count_staging > 0 {
            self.deployment.replica_count_staging
        } else {
            1
        };

        let instance = if self.branch.is_empty() {
            self.staging.clone()
        } else {
            format!("{}-{}", self.staging, self.branch)
        };
        self.labels
            .insert(LABEL_INSTANCE.to_string(), truncate_name(&instance));

        for rule in &mut self.ingress {
            let mut host = format!("{}.{}", self.staging, rule.host);
            if !self.branch.is_empty() {
                host = format!("{}.{}", self.branch, host);
            }
            rule.host = host;
        }

        Ok(())
    }

    /// Override the namespace (flag wins over values, `default` when neither is set)
    pub fn resolve_namespace(&mut self, override_ns: Option<&str>) {
        if let Some(ns) = override_ns.filter(|ns| !ns.is_empty()) {
            self.namespace = ns.to_string();
        }
        if self.namespace.is_empty() {
            self.namespace = DEFAULT_NAMESPACE.to_string();
        }
    }
}

/// Lowercase, `_` to `-`, then truncate
pub fn sanitize_name(name: &str) -> String {
    truncate_name(&name.trim().to_lowercase().replace('_', "-"))
}

/// Cut to 63 characters and strip trailing non-alphanumerics
pub fn truncate_name(name: &str) -> String {
    let truncated: String = name.chars().take(MAX_NAME_LENGTH).collect();
    truncated
        .trim_end_matches(|c: char| !c.is_alphanumeric())
        .to_string()
}

// =============================================================================
// DERIVED ACCESSORS
// =============================================================================

impl Application {
    pub fn is_staging(&self) -> bool {
        !self.staging.is_empty()
    }

    /// Base name for every resource: `name`, `name-staging` or `name-branch`
    pub fn release_name(&self) -> String {
        let release = if !self.is_staging() {
            self.name.clone()
        } else if self.branch.is_empty() {
            format!("{}-{}", self.name, self.staging)
        } else {
            format!("{}-{}", self.name, self.branch)
        };
        release.to_lowercase()
    }

    /// Release name plus the blue-green color suffix when one is set
    pub fn deployment_name(&self) -> String {
        match self.blue_green_color() {
            Some(color) => format!("{}-{}", self.release_name(), color),
            None => self.release_name(),
        }
    }

    pub fn blue_green_color(&self) -> Option<Color> {
        if self.deployment.blue_green_color.is_empty() {
            return None;
        }
        self.deployment.blue_green_color.parse().ok()
    }

    pub fn set_blue_green_color(&mut self, color: Option<Color>) {
        self.deployment.blue_green_color = color.map(|c| c.to_string()).unwrap_or_default();
    }

    /// Application labels plus the color label when blue-green is active
    pub fn color_labels(&self) -> BTreeMap<String, String> {
        let mut labels = self.labels.clone();
        if !self.deployment.blue_green_color.is_empty() {
            labels.insert(
                LABEL_COLOR.to_string(),
                self.deployment.blue_green_color.clone(),
            );
        }
        labels
    }

    /// `release` for an empty key, `release-key` otherwise
    pub fn service_name(&self, key: &str) -> String {
        if key.is_empty() {
            self.release_name()
        } else {
            format!("{}-{}", self.release_name(), key.to_lowercase())
        }
    }

    /// Label selector string (`k=v,...`, sorted by key) for the application labels
    pub fn selector(&self) -> String {
        self.labels
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Metadata with name, namespace and application labels
    pub fn object_meta(&self, name: impl Into<String>) -> ObjectMeta {
        ObjectMeta {
            name: Some(name.into()),
            namespace: (!self.namespace.is_empty()).then(|| self.namespace.clone()),
            labels: Some(self.labels.clone()),
            ..Default::default()
        }
    }

    /// Pod anti-affinity over the color labels (managed-by excluded)
    pub fn affinity(&self) -> Result<Option<Affinity>> {
        if self.common.pod_anti_affinity.is_empty() {
            return Ok(None);
        }

        let terms: Vec<PodAffinityTerm> = self
            .color_labels()
            .into_iter()
            .filter(|(key, _)| key != LABEL_MANAGED_BY)
            .map(|(key, value)| PodAffinityTerm {
                label_selector: Some(LabelSelector {
                    match_expressions: Some(vec![LabelSelectorRequirement {
                        key,
                        operator: "In".to_string(),
                        values: Some(vec![value]),
                    }]),
                    ..Default::default()
                }),
                topology_key: HOSTNAME_TOPOLOGY_KEY.to_string(),
                ..Default::default()
            })
            .collect();

        let anti_affinity = match self.common.pod_anti_affinity.to_lowercase().as_str() {
            "preferred" => PodAntiAffinity {
                preferred_during_scheduling_ignored_during_execution: Some(
                    terms
                        .into_iter()
                        .map(|term| WeightedPodAffinityTerm {
                            pod_affinity_term: term,
                            weight: 1,
                        })
                        .collect(),
                ),
                ..Default::default()
            },
            "required" => PodAntiAffinity {
                required_during_scheduling_ignored_during_execution: Some(terms),
                ..Default::default()
            },
            other => {
                return Err(CoreError::config(format!(
                    "unknown podAntiAffinity value: {other}"
                )));
            }
        };

        Ok(Some(Affinity {
            pod_anti_affinity: Some(anti_affinity),
            ..Default::default()
        }))
    }

    /// Secrets with encrypted values resolved
    pub fn decrypted_secrets(&self) -> Result<BTreeMap<String, String>> {
        self.keys.decrypt_all(&self.secrets)
    }

    /// Every ingress host and alias, sorted and deduplicated
    pub fn domains(&self) -> Vec<String> {
        let mut domains: Vec<String> = self
            .ingress
            .iter()
            .flat_map(|rule| std::iter::once(rule.host.clone()).chain(rule.aliases.iter().cloned()))
            .filter(|d| !d.is_empty())
            .collect();
        domains.sort();
        domains.dedup();
        domains
    }
}

// =============================================================================
// LENIENT DESERIALIZERS
// =============================================================================

fn scalar_to_string<E: serde::de::Error>(value: JsonValue) -> std::result::Result<String, E> {
    match value {
        JsonValue::Null => Ok(String::new()),
        JsonValue::String(s) => Ok(s),
        JsonValue::Number(n) => Ok(n.to_string()),
        JsonValue::Bool(b) => Ok(b.to_string()),
        other => Err(E::custom(format!("expected a scalar value, got {other}"))),
    }
}

/// Accept numbers and booleans where a string is expected (`--set tag=123`)
fn scalar_string<'de, D: Deserializer<'de>>(de: D) -> std::result::Result<String, D::Error> {
    scalar_to_string(JsonValue::deserialize(de)?)
}

fn scalar_map<'de, D: Deserializer<'de>>(
    de: D,
) -> std::result::Result<BTreeMap<String, String>, D::Error> {
    let raw: Option<BTreeMap<String, JsonValue>> = Option::deserialize(de)?;
    raw.unwrap_or_default()
        .into_iter()
        .map(|(k, v)| scalar_to_string(v).map(|s| (k, s)))
        .collect()
}

fn null_as_default<'de, D, T>(de: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(de)?.unwrap_or_default())
}

/// Build a `Container` from a values mapping, filling the fields Kubernetes
/// requires but the values format lets users omit
pub fn container_from_value(name: &str, value: JsonValue) -> serde_json::Result<Container> {
    let mut value = if value.is_null() {
        JsonValue::Object(serde_json::Map::new())
    } else {
        value
    };

    if let JsonValue::Object(map) = &mut value {
        map.entry("name")
            .or_insert_with(|| JsonValue::String(name.to_lowercase()));
        for probe in ["livenessProbe", "readinessProbe", "startupProbe"] {
            if let Some(JsonValue::Object(probe)) = map.get_mut(probe) {
                for action in ["httpGet", "tcpSocket"] {
                    if let Some(JsonValue::Object(action)) = probe.get_mut(action) {
                        action.entry("port").or_insert(JsonValue::from(0));
                    }
                }
            }
        }
    }

    serde_json::from_value(value)
}

fn named_containers<'de, D: Deserializer<'de>>(
    de: D,
) -> std::result::Result<BTreeMap<String, Container>, D::Error> {
    let raw: Option<BTreeMap<String, JsonValue>> = Option::deserialize(de)?;
    raw.unwrap_or_default()
        .into_iter()
        .map(|(name, value)| {
            let container = container_from_value(&name, value)
                .map_err(|e| D::Error::custom(format!("container '{name}': {e}")))?;
            Ok::<_, D::Error>((name, container))
        })
        .collect()
}

fn optional_container<'de, D: Deserializer<'de>>(
    de: D,
) -> std::result::Result<Option<Container>, D::Error> {
    let raw: Option<JsonValue> = Option::deserialize(de)?;
    match raw {
        None | Some(JsonValue::Null) => Ok(None),
        Some(value) => container_from_value("", value)
            .map(Some)
            .map_err(|e| D::Error::custom(format!("container: {e}"))),
    }
}

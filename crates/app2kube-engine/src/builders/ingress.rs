use std::collections::BTreeMap;

use app2kube_core::{Application, IngressRule, ServiceSpec};
use indexmap::IndexMap;
use k8s_openapi::ByteString;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::api::networking::v1::{
    HTTPIngressPath, HTTPIngressRuleValue, Ingress, IngressBackend,
    IngressRule as K8sIngressRule, IngressServiceBackend, IngressSpec, IngressTLS,
    ServiceBackendPort,
};

use super::resolve_ports;
use crate::container::effective_services;
use crate::error::{EngineError, Result};

pub const DEFAULT_INGRESS_CLASS: &str = "nginx";
pub const TLS_ACME_ANNOTATION: &str = "kubernetes.io/tls-acme";
pub const SSL_REDIRECT_ANNOTATION: &str = "nginx.ingress.kubernetes.io/ssl-redirect";
pub const TLS_SECRET_TYPE: &str = "kubernetes.io/tls";

const DEFAULT_PATH: &str = "/";
const PATH_TYPE: &str = "ImplementationSpecific";

/// Ingress objects, one per distinct host
///
/// Rules sharing a host are merged: their paths are unioned (the first rule
/// claiming a path wins), annotations and aliases accumulate and the first
/// TLS-enabled rule names the secret.
pub fn build_ingresses(app: &Application) -> Result<Vec<Ingress>> {
    let Some(services) = ingress_services(app)? else {
        return Ok(Vec::new());
    };

    let mut hosts: IndexMap<&str, HostIngress> = IndexMap::new();
    for rule in &app.ingress {
        let backend = resolve_backend(app, rule, &services)?;
        hosts
            .entry(rule.host.as_str())
            .or_insert_with(|| HostIngress::new(app, rule))
            .merge(app, rule, backend);
    }

    tracing::debug!(count = hosts.len(), "built ingress objects");
    Ok(hosts
        .into_values()
        .map(|host| host.into_ingress(app))
        .collect())
}

/// TLS secrets carrying inline certificates or awaiting letsencrypt issuance
pub fn build_ingress_secrets(app: &Application) -> Result<Vec<Secret>> {
    if ingress_services(app)?.is_none() {
        return Ok(Vec::new());
    }

    let mut secrets: IndexMap<String, Secret> = IndexMap::new();
    for rule in &app.ingress {
        let awaiting_issuance = letsencrypt(app, rule) && rule.tls_secret_name.is_empty();
        if !awaiting_issuance && !rule.has_inline_cert() {
            continue;
        }

        let name = tls_secret_name(rule);
        secrets.entry(name.clone()).or_insert_with(|| Secret {
            metadata: app.object_meta(name),
            data: Some(BTreeMap::from([
                ("tls.crt".to_string(), ByteString(rule.tls_crt.clone().into_bytes())),
                ("tls.key".to_string(), ByteString(rule.tls_key.clone().into_bytes())),
            ])),
            type_: Some(TLS_SECRET_TYPE.to_string()),
            ..Default::default()
        });
    }

    Ok(secrets.into_values().collect())
}

/// Effective services, or `None` when ingress resources are not built at all
fn ingress_services(app: &Application) -> Result<Option<BTreeMap<String, ServiceSpec>>> {
    if app.deployment.containers.is_empty() || app.ingress.is_empty() {
        return Ok(None);
    }
    let services = effective_services(app)?;
    Ok((!services.is_empty()).then_some(services))
}

fn letsencrypt(app: &Application, rule: &IngressRule) -> bool {
    rule.letsencrypt || app.common.ingress.letsencrypt
}

fn tls_enabled(app: &Application, rule: &IngressRule) -> bool {
    rule.tls_enabled() || letsencrypt(app, rule)
}

fn host_slug(host: &str) -> String {
    host.replacen('*', "wildcard", 1)
}

fn tls_secret_name(rule: &IngressRule) -> String {
    if rule.tls_secret_name.is_empty() {
        format!("tls-{}", host_slug(&rule.host)).to_lowercase()
    } else {
        rule.tls_secret_name.to_lowercase()
    }
}

/// Backend service name and port for one rule
fn resolve_backend(
    app: &Application,
    rule: &IngressRule,
    services: &BTreeMap<String, ServiceSpec>,
) -> Result<(String, i32)> {
    let defaults = &app.common.ingress;
    let sole = (services.len() == 1)
        .then(|| services.iter().next())
        .flatten();

    let name = if !rule.service_name.is_empty() {
        rule.service_name.to_lowercase()
    } else if !defaults.service_name.is_empty() {
        defaults.service_name.to_lowercase()
    } else if let Some((key, _)) = sole {
        app.service_name(key)
    } else {
        return Err(EngineError::config(format!(
            "serviceName required for ingress: {}",
            rule.host
        )));
    };

    let port = if rule.service_port > 0 {
        rule.service_port
    } else if defaults.service_port > 0 {
        defaults.service_port
    } else if let Some((key, spec)) = sole {
        resolve_ports(key, spec)?.1
    } else {
        return Err(EngineError::config(format!(
            "servicePort required for ingress: {}",
            rule.host
        )));
    };

    Ok((name, port))
}

/// Accumulated state for every rule on one host
struct HostIngress {
    name: String,
    host: String,
    class: String,
    annotations: BTreeMap<String, String>,
    paths: Vec<HTTPIngressPath>,
    aliases: Vec<String>,
    tls_secret: Option<String>,
}

impl HostIngress {
    fn new(app: &Application, rule: &IngressRule) -> Self {
        let class = [&rule.class, &app.common.ingress.class]
            .into_iter()
            .find(|c| !c.is_empty())
            .cloned()
            .unwrap_or_else(|| DEFAULT_INGRESS_CLASS.to_string());

        Self {
            name: format!("{}-{}", app.name, host_slug(&rule.host)).to_lowercase(),
            host: rule.host.clone(),
            class,
            annotations: BTreeMap::new(),
            paths: Vec::new(),
            aliases: Vec::new(),
            tls_secret: None,
        }
    }

    fn merge(&mut self, app: &Application, rule: &IngressRule, backend: (String, i32)) {
        if letsencrypt(app, rule) {
            self.annotations
                .insert(TLS_ACME_ANNOTATION.to_string(), "true".to_string());
        }
        self.annotations.extend(app.common.ingress.annotations.clone());
        self.annotations.extend(rule.annotations.clone());

        if tls_enabled(app, rule) {
            let redirect = rule.ssl_redirect || app.common.ingress.ssl_redirect;
            self.annotations
                .insert(SSL_REDIRECT_ANNOTATION.to_string(), redirect.to_string());
            self.tls_secret.get_or_insert_with(|| tls_secret_name(rule));
        }

        let path = if rule.path.is_empty() {
            DEFAULT_PATH
        } else {
            rule.path.as_str()
        };
        if !self.paths.iter().any(|p| p.path.as_deref() == Some(path)) {
            let (service_name, port) = backend;
            self.paths.push(HTTPIngressPath {
                path: Some(path.to_string()),
                path_type: PATH_TYPE.to_string(),
                backend: IngressBackend {
                    service: Some(IngressServiceBackend {
                        name: service_name,
                        port: Some(ServiceBackendPort {
                            number: Some(port),
                            ..Default::default()
                        }),
                    }),
                    ..Default::default()
                },
            });
        }

        if !app.is_staging() {
            for alias in &rule.aliases {
                if !alias.is_empty() && !self.aliases.contains(alias) {
                    self.aliases.push(alias.clone());
                }
            }
        }
    }

    fn into_ingress(self, app: &Application) -> Ingress {
        let hosts: Vec<String> = std::iter::once(self.host)
            .chain(self.aliases)
            .collect();

        let http = HTTPIngressRuleValue { paths: self.paths };
        let rules = hosts
            .iter()
            .map(|host| K8sIngressRule {
                host: Some(host.clone()),
                http: Some(http.clone()),
            })
            .collect();

        let tls = self.tls_secret.map(|secret_name| {
            vec![IngressTLS {
                hosts: Some(hosts),
                secret_name: Some(secret_name),
            }]
        });

        let mut metadata = app.object_meta(self.name);
        metadata.annotations = (!self.annotations.is_empty()).then_some(self.annotations);

        Ingress {
            metadata,
            spec: Some(IngressSpec {
                ingress_class_name: Some(self.class),
                rules: Some(rules),
                tls,
                ..Default::default()
            }),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builders::test_support::{WEB, app};

    fn single(yaml: &str) -> Ingress {
        let mut ingresses = build_ingresses(&app(&format!("{WEB}{yaml}"))).unwrap();
        assert_eq!(ingresses.len(), 1);
        ingresses.remove(0)
    }

    fn backend(ingress: &Ingress, rule: usize, path: usize) -> (String, i32) {
        let spec = ingress.spec.as_ref().unwrap();
        let path = &spec.rules.as_ref().unwrap()[rule].http.as_ref().unwrap().paths[path];
        let service = path.backend.service.as_ref().unwrap();
        (
            service.name.clone(),
            service.port.as_ref().unwrap().number.unwrap(),
        )
    }

    #[test]
    fn test_sole_service_fallback() {
        let ingress = single("ingress:\n  - host: example.com\n");

        assert_eq!(ingress.metadata.name.as_deref(), Some("web-example.com"));
        let spec = ingress.spec.as_ref().unwrap();
        assert_eq!(spec.ingress_class_name.as_deref(), Some("nginx"));
        assert!(spec.tls.is_none());
        assert!(ingress.metadata.annotations.is_none());

        let path = &spec.rules.as_ref().unwrap()[0].http.as_ref().unwrap().paths[0];
        assert_eq!(path.path.as_deref(), Some("/"));
        assert_eq!(path.path_type, "ImplementationSpecific");
        assert_eq!(backend(&ingress, 0, 0), ("web-http".to_string(), 8080));
    }

    #[test]
    fn test_service_name_required_with_two_services() {
        let app = app(&format!(
            "{WEB}service:\n  http:\n    port: 80\n  admin:\n    port: 81\ningress:\n  - host: example.com\n"
        ));
        let err = build_ingresses(&app).unwrap_err();
        assert!(err.is_config());
        assert!(err.to_string().contains("serviceName required"));
    }

    #[test]
    fn test_service_port_required_with_two_services() {
        let app = app(&format!(
            "{WEB}service:\n  http:\n    port: 80\n  admin:\n    port: 81\ningress:\n  - host: example.com\n    serviceName: web-http\n"
        ));
        let err = build_ingresses(&app).unwrap_err();
        assert!(err.to_string().contains("servicePort required"));
    }

    #[test]
    fn test_common_defaults() {
        let mut app = app(&format!(
            "{WEB}service:\n  http:\n    port: 80\n  admin:\n    port: 81\ningress:\n  - host: example.com\n"
        ));
        app.common.ingress.service_name = "Web-Admin".to_string();
        app.common.ingress.service_port = 81;
        app.common.ingress.class = "traefik".to_string();

        let ingresses = build_ingresses(&app).unwrap();
        let ingress = &ingresses[0];
        assert_eq!(backend(ingress, 0, 0), ("web-admin".to_string(), 81));
        assert_eq!(
            ingress.spec.as_ref().unwrap().ingress_class_name.as_deref(),
            Some("traefik")
        );
    }

    #[test]
    fn test_tls_and_annotations() {
        let ingress = single(
            "\
ingress:
  - host: '*.Example.com'
    letsencrypt: true
    sslRedirect: true
    annotations:
      nginx.ingress.kubernetes.io/proxy-body-size: 10m
    aliases: [www.example.org]
",
        );

        assert_eq!(ingress.metadata.name.as_deref(), Some("web-wildcard.example.com"));
        let annotations = ingress.metadata.annotations.as_ref().unwrap();
        assert_eq!(annotations[TLS_ACME_ANNOTATION], "true");
        assert_eq!(annotations[SSL_REDIRECT_ANNOTATION], "true");
        assert_eq!(annotations["nginx.ingress.kubernetes.io/proxy-body-size"], "10m");

        let spec = ingress.spec.as_ref().unwrap();
        let tls = &spec.tls.as_ref().unwrap()[0];
        assert_eq!(tls.secret_name.as_deref(), Some("tls-wildcard.example.com"));
        assert_eq!(
            tls.hosts.as_deref().unwrap(),
            ["*.Example.com", "www.example.org"]
        );

        let hosts: Vec<_> = spec
            .rules
            .as_ref()
            .unwrap()
            .iter()
            .map(|r| r.host.as_deref().unwrap())
            .collect();
        assert_eq!(hosts, ["*.Example.com", "www.example.org"]);
    }

    #[test]
    fn test_rule_annotations_override_common() {
        let mut app = app(&format!(
            "{WEB}ingress:\n  - host: example.com\n    annotations:\n      a: rule\n"
        ));
        app.common
            .ingress
            .annotations
            .extend([("a".to_string(), "common".to_string()), ("b".to_string(), "common".to_string())]);

        let ingresses = build_ingresses(&app).unwrap();
        let annotations = ingresses[0].metadata.annotations.as_ref().unwrap();
        assert_eq!(annotations["a"], "rule");
        assert_eq!(annotations["b"], "common");
    }

    #[test]
    fn test_rules_merged_by_host() {
        let app = app(&format!(
            "\
{WEB}service:
  http:
    port: 80
  api:
    port: 81
ingress:
  - host: example.com
    serviceName: web-http
    servicePort: 80
  - host: example.com
    path: /api
    serviceName: web-api
    servicePort: 81
    tlsSecretName: Wildcard-Cert
  - host: example.com
    path: /
    serviceName: web-api
    servicePort: 81
  - host: other.com
    serviceName: web-http
    servicePort: 80
"
        ));

        let ingresses = build_ingresses(&app).unwrap();
        assert_eq!(ingresses.len(), 2);
        assert_eq!(ingresses[0].metadata.name.as_deref(), Some("web-example.com"));
        assert_eq!(ingresses[1].metadata.name.as_deref(), Some("web-other.com"));

        let spec = ingresses[0].spec.as_ref().unwrap();
        let rules = spec.rules.as_ref().unwrap();
        assert_eq!(rules.len(), 1);
        let paths = &rules[0].http.as_ref().unwrap().paths;
        assert_eq!(paths.len(), 2);
        assert_eq!(backend(&ingresses[0], 0, 0), ("web-http".to_string(), 80));
        assert_eq!(backend(&ingresses[0], 0, 1), ("web-api".to_string(), 81));

        let tls = &spec.tls.as_ref().unwrap()[0];
        assert_eq!(tls.secret_name.as_deref(), Some("wildcard-cert"));
        assert_eq!(
            ingresses[0].metadata.annotations.as_ref().unwrap()[SSL_REDIRECT_ANNOTATION],
            "false"
        );
    }

    #[test]
    fn test_staging_drops_aliases() {
        let app = app(&format!(
            "{WEB}staging: PR1\ningress:\n  - host: example.com\n    letsencrypt: true\n    aliases: [www.example.com]\n"
        ));

        let ingresses = build_ingresses(&app).unwrap();
        let spec = ingresses[0].spec.as_ref().unwrap();
        assert_eq!(spec.rules.as_ref().unwrap().len(), 1);
        assert_eq!(
            spec.rules.as_ref().unwrap()[0].host.as_deref(),
            Some("pr1.example.com")
        );
        assert_eq!(
            spec.tls.as_ref().unwrap()[0].hosts.as_deref().unwrap(),
            ["pr1.example.com"]
        );
    }

    #[test]
    fn test_no_ingress_without_services() {
        let app = app(
            "name: web\ncommon:\n  image:\n    repository: example/web\ndeployment:\n  containers:\n    app: {}\ningress:\n  - host: example.com\n",
        );
        assert!(build_ingresses(&app).unwrap().is_empty());
        assert!(build_ingress_secrets(&app).unwrap().is_empty());
    }

    #[test]
    fn test_ingress_secrets() {
        let app = app(&format!(
            "\
{WEB}ingress:
  - host: a.example.com
    tlsCrt: CERT
    tlsKey: KEY
  - host: b.example.com
    letsencrypt: true
  - host: c.example.com
    letsencrypt: true
    tlsSecretName: existing
  - host: a.example.com
    path: /other
    tlsCrt: CERT
    tlsKey: KEY
"
        ));

        let secrets = build_ingress_secrets(&app).unwrap();
        let names: Vec<_> = secrets
            .iter()
            .map(|s| s.metadata.name.as_deref().unwrap())
            .collect();
        assert_eq!(names, ["tls-a.example.com", "tls-b.example.com"]);

        let inline = &secrets[0];
        assert_eq!(inline.type_.as_deref(), Some(TLS_SECRET_TYPE));
        let data = inline.data.as_ref().unwrap();
        assert_eq!(data["tls.crt"].0, b"CERT");
        assert_eq!(data["tls.key"].0, b"KEY");

        assert!(secrets[1].data.as_ref().unwrap()["tls.crt"].0.is_empty());
    }
}

use app2kube_core::{Application, ServiceSpec};
use k8s_openapi::api::core::v1::{Service, ServicePort, ServiceSpec as K8sServiceSpec};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;

use crate::container::effective_services;
use crate::error::{EngineError, Result};

const NODE_PORT: &str = "NodePort";

/// Internal and external port of a service entry
///
/// `port` seeds both sides; a single given side fills the other.
pub fn resolve_ports(name: &str, spec: &ServiceSpec) -> Result<(i32, i32)> {
    let mut internal = spec.internal_port;
    let mut external = spec.external_port;

    if spec.port > 0 {
        if internal == 0 {
            internal = spec.port;
        }
        if external == 0 {
            external = spec.port;
        }
    }

    match (internal, external) {
        (0, 0) => Err(EngineError::config(format!(
            "port required for service: {name}"
        ))),
        (0, external) => Ok((external, external)),
        (internal, 0) => Ok((internal, internal)),
        ports => Ok(ports),
    }
}

/// One Service per effective service entry; none without containers
pub fn build_services(app: &Application) -> Result<Vec<Service>> {
    if app.deployment.containers.is_empty() {
        return Ok(Vec::new());
    }

    effective_services(app)?
        .iter()
        .map(|(name, spec)| {
            let (internal, external) = resolve_ports(name, spec)?;
            let service_type = spec.service_type.clone().filter(|t| !t.is_empty());
            let node_port = (service_type.as_deref() == Some(NODE_PORT)).then_some(external);

            Ok(Service {
                metadata: app.object_meta(app.service_name(name)),
                spec: Some(K8sServiceSpec {
                    ports: Some(vec![ServicePort {
                        port: external,
                        target_port: Some(IntOrString::Int(internal)),
                        protocol: spec.protocol.clone().filter(|p| !p.is_empty()),
                        node_port,
                        ..Default::default()
                    }]),
                    selector: Some(app.color_labels()),
                    type_: service_type,
                    ..Default::default()
                }),
                ..Default::default()
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builders::test_support::{WEB, app};
    use app2kube_core::{Color, LABEL_COLOR};

    fn ports(internal: i32, external: i32, port: i32) -> ServiceSpec {
        ServiceSpec {
            internal_port: internal,
            external_port: external,
            port,
            ..Default::default()
        }
    }

    #[test]
    fn test_port_fallbacks() {
        assert_eq!(resolve_ports("a", &ports(0, 0, 80)).unwrap(), (80, 80));
        assert_eq!(resolve_ports("a", &ports(8080, 0, 0)).unwrap(), (8080, 8080));
        assert_eq!(resolve_ports("a", &ports(0, 443, 0)).unwrap(), (443, 443));
        assert_eq!(resolve_ports("a", &ports(8080, 0, 80)).unwrap(), (8080, 80));
        assert_eq!(resolve_ports("a", &ports(8080, 80, 0)).unwrap(), (8080, 80));

        let err = resolve_ports("api", &ports(0, 0, 0)).unwrap_err();
        assert!(err.is_config());
        assert_eq!(err.to_string(), "port required for service: api");
    }

    #[test]
    fn test_declared_service() {
        let app = app(&format!(
            "{WEB}service:\n  http:\n    internalPort: 8080\n    externalPort: 80\n    protocol: TCP\n"
        ));
        let services = build_services(&app).unwrap();
        assert_eq!(services.len(), 1);

        let service = &services[0];
        assert_eq!(service.metadata.name.as_deref(), Some("web-http"));

        let spec = service.spec.as_ref().unwrap();
        let port = &spec.ports.as_ref().unwrap()[0];
        assert_eq!(port.port, 80);
        assert_eq!(port.target_port, Some(IntOrString::Int(8080)));
        assert_eq!(port.protocol.as_deref(), Some("TCP"));
        assert!(port.node_port.is_none());
        assert!(spec.type_.is_none());
    }

    #[test]
    fn test_node_port() {
        let app = app(&format!("{WEB}service:\n  http:\n    port: 30080\n    type: NodePort\n"));
        let services = build_services(&app).unwrap();
        let spec = services[0].spec.as_ref().unwrap();
        assert_eq!(spec.type_.as_deref(), Some("NodePort"));
        assert_eq!(spec.ports.as_ref().unwrap()[0].node_port, Some(30080));
    }

    #[test]
    fn test_selector_follows_color() {
        let mut app = app(&format!("{WEB}service:\n  http:\n    port: 80\n"));
        app.set_blue_green_color(Some(Color::Blue));

        let services = build_services(&app).unwrap();
        let selector = services[0].spec.as_ref().unwrap().selector.clone().unwrap();
        assert_eq!(selector[LABEL_COLOR], "blue");
        // Service metadata keeps the plain application labels.
        assert!(!services[0].metadata.labels.as_ref().unwrap().contains_key(LABEL_COLOR));
    }

    #[test]
    fn test_auto_service_from_ingress() {
        let app = app(&format!("{WEB}ingress:\n  - host: example.com\n"));
        let services = build_services(&app).unwrap();
        assert_eq!(services.len(), 1);
        assert_eq!(services[0].metadata.name.as_deref(), Some("web-http"));
        assert_eq!(
            services[0].spec.as_ref().unwrap().ports.as_ref().unwrap()[0].port,
            8080
        );
    }

    #[test]
    fn test_none_without_containers() {
        let app = app("name: web\nservice:\n  http:\n    port: 80\n");
        assert!(build_services(&app).unwrap().is_empty());
    }
}

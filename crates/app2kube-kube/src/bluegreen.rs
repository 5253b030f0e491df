//! Blue-green deployment
//!
//! The live color is whatever the application's Services select. A deploy
//! brings up the other color next to it, waits for it to be ready and only
//! then re-applies the Services (and everything else outside the
//! Deployment) so traffic moves over. A failure before that step leaves the
//! old color serving.

use std::time::Duration;

use app2kube_core::{Application, Color, LABEL_COLOR};
use app2kube_engine::{Manifest, OutputKind};

use crate::cluster::{ApplyOptions, Cluster, OperationSummary, RolloutStatus};
use crate::error::{KubeError, Result};
use crate::tracker::{DEFAULT_POLL_INTERVAL, RolloutTracker};

/// Readiness window for the color a rollback returns to
pub const ROLLBACK_CHECK_TIMEOUT: Duration = Duration::from_secs(60);

/// Step of a blue-green deploy, reported before it starts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Applying the Deployment and what it mounts
    PreDeploy,
    /// Waiting for the new color to become ready
    Waiting,
    /// Applying Services, Ingresses and CronJobs
    Finalize,
}

/// Options for [`BlueGreen::deploy`]
#[derive(Debug, Clone)]
pub struct DeployOptions {
    pub dry_run: bool,
    /// Also apply the Namespace before the Deployment
    pub include_namespace: bool,
    /// Rollout deadline; `None` waits forever
    pub timeout: Option<Duration>,
    pub poll_interval: Duration,
    /// Delete the previous color's Deployment after the cutover
    pub prune_previous: bool,
}

impl Default for DeployOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            include_namespace: false,
            timeout: Some(Duration::from_secs(15 * 60)),
            poll_interval: DEFAULT_POLL_INTERVAL,
            prune_previous: false,
        }
    }
}

/// What a deploy did
#[derive(Debug, Clone)]
pub struct DeployReport {
    pub color: Color,
    pub previous: Option<Color>,
    pub pre_deploy: OperationSummary,
    pub rollout: Option<RolloutStatus>,
    pub finalize: OperationSummary,
    /// Deployment removed with `prune_previous`
    pub pruned: Option<String>,
}

/// What a rollback did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RollbackReport {
    pub color: Color,
    pub deployment: String,
    pub services: Vec<String>,
}

/// Blue-green operations for one namespace
pub struct BlueGreen<'a> {
    cluster: &'a dyn Cluster,
    namespace: String,
}

impl<'a> BlueGreen<'a> {
    pub fn new(cluster: &'a dyn Cluster, namespace: impl Into<String>) -> Self {
        Self {
            cluster,
            namespace: namespace.into(),
        }
    }

    /// Color selected by the first Service matching the application labels
    pub async fn live_color(&self, app: &Application) -> Result<Color> {
        let selector = app.selector();
        let services = self.cluster.list_services(&self.namespace, &selector).await?;

        let service = services.first().ok_or_else(|| KubeError::NoServices {
            namespace: self.namespace.clone(),
            selector,
        })?;
        service.color().ok_or_else(|| KubeError::NoColor {
            service: service.name.clone(),
        })
    }

    /// Live color, or `None` when it cannot be determined
    pub async fn current_color(&self, app: &Application) -> Option<Color> {
        match self.live_color(app).await {
            Ok(color) => Some(color),
            Err(e) => {
                tracing::debug!(error = %e, "no live color");
                None
            }
        }
    }

    /// Color the next deploy goes to
    pub async fn target_color(&self, app: &Application) -> Color {
        let current = self.current_color(app).await;
        let target = Color::target_after(current);
        tracing::debug!(current = ?current, target = %target, "resolved blue-green color");
        target
    }

    /// Deploy `app` to the non-live color and switch traffic to it
    ///
    /// `on_stage` is called before each step. The color is set on `app`.
    pub async fn deploy<F>(
        &self,
        app: &mut Application,
        options: &DeployOptions,
        mut on_stage: F,
    ) -> Result<DeployReport>
    where
        F: FnMut(Stage, Color),
    {
        let previous = self.current_color(app).await;
        let color = Color::target_after(previous);
        app.set_blue_green_color(Some(color));

        let apply = ApplyOptions {
            dry_run: options.dry_run,
            prune_selector: None,
        };

        let mut kinds = vec![OutputKind::AllForDeployment];
        if options.include_namespace {
            kinds.insert(0, OutputKind::Namespace);
        }

        on_stage(Stage::PreDeploy, color);
        let manifest = Manifest::build(app, &kinds)?;
        let pre_deploy = self
            .cluster
            .apply(&self.namespace, &manifest, &apply)
            .await?
            .into_result("pre-deploy")?;

        // A dry run creates nothing to wait for.
        let rollout = if options.dry_run {
            None
        } else {
            on_stage(Stage::Waiting, color);
            let tracker = RolloutTracker::new(self.cluster, self.namespace.as_str())
                .with_timeout(options.timeout)
                .with_poll_interval(options.poll_interval);
            Some(tracker.wait_ready(&app.deployment_name()).await?)
        };

        on_stage(Stage::Finalize, color);
        let manifest = Manifest::build(app, &[OutputKind::AllOther])?;
        let finalize = self
            .cluster
            .apply(&self.namespace, &manifest, &apply)
            .await?
            .into_result("final deploy")?;

        let mut pruned = None;
        if options.prune_previous
            && !options.dry_run
            && let Some(previous) = previous
        {
            let name = deployment_name(app, previous);
            self.cluster
                .delete_deployment(&self.namespace, &name)
                .await?;
            pruned = Some(name);
        }

        tracing::info!(color = %color, release = %app.release_name(), "blue-green deploy finished");
        Ok(DeployReport {
            color,
            previous,
            pre_deploy,
            rollout,
            finalize,
            pruned,
        })
    }

    /// Point every Service back at the color that is not live
    ///
    /// That color's Deployment must be ready within [`ROLLBACK_CHECK_TIMEOUT`].
    pub async fn rollback(&self, app: &Application) -> Result<RollbackReport> {
        self.rollback_with(app, ROLLBACK_CHECK_TIMEOUT, DEFAULT_POLL_INTERVAL)
            .await
    }

    async fn rollback_with(
        &self,
        app: &Application,
        timeout: Duration,
        poll_interval: Duration,
    ) -> Result<RollbackReport> {
        let color = self.target_color(app).await;
        let deployment = deployment_name(app, color);

        RolloutTracker::new(self.cluster, self.namespace.as_str())
            .with_timeout(Some(timeout))
            .with_poll_interval(poll_interval)
            .wait_ready(&deployment)
            .await?;

        let selector = app.selector();
        let services = self.cluster.list_services(&self.namespace, &selector).await?;
        if services.is_empty() {
            return Err(KubeError::NoServices {
                namespace: self.namespace.clone(),
                selector,
            });
        }

        let mut patched = Vec::with_capacity(services.len());
        for service in services {
            self.cluster
                .patch_service_selector(&self.namespace, &service.name, LABEL_COLOR, color.as_str())
                .await?;
            tracing::info!(service = %service.name, color = %color, "service switched");
            patched.push(service.name);
        }

        Ok(RollbackReport {
            color,
            deployment,
            services: patched,
        })
    }

    /// Delete the Deployment of the color that is not live; returns its name
    pub async fn prune(&self, app: &Application) -> Result<String> {
        let color = self.target_color(app).await;
        let deployment = deployment_name(app, color);
        self.cluster
            .delete_deployment(&self.namespace, &deployment)
            .await?;
        tracing::info!(deployment = %deployment, "previous color pruned");
        Ok(deployment)
    }
}

fn deployment_name(app: &Application, color: Color) -> String {
    format!("{}-{}", app.release_name(), color)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::ServiceInfo;
    use crate::mock::MockCluster;
    use app2kube_core::{LABEL_INSTANCE, LABEL_MANAGED_BY, LABEL_NAME, SecretKeys, Values};

    const NS: &str = "default";

    fn app() -> Application {
        let values = Values::from_yaml(
            "\
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
service:
  http:
    internalPort: 8080
    externalPort: 80
ingress:
  - host: example.com
",
        )
        .unwrap();
        Application::from_values(&values, SecretKeys::default()).unwrap()
    }

    fn live_service(app: &Application, color: Option<Color>) -> ServiceInfo {
        let mut selector = app.labels.clone();
        if let Some(color) = color {
            selector.insert(LABEL_COLOR.to_string(), color.to_string());
        }
        ServiceInfo {
            name: "web-http".to_string(),
            labels: app.labels.clone(),
            selector,
        }
    }

    fn fast() -> DeployOptions {
        DeployOptions {
            timeout: Some(Duration::from_millis(50)),
            poll_interval: Duration::from_millis(5),
            ..Default::default()
        }
    }

    fn pending() -> RolloutStatus {
        RolloutStatus {
            ready: 0,
            available: 0,
            ..RolloutStatus::ready(1)
        }
    }

    #[test]
    fn test_app_labels() {
        let app = app();
        let keys: Vec<_> = app.labels.keys().map(String::as_str).collect();
        assert_eq!(keys, [LABEL_INSTANCE, LABEL_MANAGED_BY, LABEL_NAME]);
    }

    #[tokio::test]
    async fn test_target_color() {
        let app = app();

        let cluster = MockCluster::new();
        assert_eq!(BlueGreen::new(&cluster, NS).target_color(&app).await, Color::Blue);

        let cluster = MockCluster::new().with_service(NS, live_service(&app, Some(Color::Blue)));
        assert_eq!(BlueGreen::new(&cluster, NS).target_color(&app).await, Color::Green);

        let cluster = MockCluster::new().with_service(NS, live_service(&app, Some(Color::Green)));
        assert_eq!(BlueGreen::new(&cluster, NS).target_color(&app).await, Color::Blue);

        let cluster = MockCluster::new().with_failing_list();
        assert_eq!(BlueGreen::new(&cluster, NS).target_color(&app).await, Color::Blue);
    }

    #[tokio::test]
    async fn test_live_color_errors() {
        let app = app();

        let cluster = MockCluster::new();
        let err = BlueGreen::new(&cluster, NS).live_color(&app).await.unwrap_err();
        assert!(matches!(err, KubeError::NoServices { .. }));

        let cluster = MockCluster::new().with_service(NS, live_service(&app, None));
        let err = BlueGreen::new(&cluster, NS).live_color(&app).await.unwrap_err();
        assert!(matches!(err, KubeError::NoColor { .. }));
    }

    #[tokio::test]
    async fn test_first_deploy_goes_blue() {
        let mut app = app();
        let cluster = MockCluster::new();
        let mut stages = Vec::new();

        let report = BlueGreen::new(&cluster, NS)
            .deploy(&mut app, &fast(), |stage, color| stages.push((stage, color)))
            .await
            .unwrap();

        assert_eq!(report.color, Color::Blue);
        assert_eq!(report.previous, None);
        assert!(report.rollout.unwrap().is_ready());
        assert_eq!(
            stages,
            [
                (Stage::PreDeploy, Color::Blue),
                (Stage::Waiting, Color::Blue),
                (Stage::Finalize, Color::Blue),
            ]
        );

        let calls = cluster.calls().await;
        let deployment = calls
            .iter()
            .position(|c| c == "apply default Deployment/web-blue")
            .unwrap();
        let service = calls
            .iter()
            .position(|c| c == "apply default Service/web-http")
            .unwrap();
        assert!(deployment < service);

        let live = cluster.service(NS, "web-http").await.unwrap();
        assert_eq!(live.color(), Some(Color::Blue));
    }

    #[tokio::test]
    async fn test_deploy_flips_and_prunes_previous() {
        let mut app = app();
        let cluster = MockCluster::new()
            .with_service(NS, live_service(&app, Some(Color::Blue)))
            .with_rollout(NS, "web-blue", [RolloutStatus::ready(1)]);

        let options = DeployOptions {
            prune_previous: true,
            ..fast()
        };
        let report = BlueGreen::new(&cluster, NS)
            .deploy(&mut app, &options, |_, _| {})
            .await
            .unwrap();

        assert_eq!(report.color, Color::Green);
        assert_eq!(report.previous, Some(Color::Blue));
        assert_eq!(report.pruned.as_deref(), Some("web-blue"));
        assert_eq!(app.deployment_name(), "web-green");
        assert!(cluster.has_deployment(NS, "web-green").await);
        assert!(!cluster.has_deployment(NS, "web-blue").await);
        assert_eq!(
            cluster.service(NS, "web-http").await.unwrap().color(),
            Some(Color::Green)
        );
    }

    #[tokio::test]
    async fn test_timeout_keeps_old_color_live() {
        let mut app = app();
        let cluster = MockCluster::new()
            .with_service(NS, live_service(&app, Some(Color::Blue)))
            .with_rollout(NS, "web-green", [pending()]);

        let err = BlueGreen::new(&cluster, NS)
            .deploy(&mut app, &fast(), |_, _| {})
            .await
            .unwrap_err();
        assert!(err.is_timeout());

        assert_eq!(
            cluster.service(NS, "web-http").await.unwrap().color(),
            Some(Color::Blue)
        );
        let calls = cluster.calls().await;
        assert!(!calls.iter().any(|c| c.contains("Service/") || c.contains("Ingress/")));
    }

    #[tokio::test]
    async fn test_dry_run_skips_wait() {
        let mut app = app();
        let cluster = MockCluster::new();
        let options = DeployOptions {
            dry_run: true,
            prune_previous: true,
            ..fast()
        };

        let report = BlueGreen::new(&cluster, NS)
            .deploy(&mut app, &options, |_, _| {})
            .await
            .unwrap();
        assert!(report.rollout.is_none());
        assert!(report.pruned.is_none());
        assert!(!cluster.has_deployment(NS, "web-blue").await);
    }

    #[tokio::test]
    async fn test_include_namespace_applied_first() {
        let mut app = app();
        app.resolve_namespace(None);
        let cluster = MockCluster::new();
        let options = DeployOptions {
            include_namespace: true,
            ..fast()
        };

        BlueGreen::new(&cluster, NS)
            .deploy(&mut app, &options, |_, _| {})
            .await
            .unwrap();
        let calls = cluster.calls().await;
        let first_apply = calls.iter().find(|c| c.starts_with("apply ")).unwrap();
        assert_eq!(first_apply, "apply default Namespace/default");
    }

    #[tokio::test]
    async fn test_rollback_switches_services() {
        let app = app();
        let cluster = MockCluster::new()
            .with_service(NS, live_service(&app, Some(Color::Green)))
            .with_rollout(NS, "web-blue", [RolloutStatus::ready(1)]);

        let report = BlueGreen::new(&cluster, NS)
            .rollback_with(&app, Duration::from_millis(20), Duration::from_millis(5))
            .await
            .unwrap();

        assert_eq!(report.color, Color::Blue);
        assert_eq!(report.deployment, "web-blue");
        assert_eq!(report.services, ["web-http"]);

        let live = cluster.service(NS, "web-http").await.unwrap();
        assert_eq!(live.color(), Some(Color::Blue));
        for (key, value) in &app.labels {
            assert_eq!(&live.selector[key], value);
        }
    }

    #[tokio::test]
    async fn test_rollback_requires_ready_previous() {
        let app = app();
        let cluster = MockCluster::new().with_service(NS, live_service(&app, Some(Color::Green)));

        let err = BlueGreen::new(&cluster, NS)
            .rollback_with(&app, Duration::from_millis(20), Duration::from_millis(5))
            .await
            .unwrap_err();
        assert!(err.is_timeout());
        assert_eq!(
            cluster.service(NS, "web-http").await.unwrap().color(),
            Some(Color::Green)
        );
    }

    #[tokio::test]
    async fn test_rollback_without_services() {
        let app = app();
        let cluster = MockCluster::new().with_rollout(NS, "web-blue", [RolloutStatus::ready(1)]);

        let err = BlueGreen::new(&cluster, NS)
            .rollback_with(&app, Duration::from_millis(20), Duration::from_millis(5))
            .await
            .unwrap_err();
        assert!(err.to_string().starts_with("no services found"));
    }

    #[tokio::test]
    async fn test_prune_deletes_non_live_color() {
        let app = app();
        let cluster = MockCluster::new()
            .with_service(NS, live_service(&app, Some(Color::Blue)))
            .with_rollout(NS, "web-green", [RolloutStatus::ready(1)]);

        let pruned = BlueGreen::new(&cluster, NS).prune(&app).await.unwrap();
        assert_eq!(pruned, "web-green");
        assert!(!cluster.has_deployment(NS, "web-green").await);
    }
}

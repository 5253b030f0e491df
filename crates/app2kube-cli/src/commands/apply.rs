//! Apply command - send the manifests to the cluster

use app2kube_engine::{Manifest, OutputKind};
use app2kube_kube::{
    ApplyOptions, BlueGreen, Cluster, DEFAULT_POLL_INTERVAL, DeployOptions, Stage,
    timeout_from_minutes,
};
use console::style;

use crate::commands::track;
use crate::display::{self, colorize};
use crate::error::{CliError, Result};
use crate::{AppArgs, KubeArgs, TrackArgs, TrackMode, app};

/// Apply flags
#[derive(Debug, Clone, Copy, Default)]
pub struct ApplyArgs {
    pub dry_run: bool,
    pub prune: bool,
    pub blue_green: bool,
    pub track: Option<TrackMode>,
}

impl ApplyArgs {
    pub fn validate(&self) -> Result<()> {
        if self.prune && self.blue_green {
            return Err(CliError::config_with_help(
                "--prune cannot be used with --blue-green",
                "a blue-green deploy keeps the previous color; remove it with `app2kube blue-green prune`",
            ));
        }
        Ok(())
    }
}

pub async fn run(args: &AppArgs, options: &ApplyArgs, tracking: &TrackArgs, kube: &KubeArgs) -> Result<()> {
    options.validate()?;

    let mut context = args.context()?;
    context.blue_green = options.blue_green;
    let mut application = app::load(&context).await?;
    let cluster = app::connect(kube).await?;

    execute(&cluster, &mut application, context.include_namespace, options, tracking).await
}

/// Apply against any cluster; the color picked by a blue-green deploy is
/// left on `application`
pub async fn execute(
    cluster: &dyn Cluster,
    application: &mut app2kube_core::Application,
    include_namespace: bool,
    options: &ApplyArgs,
    tracking: &TrackArgs,
) -> Result<()> {
    let namespace = application.namespace.clone();

    if options.blue_green {
        let deploy = DeployOptions {
            dry_run: options.dry_run,
            include_namespace,
            timeout: timeout_from_minutes(tracking.timeout),
            poll_interval: DEFAULT_POLL_INTERVAL,
            prune_previous: false,
        };

        let release = application.release_name();
        let report = BlueGreen::new(cluster, namespace.as_str())
            .deploy(application, &deploy, |stage, color| match stage {
                Stage::PreDeploy => {
                    println!("{}", colorize(color, format!("• Pre-deploy for [{color}]:")));
                }
                Stage::Waiting => display::step(format!(
                    "Waiting for Deployment {}",
                    colorize(color, format!("{release}-{color}"))
                )),
                Stage::Finalize => {
                    println!("{}", colorize(color, format!("• Final deploy for [{color}]:")));
                }
            })
            .await?;

        display::print_summary("applied", &report.pre_deploy);
        if let Some(status) = &report.rollout {
            display::rollout_ready(&application.deployment_name(), status);
        }
        display::print_summary("applied", &report.finalize);
        display::success(format!(
            "Traffic now served by {}",
            colorize(report.color, report.color)
        ));
    } else {
        let mut kinds = vec![OutputKind::All];
        if include_namespace {
            kinds.insert(0, OutputKind::Namespace);
        }
        let manifest = Manifest::build(application, &kinds)?;

        let apply = ApplyOptions {
            dry_run: options.dry_run,
            prune_selector: options.prune.then(|| application.selector()),
        };
        display::step(format!(
            "Applying {} to namespace {}",
            style(application.release_name()).cyan(),
            style(&namespace).yellow()
        ));
        let summary = cluster.apply(&namespace, &manifest, &apply).await?;
        display::print_summary("applied", &summary);
        let summary = summary.into_result("apply")?;
        if options.dry_run {
            display::success(format!("Dry run: {}", summary.summary()));
        } else {
            display::success(summary.summary());
        }
    }

    match options.track {
        Some(mode) if !options.dry_run => track::execute(cluster, application, mode, tracking).await,
        _ => Ok(()),
    }
}


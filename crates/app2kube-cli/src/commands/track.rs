//! Track command - wait for the Deployment or follow its logs

use std::str::FromStr;

use app2kube_core::{Application, Color};
use app2kube_kube::{BlueGreen, Cluster, LogsSince, RolloutTracker, timeout_from_minutes};
use console::style;

use crate::display;
use crate::error::Result;
use crate::{AppArgs, KubeArgs, TrackArgs, TrackMode, app};

pub async fn run(
    args: &AppArgs,
    mode: TrackMode,
    tracking: &TrackArgs,
    blue_green: bool,
    kube: &KubeArgs,
) -> Result<()> {
    // Reject a bad --logs-since before touching the cluster.
    LogsSince::from_str(&tracking.logs_since)?;

    let mut context = args.context()?;
    context.blue_green = blue_green;
    let mut application = app::load(&context).await?;
    let cluster = app::connect(kube).await?;

    if context.blue_green {
        let live = BlueGreen::new(&cluster, application.namespace.as_str())
            .current_color(&application)
            .await
            .unwrap_or(Color::Blue);
        application.set_blue_green_color(Some(live));
    }

    execute(&cluster, &application, mode, tracking).await
}

pub async fn execute(
    cluster: &dyn Cluster,
    application: &Application,
    mode: TrackMode,
    tracking: &TrackArgs,
) -> Result<()> {
    let tracker = RolloutTracker::new(cluster, application.namespace.as_str())
        .with_timeout(timeout_from_minutes(tracking.timeout));
    let deployment = application.deployment_name();

    match mode {
        TrackMode::Ready => {
            display::step(format!(
                "Tracking Deployment {} until ready",
                style(&deployment).cyan()
            ));
            let status = tracker.wait_ready(&deployment).await?;
            display::rollout_ready(&deployment, &status);
        }
        TrackMode::Follow => {
            let since = LogsSince::from_str(&tracking.logs_since)?;
            display::step(format!(
                "Following logs of Deployment {} since {}",
                style(&deployment).cyan(),
                style(since).yellow()
            ));
            tracker
                .follow(&pod_selector(application), since, display::log_line)
                .await?;
        }
    }
    Ok(())
}

/// Pod selector for the tracked Deployment; the color narrows it to one side
fn pod_selector(application: &Application) -> String {
    application
        .color_labels()
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(",")
}

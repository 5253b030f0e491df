//! Delete command - remove the application's resources from the cluster

use app2kube_core::Application;
use app2kube_engine::{Manifest, OutputKind};
use app2kube_kube::Cluster;
use console::style;

use crate::display;
use crate::error::Result;
use crate::{AppArgs, KubeArgs, app};

pub async fn run(args: &AppArgs, ignore_not_found: bool, kube: &KubeArgs) -> Result<()> {
    let application = app::load_from_args(args).await?;
    let cluster = app::connect(kube).await?;
    execute(&cluster, &application, args.include_namespace, ignore_not_found).await
}

pub async fn execute(
    cluster: &dyn Cluster,
    application: &Application,
    include_namespace: bool,
    ignore_not_found: bool,
) -> Result<()> {
    let mut kinds = vec![OutputKind::All];
    if include_namespace {
        kinds.insert(0, OutputKind::Namespace);
    }
    let manifest = Manifest::build(application, &kinds)?;

    display::step(format!(
        "Deleting {} from namespace {}",
        style(application.release_name()).cyan(),
        style(&application.namespace).yellow()
    ));
    let summary = cluster
        .delete(&application.namespace, &manifest, ignore_not_found)
        .await?;
    display::print_summary("deleted", &summary);

    let summary = summary.into_result("delete")?;
    display::success(summary.summary());
    Ok(())
}

//! Blue-green commands - live color, rollback and prune

use app2kube_kube::BlueGreen;
use console::style;

use crate::display::{colorize, success};
use crate::error::Result;
use crate::{AppArgs, KubeArgs, app};

/// Print the color the Services currently select
pub async fn color(args: &AppArgs, kube: &KubeArgs) -> Result<()> {
    let application = app::load_from_args(args).await?;
    let cluster = app::connect(kube).await?;

    let color = BlueGreen::new(&cluster, application.namespace.as_str())
        .live_color(&application)
        .await?;
    println!("{}", colorize(color, color));
    Ok(())
}

/// Switch the Services back to the color that is not live
pub async fn rollback(args: &AppArgs, kube: &KubeArgs) -> Result<()> {
    let application = app::load_from_args(args).await?;
    let cluster = app::connect(kube).await?;
    let blue_green = BlueGreen::new(&cluster, application.namespace.as_str());

    let target = blue_green.target_color(&application).await;
    println!(
        "Check Deployment {} with previous color:",
        colorize(target, format!("{}-{target}", application.release_name()))
    );

    let report = blue_green.rollback(&application).await?;
    for service in &report.services {
        println!(
            "Patch service {} in [{}] color",
            style(service).cyan(),
            colorize(report.color, report.color)
        );
    }
    success(colorize(report.color, "Rollback is successful"));
    Ok(())
}

/// Delete the Deployment of the color that is not live
pub async fn prune(args: &AppArgs, kube: &KubeArgs) -> Result<()> {
    let application = app::load_from_args(args).await?;
    let cluster = app::connect(kube).await?;

    let blue_green = BlueGreen::new(&cluster, application.namespace.as_str());

    let color = blue_green.target_color(&application).await;
    let deployment = blue_green.prune(&application).await?;
    println!("Deployment {} pruned", colorize(color, &deployment));
    Ok(())
}

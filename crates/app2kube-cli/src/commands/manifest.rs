//! Manifest command - print the Kubernetes manifests

use std::str::FromStr;

use app2kube_engine::{Manifest, OutputFormat, OutputKind};

use crate::app;
use crate::error::Result;
use crate::{AppArgs, KubeArgs};

/// Requested kinds, with the Namespace first when asked for
pub fn output_kinds(kinds: &[String], include_namespace: bool) -> Result<Vec<OutputKind>> {
    let mut parsed = Vec::with_capacity(kinds.len() + 1);
    if include_namespace {
        parsed.push(OutputKind::Namespace);
    }
    for kind in kinds {
        parsed.push(OutputKind::from_str(kind)?);
    }
    Ok(parsed)
}

pub async fn run(
    args: &AppArgs,
    kinds: &[String],
    output: &str,
    blue_green: bool,
    kube: &KubeArgs,
) -> Result<()> {
    let format = OutputFormat::from_str(output)?;
    let kinds = output_kinds(kinds, args.include_namespace)?;

    let mut context = args.context()?;
    context.blue_green = blue_green;
    let mut application = app::load(&context).await?;
    if context.blue_green {
        app::set_target_color(&mut application, kube).await;
    }

    let manifest = Manifest::build(&application, &kinds)?;
    print!("{}", manifest.render(format)?);
    Ok(())
}

//! Loading the application for a command

use app2kube_core::{Application, Color, InvocationContext, SecretKeys, ValueSources};
use app2kube_engine::{ValuesLoader, write_snapshot};
use app2kube_kube::{BlueGreen, KubeCluster};
use console::style;

use crate::error::Result;
use crate::{AppArgs, KubeArgs};

/// `--set-string` added by the config commands so no name is needed
pub const PLACEHOLDER_NAME: &str = "name=app";

impl AppArgs {
    /// Flags to the per-invocation context; the default values file is
    /// picked up from the working directory
    pub fn context(&self) -> Result<InvocationContext> {
        let mut sources = ValueSources::new();
        for spec in &self.values {
            sources.add_files(spec);
        }
        sources.set = self.set.clone();
        sources.set_string = self.set_string.clone();
        sources.set_file = self.set_file.clone();

        let cwd = std::env::current_dir()?;
        let sources = sources.with_default_file(&cwd);

        let mut context = InvocationContext::new(sources).with_namespace(self.namespace.clone());
        context.include_namespace = self.include_namespace;
        context.snapshot = self.snapshot.clone();
        context.verbose = self.verbose;
        context.keys = SecretKeys {
            aes_password: self.password.clone(),
            rsa_public_key: self.encrypt_key.clone(),
            rsa_private_key: self.decrypt_key.clone(),
        };
        Ok(context)
    }
}

/// Load, merge and normalize the application described by `context`
pub async fn load(context: &InvocationContext) -> Result<Application> {
    let loader = ValuesLoader::new()?;
    let values = loader.load(&context.sources).await?;

    if context.verbose {
        eprintln!("---\n# merged values\n{}", values.to_yaml()?);
    }

    if let Some(path) = &context.snapshot {
        write_snapshot(&values, path)?;
        eprintln!("Snapshot of values saved in {}", path.display());
    }

    let mut app = Application::from_values(&values, context.keys.clone())?;
    app.resolve_namespace(context.namespace.as_deref());
    Ok(app)
}

/// Load the application from command flags
pub async fn load_from_args(args: &AppArgs) -> Result<Application> {
    load(&args.context()?).await
}

/// Load the application for a `config` subcommand
pub async fn load_for_config(args: &AppArgs) -> Result<Application> {
    let mut context = args.context()?;
    context
        .sources
        .set_string
        .push(PLACEHOLDER_NAME.to_string());
    load(&context).await
}

/// Connect to the cluster selected by `--context`
pub async fn connect(kube: &KubeArgs) -> Result<KubeCluster> {
    Ok(KubeCluster::connect(kube.context.as_deref()).await?)
}

/// Name the Deployment after the color the next deploy goes to
///
/// Without a reachable cluster the first color is used.
pub async fn set_target_color(app: &mut Application, kube: &KubeArgs) {
    let color = match connect(kube).await {
        Ok(cluster) => BlueGreen::new(&cluster, app.namespace.as_str())
            .target_color(app)
            .await,
        Err(e) => {
            eprintln!(
                "{} cannot reach the cluster ({e}), using {}",
                style("⚠").yellow(),
                Color::Blue
            );
            Color::target_after(None)
        }
    };
    app.set_blue_green_color(Some(color));
}


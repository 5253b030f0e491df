//! app2kube CLI - build and deploy Kubernetes manifests from application values

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

mod app;
mod commands;
mod display;
mod error;
mod exit_codes;

use error::CliError;

#[derive(Parser)]
#[command(name = "app2kube")]
#[command(version)]
#[command(about = "Build and deploy Kubernetes manifests for an application", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug output
    #[arg(long, global = true)]
    debug: bool,
}

/// Flags shared by every command that loads the application values
#[derive(Args, Debug, Clone, Default)]
pub struct AppArgs {
    /// Values file or URL (repeatable, comma separated; `-` reads stdin, a trailing `?` makes it optional)
    #[arg(short = 'f', long = "values", value_name = "FILE|URL")]
    pub values: Vec<String>,

    /// Set values on the command line (key1=val1,key2=val2)
    #[arg(long = "set", value_name = "KEY=VAL")]
    pub set: Vec<String>,

    /// Set STRING values on the command line (key1=val1,key2=val2)
    #[arg(long = "set-string", value_name = "KEY=VAL")]
    pub set_string: Vec<String>,

    /// Set values from files (key1=path1,key2=path2)
    #[arg(long = "set-file", value_name = "KEY=PATH")]
    pub set_file: Vec<String>,

    /// Target namespace (overrides the values)
    #[arg(short, long)]
    pub namespace: Option<String>,

    /// Include the Namespace manifest
    #[arg(long)]
    pub include_namespace: bool,

    /// Save the merged values in this file for reuse
    #[arg(long, value_name = "PATH")]
    pub snapshot: Option<PathBuf>,

    /// Show the merged values as well
    #[arg(short, long)]
    pub verbose: bool,

    /// Password for AES encrypted secrets
    #[arg(long, env = "APP2KUBE_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// RSA public key (base64 PKIX DER) used for encryption
    #[arg(long, env = "APP2KUBE_ENCRYPT_KEY", hide_env_values = true)]
    pub encrypt_key: Option<String>,

    /// RSA private key (base64 PKCS#1 DER) used for decryption
    #[arg(long, env = "APP2KUBE_DECRYPT_KEY", hide_env_values = true)]
    pub decrypt_key: Option<String>,
}

/// Connection flags for commands that talk to the cluster
#[derive(Args, Debug, Clone, Default)]
pub struct KubeArgs {
    /// Kubeconfig context to use
    #[arg(long, env = "KUBECONTEXT")]
    pub context: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum TrackMode {
    /// Wait until the Deployment is ready
    Ready,
    /// Stream the Deployment's logs
    Follow,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the Kubernetes manifests
    Manifest {
        #[command(flatten)]
        app: AppArgs,

        /// Types of output resources (repeatable)
        #[arg(long = "type", value_name = "KIND", default_value = "all")]
        kinds: Vec<String>,

        /// Output format (yaml or json)
        #[arg(short, long, default_value = "yaml")]
        output: String,

        /// Name the Deployment after the next blue-green color
        #[arg(long)]
        blue_green: bool,

        #[command(flatten)]
        kube: KubeArgs,
    },

    /// Apply the manifests to the cluster
    Apply {
        #[command(flatten)]
        app: AppArgs,

        /// Send the objects with server-side dry run
        #[arg(long)]
        dry_run: bool,

        /// Delete labelled objects that are no longer in the manifests
        #[arg(long)]
        prune: bool,

        /// Enable blue-green deployment
        #[arg(long)]
        blue_green: bool,

        /// Track the Deployment after applying
        #[arg(long, value_enum)]
        track: Option<TrackMode>,

        #[command(flatten)]
        tracking: TrackArgs,

        #[command(flatten)]
        kube: KubeArgs,
    },

    /// Delete the application's resources from the cluster
    Delete {
        #[command(flatten)]
        app: AppArgs,

        /// Treat "resource not found" as a successful delete
        #[arg(long)]
        ignore_not_found: bool,

        #[command(flatten)]
        kube: KubeArgs,
    },

    /// Track the application's Deployment
    Track {
        #[arg(value_enum)]
        mode: TrackMode,

        #[command(flatten)]
        app: AppArgs,

        #[command(flatten)]
        tracking: TrackArgs,

        /// Track the live blue-green color
        #[arg(long)]
        blue_green: bool,

        #[command(flatten)]
        kube: KubeArgs,
    },

    /// Blue-green deployment commands
    #[command(name = "blue-green")]
    BlueGreen {
        #[command(subcommand)]
        command: BlueGreenCommands,
    },

    /// Manage the application config
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

/// Deadline and log start for tracking
#[derive(Args, Debug, Clone)]
pub struct TrackArgs {
    /// Timeout in minutes; 0 waits forever
    #[arg(short = 't', long = "timeout", default_value_t = app2kube_kube::DEFAULT_TIMEOUT_MINUTES)]
    pub timeout: u64,

    /// Start logs from this far back (30s, 5m, 2h), `all` or `now`
    #[arg(short = 'l', long = "logs-since", default_value = "now")]
    pub logs_since: String,
}

#[derive(Subcommand)]
enum BlueGreenCommands {
    /// Print the live color
    Color {
        #[command(flatten)]
        app: AppArgs,
        #[command(flatten)]
        kube: KubeArgs,
    },

    /// Point the Services back at the previous color
    Rollback {
        #[command(flatten)]
        app: AppArgs,
        #[command(flatten)]
        kube: KubeArgs,
    },

    /// Delete the Deployment of the previous color
    Prune {
        #[command(flatten)]
        app: AppArgs,
        #[command(flatten)]
        kube: KubeArgs,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Print the config as .env
    Dotenv {
        #[command(flatten)]
        app: AppArgs,

        /// Print export statements
        #[arg(short, long)]
        export: bool,

        /// Print quotes around values
        #[arg(short, long)]
        quotes: bool,
    },

    /// Print the list of domains from ingress
    Domain {
        #[command(flatten)]
        app: AppArgs,
    },

    /// Print decrypted secrets
    Secrets {
        #[command(flatten)]
        app: AppArgs,
    },

    /// Encrypt secret values
    ///
    /// Values in the `secrets:` section of each file are encrypted in place.
    /// RSA (APP2KUBE_ENCRYPT_KEY) has priority over AES (APP2KUBE_PASSWORD).
    Encrypt {
        /// Encrypt the specified string
        #[arg(long)]
        string: Option<String>,

        /// Encrypt secrets in a file (repeatable)
        #[arg(short = 'f', long = "values", value_name = "FILE")]
        files: Vec<PathBuf>,

        /// Password for AES encryption
        #[arg(long, env = "APP2KUBE_PASSWORD", hide_env_values = true)]
        password: Option<String>,

        /// RSA public key (base64 PKIX DER)
        #[arg(long, env = "APP2KUBE_ENCRYPT_KEY", hide_env_values = true)]
        encrypt_key: Option<String>,
    },

    /// Generate RSA-2048 encrypt and decrypt keys
    GenerateKeys,
}

#[tokio::main]
async fn main() -> ExitCode {
    miette::set_panic_hook();

    let cli = Cli::parse();
    init_tracing(cli.debug);

    match run(cli.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let code = err.exit_code();
            eprintln!("{:?}", miette::Report::new(err));
            ExitCode::from(u8::try_from(code).unwrap_or(1))
        }
    }
}

fn init_tracing(debug: bool) {
    let filter = if debug {
        EnvFilter::new("warn,app2kube=debug,app2kube_core=debug,app2kube_engine=debug,app2kube_kube=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(debug)
        .init();
}

async fn run(command: Commands) -> Result<(), CliError> {
    match command {
        Commands::Manifest {
            app,
            kinds,
            output,
            blue_green,
            kube,
        } => commands::manifest::run(&app, &kinds, &output, blue_green, &kube).await,

        Commands::Apply {
            app,
            dry_run,
            prune,
            blue_green,
            track,
            tracking,
            kube,
        } => {
            let options = commands::apply::ApplyArgs {
                dry_run,
                prune,
                blue_green,
                track,
            };
            commands::apply::run(&app, &options, &tracking, &kube).await
        }

        Commands::Delete {
            app,
            ignore_not_found,
            kube,
        } => commands::delete::run(&app, ignore_not_found, &kube).await,

        Commands::Track {
            mode,
            app,
            tracking,
            blue_green,
            kube,
        } => commands::track::run(&app, mode, &tracking, blue_green, &kube).await,

        Commands::BlueGreen { command } => match command {
            BlueGreenCommands::Color { app, kube } => commands::blue_green::color(&app, &kube).await,
            BlueGreenCommands::Rollback { app, kube } => {
                commands::blue_green::rollback(&app, &kube).await
            }
            BlueGreenCommands::Prune { app, kube } => commands::blue_green::prune(&app, &kube).await,
        },

        Commands::Config { command } => match command {
            ConfigCommands::Dotenv { app, export, quotes } => {
                commands::config::dotenv(&app, export, quotes).await
            }
            ConfigCommands::Domain { app } => commands::config::domain(&app).await,
            ConfigCommands::Secrets { app } => commands::config::secrets(&app).await,
            ConfigCommands::Encrypt {
                string,
                files,
                password,
                encrypt_key,
            } => commands::config::encrypt(string.as_deref(), &files, password, encrypt_key),
            ConfigCommands::GenerateKeys => commands::config::generate_keys(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_manifest_flags() {
        let cli = Cli::try_parse_from([
            "app2kube",
            "manifest",
            "-f",
            "a.yml,b.yml",
            "--set",
            "name=web",
            "--type",
            "deployment",
            "--type",
            "service",
            "-o",
            "json",
        ])
        .unwrap();

        let Commands::Manifest {
            app, kinds, output, ..
        } = cli.command
        else {
            panic!("expected manifest");
        };
        assert_eq!(app.values, vec!["a.yml,b.yml"]);
        assert_eq!(app.set, vec!["name=web"]);
        assert_eq!(kinds, vec!["deployment", "service"]);
        assert_eq!(output, "json");
    }

    #[test]
    fn test_parse_track_defaults() {
        let cli = Cli::try_parse_from(["app2kube", "track", "ready", "--set", "name=web"]).unwrap();
        let Commands::Track { mode, tracking, .. } = cli.command else {
            panic!("expected track");
        };
        assert_eq!(mode, TrackMode::Ready);
        assert_eq!(tracking.timeout, 15);
        assert_eq!(tracking.logs_since, "now");
    }

    #[test]
    fn test_parse_apply_track() {
        let cli = Cli::try_parse_from([
            "app2kube",
            "apply",
            "--blue-green",
            "--track",
            "follow",
            "-t",
            "0",
        ])
        .unwrap();
        let Commands::Apply {
            blue_green,
            track,
            tracking,
            ..
        } = cli.command
        else {
            panic!("expected apply");
        };
        assert!(blue_green);
        assert_eq!(track, Some(TrackMode::Follow));
        assert_eq!(tracking.timeout, 0);
    }
}

//! CLI argument parsing with clap

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};

/// Nimbus - declarative cloud-component deployments
#[derive(Parser, Debug)]
#[command(name = "nimbus")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Template root: a manifest file or a directory of instances
    #[arg(short, long, global = true)]
    pub target: Option<Utf8PathBuf>,

    /// Control-plane endpoint
    #[arg(
        long,
        env = "NIMBUS_ENDPOINT",
        default_value = "https://api.nimbus.dev",
        global = true
    )]
    pub endpoint: String,

    /// Control-plane access token
    #[arg(long, env = "NIMBUS_TOKEN", default_value = "", global = true)]
    pub token: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Deploy every instance of the template, dependencies first
    Deploy(DeployArgs),

    /// Remove every instance, dependents first
    Remove(RemoveArgs),

    /// Show the current status of each instance
    Info(InfoArgs),

    /// List instances known to the control plane
    List(ListArgs),

    /// Watch sources, hot-push code, and tail logs
    Dev(DevArgs),

    /// Tail instance logs
    Logs(LogsArgs),
}

#[derive(Args, Debug)]
pub struct DeployArgs {
    /// Redeploy even when nothing changed
    #[arg(short, long)]
    pub force: bool,

    /// Function instances only: push code, skip full reconciliation
    #[arg(long)]
    pub code_only: bool,

    /// Pause between status polls, in milliseconds
    #[arg(long, default_value_t = 1_000)]
    pub poll_interval_ms: u64,

    /// Give up polling one instance after this long, in milliseconds
    #[arg(long, default_value_t = 300_000)]
    pub poll_timeout_ms: u64,

    /// Largest allowed package, in bytes
    #[arg(long, default_value_t = nimbus_package::DEFAULT_MAX_PACKAGE_SIZE)]
    pub max_package_size: u64,
}

#[derive(Args, Debug)]
pub struct RemoveArgs {
    /// Pause between status polls, in milliseconds
    #[arg(long, default_value_t = 1_000)]
    pub poll_interval_ms: u64,

    /// Give up polling one instance after this long, in milliseconds
    #[arg(long, default_value_t = 300_000)]
    pub poll_timeout_ms: u64,
}

#[derive(Args, Debug)]
pub struct InfoArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Filter by app (defaults to the resolved template's app)
    #[arg(long)]
    pub app: Option<String>,

    /// Filter by stage
    #[arg(long)]
    pub stage: Option<String>,

    /// Filter by instance name
    #[arg(long)]
    pub name: Option<String>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct DevArgs {
    /// Settle window for filesystem event bursts, in milliseconds
    #[arg(long, default_value_t = 300)]
    pub debounce_ms: u64,

    /// Pause between log queries, in milliseconds
    #[arg(long, default_value_t = 2_000)]
    pub tail_interval_ms: u64,
}

#[derive(Args, Debug)]
pub struct LogsArgs {
    /// Pause between log queries, in milliseconds
    #[arg(long, default_value_t = 2_000)]
    pub tail_interval_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deploy_defaults() {
        let cli = Cli::try_parse_from(["nimbus", "deploy"]).unwrap();
        match cli.command {
            Commands::Deploy(args) => {
                assert!(!args.force);
                assert!(!args.code_only);
                assert_eq!(args.poll_interval_ms, 1_000);
            }
            other => panic!("expected deploy, got {other:?}"),
        }
    }

    #[test]
    fn test_global_target_flag() {
        let cli = Cli::try_parse_from(["nimbus", "deploy", "--target", "./stacks"]).unwrap();
        assert_eq!(cli.target.as_deref().map(|p| p.as_str()), Some("./stacks"));
    }

    #[test]
    fn test_list_filters() {
        let cli =
            Cli::try_parse_from(["nimbus", "list", "--app", "demo", "--stage", "dev"]).unwrap();
        match cli.command {
            Commands::List(args) => {
                assert_eq!(args.app.as_deref(), Some("demo"));
                assert_eq!(args.stage.as_deref(), Some("dev"));
                assert!(args.name.is_none());
            }
            other => panic!("expected list, got {other:?}"),
        }
    }
}

//! ngfw-deploy
//!
//! Operator CLI that provisions Stonesoft NGFW engines on Azure, tears them
//! down again, and lists what is deployed.
//!
//! # Usage
//!
//! ```bash
//! ngfw-deploy create --engine-username alice --resource-group rg1 --template-path engine.json
//! ngfw-deploy create --engine-username alice --resource-group rg1 \
//!     --template-link https://example.com/azuredeploy.json --policy "Standard Firewall Policy"
//! ngfw-deploy destroy --resource-group rg1
//! ngfw-deploy list --by-tag
//! ngfw-deploy list --group rg1 --format json
//! ```

use clap::{CommandFactory, Parser, Subcommand};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

mod commands;
mod config;
mod output;

use commands::{CreateArgs, DestroyArgs, ListArgs};

#[derive(Parser, Debug)]
#[command(name = "ngfw-deploy")]
#[command(author = "OpenSASE")]
#[command(version)]
#[command(about = "Stonesoft NGFW deployer for Azure", long_about = None)]
struct Cli {
    /// Silence all log output
    #[arg(long, global = true)]
    quiet_logging: bool,

    /// Profile name from ~/.opensase/ngfw.<profile>.toml
    #[arg(long, short, global = true)]
    profile: Option<String>,

    /// Output format
    #[arg(long, short, global = true, value_enum, default_value = "table")]
    format: output::OutputFormat,

    /// Overall deployment timeout in seconds
    #[arg(long, global = true)]
    deployment_timeout: Option<u64>,

    /// Seconds between deployment status checks
    #[arg(long, global = true)]
    poll_interval: Option<u64>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create an SMC engine and deploy it to a new resource group
    Create(CreateArgs),
    /// Delete a resource group and its engine
    Destroy(DestroyArgs),
    /// List resource groups, resources or locations
    List(ListArgs),
}

fn init_logging(quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("off")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let Some(command) = cli.command else {
        return match Cli::command().print_help() {
            Ok(()) => ExitCode::SUCCESS,
            Err(_) => ExitCode::FAILURE,
        };
    };

    init_logging(cli.quiet_logging);

    let settings = match config::Config::load(cli.profile.as_deref()) {
        Ok(settings) => settings.with_overrides(cli.deployment_timeout, cli.poll_interval),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            return ExitCode::FAILURE;
        }
    };

    let result = match command {
        Commands::Create(args) => commands::create::handle(args, &settings, cli.format).await,
        Commands::Destroy(args) => commands::destroy::handle(args, &settings, cli.format).await,
        Commands::List(args) => commands::list::handle(args, &settings, cli.format).await,
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_no_arguments_is_not_an_error() {
        let cli = Cli::try_parse_from(["ngfw-deploy"]).unwrap();
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_create_requires_one_template_source() {
        let base = ["ngfw-deploy", "create", "--engine-username", "alice", "--resource-group", "rg1"];
        assert!(Cli::try_parse_from(base).is_err());

        let both = [
            &base[..],
            &["--template-path", "engine.json", "--template-link", "https://example.com/t.json"],
        ]
        .concat();
        assert!(Cli::try_parse_from(both).is_err());

        let path = [&base[..], &["--template-path", "engine.json"]].concat();
        let cli = Cli::try_parse_from(path).unwrap();
        match cli.command {
            Some(Commands::Create(args)) => {
                assert_eq!(args.location, "westus");
                assert_eq!(args.deployment_name, "ngfw_azure_deployment");
                assert_eq!(args.tag_value, "smc-python");
                assert_eq!(args.policy, "_Azure_Default");
                assert!(!args.no_policy);
                assert!(!args.force_remove);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_policy_can_be_skipped() {
        let cli = Cli::try_parse_from([
            "ngfw-deploy",
            "create",
            "--engine-username",
            "alice",
            "--resource-group",
            "rg1",
            "--template-path",
            "engine.json",
            "--no-policy",
        ])
        .unwrap();
        match cli.command {
            Some(Commands::Create(args)) => assert!(args.no_policy),
            other => panic!("unexpected command: {other:?}"),
        }

        let both = Cli::try_parse_from([
            "ngfw-deploy",
            "create",
            "--engine-username",
            "alice",
            "--resource-group",
            "rg1",
            "--template-path",
            "engine.json",
            "--policy",
            "Standard Firewall Policy",
            "--no-policy",
        ]);
        assert!(both.is_err());
    }

    #[test]
    fn test_list_modes_are_exclusive() {
        assert!(Cli::try_parse_from(["ngfw-deploy", "list"]).is_err());
        assert!(Cli::try_parse_from(["ngfw-deploy", "list", "--all", "--locations"]).is_err());

        let cli = Cli::try_parse_from(["ngfw-deploy", "list", "--by-tag"]).unwrap();
        match cli.command {
            Some(Commands::List(args)) => assert_eq!(args.by_tag.as_deref(), Some("stonesoft")),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "ngfw-deploy",
            "destroy",
            "--resource-group",
            "rg1",
            "--quiet-logging",
            "--format",
            "json",
        ])
        .unwrap();
        assert!(cli.quiet_logging);
        assert!(matches!(cli.format, output::OutputFormat::Json));
    }
}

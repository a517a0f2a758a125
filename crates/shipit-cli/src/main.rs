//! shipit CLI tool.

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "shipit")]
#[command(about = "Publish a project to a git host and build it remotely", long_about = None)]
struct Cli {
    /// Log at debug level (RUST_LOG still wins when set)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Commit, tag and push the project, then run the remote build
    Publish(commands::publish::PublishArgs),
    /// Manage the stored git hosting state
    Git {
        #[command(subcommand)]
        command: GitCommands,
    },
}

#[derive(Subcommand)]
enum GitCommands {
    /// Show the stored provider, owner and login
    Show,
    /// Remove the stored provider, token, owner and login
    Clear,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .init();

    match cli.command {
        Commands::Publish(args) => {
            commands::publish::run(args).await?;
        }
        Commands::Git { command } => match command {
            GitCommands::Show => {
                commands::git::show()?;
            }
            GitCommands::Clear => {
                commands::git::clear()?;
            }
        },
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_publish_flags() {
        let cli = Cli::try_parse_from([
            "shipit",
            "publish",
            "--server",
            "gitee",
            "--owner",
            "org",
            "--login",
            "acme",
            "--refresh-owner",
            "--build-cmd",
            "cnpm run build",
        ])
        .unwrap();

        let Commands::Publish(args) = cli.command else {
            panic!("expected publish");
        };
        assert_eq!(args.login.as_deref(), Some("acme"));
        assert!(args.refresh_owner);
        assert_eq!(args.build_cmd.as_deref(), Some("cnpm run build"));
    }

    #[test]
    fn test_unknown_server_is_rejected() {
        assert!(Cli::try_parse_from(["shipit", "publish", "--server", "gitlab"]).is_err());
    }
}

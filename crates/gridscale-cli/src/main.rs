use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "gridscale",
    about = "GridScale — autoscaler policy and state sync",
    version,
    propagate_version = true,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Work with scaling policy documents
    Policy {
        #[command(subcommand)]
        action: PolicyAction,
    },
    /// Work with gridscale.toml
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum PolicyAction {
    /// Normalize a raw scaling policy and print the result.
    ///
    /// The file holds the orchestrator's JSON form of one policy:
    /// id, job_id, target path and the raw policy document.
    Check {
        /// Path to the raw policy JSON
        #[arg(short, long)]
        file: String,
        /// gridscale.toml supplying canonical target and source names
        #[arg(short, long)]
        config: Option<String>,
        /// Output format: text or json
        #[arg(long, default_value = "json")]
        format: String,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Validate a configuration file and print the effective settings
    Check {
        #[arg(short, long, default_value = "gridscale.toml")]
        file: String,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("gridscale=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Policy { action } => match action {
            PolicyAction::Check {
                file,
                config,
                format,
            } => commands::policy::check(&file, config.as_deref(), &format),
        },
        Commands::Config { action } => match action {
            ConfigAction::Check { file } => commands::config::check(&file),
        },
    }
}

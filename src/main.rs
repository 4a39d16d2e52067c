//! depflow - dependency flow orchestration
//!
//! CLI binary driving dependency update pull requests from a catalog of
//! subscriptions and builds.

use anyhow::Result;
use clap::{Parser, Subcommand};
use depflow::config::{Catalog, Settings};
use depflow::types::Platform;
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

mod cli;

#[derive(Parser)]
#[command(name = "depflow")]
#[command(about = "Dependency flow pull requests - GitHub & GitLab")]
#[command(version)]
struct Cli {
    /// Settings file (defaults to <config dir>/depflow/config.yaml)
    #[arg(short, long, global = true, env = "DEPFLOW_CONFIG")]
    config: Option<PathBuf>,

    /// Subscription catalog
    #[arg(long, global = true, env = "DEPFLOW_CATALOG", default_value = "catalog.yaml")]
    catalog: PathBuf,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check a catalog's subscriptions for conflicts
    Validate {
        /// Catalog to check (defaults to --catalog)
        path: Option<PathBuf>,
    },

    /// Apply a build to one subscription, or to every subscription following it
    Trigger {
        /// Subscription to trigger regardless of its update frequency
        #[arg(long)]
        subscription: Option<Uuid>,

        /// Build to apply (newest build on the subscription's channel when omitted)
        #[arg(long)]
        build: Option<u64>,
    },

    /// Report the synchronized branch of a code flow subscription
    CodeFlowStatus {
        /// Code flow subscription
        #[arg(long)]
        subscription: Uuid,

        /// Last synchronized commit
        #[arg(long)]
        sha: String,

        /// Branch holding the flowed changes
        #[arg(long)]
        branch: String,
    },

    /// Fire due reminders until interrupted
    Run {
        /// Fire due reminders once and exit
        #[arg(long)]
        once: bool,
    },

    /// Show persisted actor state
    Status,

    /// Authentication management
    Auth {
        #[command(subcommand)]
        platform: AuthPlatform,
    },
}

#[derive(Subcommand)]
enum AuthPlatform {
    /// GitHub authentication
    Github {
        #[command(subcommand)]
        action: AuthAction,
    },
    /// GitLab authentication
    Gitlab {
        #[command(subcommand)]
        action: AuthAction,
    },
}

#[derive(Subcommand)]
enum AuthAction {
    /// Test authentication
    Test,
    /// Show authentication setup instructions
    Setup,
}

fn init_tracing(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let settings = Settings::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Validate { path } => {
            cli::run_validate(path.as_deref().unwrap_or(&cli.catalog))?;
        }
        Commands::Trigger {
            subscription,
            build,
        } => {
            let catalog = Catalog::load(&cli.catalog)?;
            cli::run_trigger(&settings, catalog, subscription, build).await?;
        }
        Commands::CodeFlowStatus {
            subscription,
            sha,
            branch,
        } => {
            let catalog = Catalog::load(&cli.catalog)?;
            cli::run_code_flow_status(&settings, catalog, subscription, sha, branch).await?;
        }
        Commands::Run { once } => {
            let catalog = Catalog::load(&cli.catalog)?;
            cli::run_loop(&settings, catalog, once).await?;
        }
        Commands::Status => cli::run_status(&settings).await?,
        Commands::Auth { platform } => {
            let (platform, action) = match platform {
                AuthPlatform::Github { action } => (Platform::GitHub, action),
                AuthPlatform::Gitlab { action } => (Platform::GitLab, action),
            };
            match action {
                AuthAction::Test => cli::run_auth_test(&settings, platform).await?,
                AuthAction::Setup => cli::run_auth_setup(platform),
            }
        }
    }

    Ok(())
}

//! chatkv - chat data store administration
//!
#![doc = "chatkv - chat data store administration"]
#![doc = "Main entry point for the chatkv CLI."]

use anyhow::Result;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use chatkv::cli::{Cli, Commands};
use chatkv::commands::{maintenance, serve, sessions, users};
use chatkv::config::Config;
use chatkv::repository::Database;
use chatkv::store;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse_args();

    init_tracing(cli.verbose, cli.json_logs);

    // Load configuration
    let config_path = cli.config.as_deref().unwrap_or("config/config.yaml");
    let config = Config::load(config_path, &cli)?;

    // Validate configuration
    config.validate()?;

    store::init_metrics_exporter();

    dispatch(&config, cli.command, cli.json).await
}

async fn dispatch(config: &Config, command: Commands, json: bool) -> Result<()> {
    match command {
        Commands::Serve { .. } => {
            tracing::info!("Starting command proxy on {}", config.proxy.bind);
            serve::run_serve(config).await
        }
        Commands::Health => {
            // Health reports an unreachable store instead of failing to connect.
            let db = Database::from_config(config)?;
            maintenance::show_health(&db, json).await
        }
        Commands::Startup => {
            maintenance::run_startup(&Database::connect(config).await?, &config.admin, json).await
        }
        Commands::Users { command } => {
            users::handle_users(&Database::connect(config).await?, &config.admin, command, json)
                .await
        }
        Commands::Sessions { command } => {
            sessions::handle_sessions(&Database::connect(config).await?, command, json).await
        }
        Commands::Stats => maintenance::show_stats(&Database::connect(config).await?, json).await,
        Commands::Cleanup => {
            maintenance::run_cleanup(&Database::connect(config).await?, json).await
        }
        Commands::Validate => {
            maintenance::run_validate(&Database::connect(config).await?, json).await
        }
        Commands::Migrate => {
            maintenance::run_migrate(&Database::connect(config).await?, json).await
        }
        Commands::Purge { pattern } => {
            maintenance::run_purge(&Database::connect(config).await?, &pattern, json).await
        }
        Commands::Reset { confirm } => {
            tracing::warn!("Reset requested");
            let db = Database::connect(config).await?;
            maintenance::run_reset(&db, &config.admin, &confirm, json).await
        }
    }
}

/// Initialize tracing/logging. Logs go to stderr so `--json` output on
/// stdout stays parseable.
fn init_tracing(verbose: bool, json_logs: bool) {
    let default_level = if verbose { "chatkv=debug" } else { "chatkv=info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let registry = tracing_subscriber::registry().with(env_filter);
    if json_logs {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use vsphere_disk_manager::cli::{self, Cli, Commands};
use vsphere_disk_manager::config::{generate_default_config, Settings};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // `init` must work before any settings file exists.
    let settings = match cli.command {
        Commands::Init { .. } => generate_default_config(),
        _ => Settings::load(&cli.config_dir()).context("loading settings")?,
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
    info!("Starting vSphere disk manager");

    cli::run(cli, settings).await
}

use anyhow::Context;
use clap::Parser;

use nanolist::cli::{self, Cli};
use nanolist::config::Config;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Install rustls crypto provider before any TLS usage
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        anyhow::bail!("Failed to install rustls crypto provider");
    }

    // Logs go to stderr; stdout carries command output.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = Config::from_env().context("loading configuration")?;
    tracing::debug!(
        command_address = %config.command_address,
        db = %config.db_path.display(),
        mode = ?config.delivery_mode,
        "Configuration loaded"
    );

    cli::run(cli, config)
}

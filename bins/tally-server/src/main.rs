mod cmd;
mod config;
mod error;
mod store;
mod transport;

use clap::Parser;

use config::{Cli, Commands, ServerConfig};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Some(path) = &cli.config {
        tracing::info!(config = %path.display(), "loading configuration");
    }
    let config = match ServerConfig::load(cli.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(error = %e, "failed to load config");
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Ingest(args) => cmd::ingest::run(&config, args).await,
        Commands::Scan(args) => cmd::scan::run(&config, args).await,
        Commands::Get(args) => cmd::get::run(&config, args),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use rust_intake::cli::{self, Cli, Commands};
use rust_intake::config::IntakeConfig;

#[tokio::main]
async fn main() {
    let args = Cli::parse();

    let (config, created) = match IntakeConfig::load_or_default(&args.config) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("Failed to load config '{}': {}", args.config, e);
            std::process::exit(1);
        }
    };

    // RUST_LOG wins over the configured level
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.node.log_level)),
        )
        .init();

    if created {
        info!("📝 Wrote default config to {}", args.config);
    }

    let command = args.command.unwrap_or(Commands::Serve);
    if let Err(e) = cli::run(command, config).await {
        error!("❌ {}", e);
        std::process::exit(1);
    }
}

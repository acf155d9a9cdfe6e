//! Research Swarm CLI entry point.

use anyhow::Context;
use clap::Parser;

use research_swarm::cli::{commands, handle_error, Cli, Commands};
use research_swarm::infrastructure::config::ConfigLoader;
use research_swarm::infrastructure::logging::{LogConfig, LoggerImpl};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match ConfigLoader::load_or_default(cli.config.as_deref()) {
        Ok(config) => config,
        Err(err) => handle_error(err.context("Failed to load configuration"), cli.json),
    };

    let logger = LogConfig::from_settings(&config.logging)
        .map(|log_config| if cli.verbose { log_config.with_level("debug") } else { log_config })
        .and_then(|log_config| LoggerImpl::init(&log_config))
        .context("Failed to initialize logging");
    let _logger = match logger {
        Ok(logger) => logger,
        Err(err) => handle_error(err, cli.json),
    };

    let result = match cli.command {
        Commands::Detect(args) => commands::detect::execute(args, &config, cli.json).await,
        Commands::Exec(args) => commands::exec::execute(args, &config, cli.json).await,
        Commands::Layers(args) => commands::layers::execute(args, cli.json).await,
        Commands::Plan(args) => commands::plan::execute(args, cli.json).await,
        Commands::Verify(args) => commands::verify::execute(args, &config, cli.json).await,
        Commands::Run(args) => commands::run::execute(args, &config, cli.json).await,
        Commands::Config(args) => commands::config::execute(args, &config, cli.json),
    };

    if let Err(err) = result {
        handle_error(err, cli.json);
    }
}

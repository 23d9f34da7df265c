mod batch;
mod cli;
mod commands;
mod config;
mod logging;

use clap::Parser;

use crate::cli::{App, CacheCommands, Commands};
use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app = App::parse();
    let (config, source) = Config::load(app.config.as_deref())?;

    logging::init(app.log_level.as_deref().unwrap_or(&config.log_level));
    match &source {
        Some(path) => tracing::debug!(config = %path.display(), "Loaded configuration"),
        None => tracing::debug!("No configuration file found, using defaults"),
    }

    let endpoint = app.endpoint.as_deref();
    match app.cmd {
        Commands::Deliver(args) => commands::deliver::run(&config, endpoint, args).await,
        Commands::Cache(cmd) => match cmd {
            CacheCommands::List => commands::cache::list(&config),
            CacheCommands::Remove { fingerprint } => commands::cache::remove(&config, &fingerprint),
            CacheCommands::RemoveTransform { transform_id } => {
                commands::cache::remove_transform(&config, &transform_id)
            }
            CacheCommands::Clear => commands::cache::clear(&config),
        },
        Commands::Codegens { refresh } => commands::codegens::run(&config, endpoint, refresh).await,
    }
}

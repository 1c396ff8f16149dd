mod cli;
mod commands;
mod config;
mod observability;
mod output;

use anyhow::Result;
use clap::Parser;

use cli::{Cli, Commands};
use crate::config::ConfigError;
use output::print_error;

#[tokio::main]
async fn main() {
    // .env is optional
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    observability::init_tracing_with_level(cli.log_level.as_deref().unwrap_or("info"));

    if let Err(e) = run(cli).await {
        tracing::debug!(error = ?e, "command failed");
        print_error(&format!("{e:#}"));
        let code = if e.downcast_ref::<ConfigError>().is_some() {
            2
        } else {
            1
        };
        std::process::exit(code);
    }
}

async fn run(cli: Cli) -> Result<()> {
    match &cli.command {
        Commands::Hash(args) => {
            println!("{}", commands::hash::digest(args)?);
        }
        Commands::Schema(args) => {
            println!("{}", commands::schema::render(args)?);
        }
        Commands::Ingest(args) => {
            let config = crate::config::loader::load_config(&cli.config)?;
            if cli.log_level.is_none() {
                observability::apply_logging_level(&config.logging.level);
            }
            tracing::debug!(config = ?config, "configuration loaded");

            let sink = commands::ingest::lakehouse(&config);
            let summary = commands::ingest::run(&config, &sink, args.dry_run).await?;
            tracing::info!(
                fetched = summary.fetched,
                pages = summary.pages,
                rows = summary.rows,
                complete = summary.termination.is_complete(),
                written = summary.saved.is_some(),
                "ingest finished"
            );
        }
    }

    Ok(())
}

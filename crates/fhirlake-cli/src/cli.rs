use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "fhirlake")]
#[command(about = "fhirlake: pull FHIR search results into a lakehouse table")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file (TOML); FHIRLAKE__SECTION__KEY env vars override it
    #[arg(
        short,
        long,
        global = true,
        env = "FHIRLAKE_CONFIG",
        default_value = "fhirlake.toml"
    )]
    pub config: PathBuf,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(long, global = true)]
    pub log_level: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print the SHA-256 digest of a text or a JSON object
    Hash(HashArgs),
    /// Fetch every page of the configured FHIR search and write the table
    Ingest(IngestArgs),
    /// Show the bundled Patient table schema
    Schema(SchemaArgs),
}

#[derive(clap::Args)]
pub struct HashArgs {
    /// Text to hash, used verbatim
    pub text: Option<String>,
    /// JSON object to hash canonically (file path, or - for stdin)
    #[arg(long, conflicts_with = "text")]
    pub json: Option<String>,
}

#[derive(clap::Args)]
pub struct IngestArgs {
    /// Fetch and flatten, but do not write the table
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(clap::Args)]
pub struct SchemaArgs {
    /// Print the schema document instead of the tree
    #[arg(long)]
    pub json: bool,
}

use anyhow::Result;
use clap::{Parser, Subcommand};
use openalex_loader::{fetch, pipeline, store};

#[derive(Parser)]
#[command(name = "openalex-loader")]
#[command(about = "Fetch catalog DOIs, query OpenAlex, load works and authorships into SQLite")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch catalog DOIs, query OpenAlex and write the flattened JSON files
    Fetch(fetch::FetchArgs),
    /// Create the tables and load the flattened JSON files
    Load(store::LoadArgs),
    /// Fetch and load in one pass
    Run(pipeline::RunArgs),
    /// Stamp every row of a table with the current date and time
    Stamp(store::StampArgs),
    /// Drop a table and its full-text index
    Drop(store::DropArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.verbose {
        std::env::set_var("RUST_LOG", "debug");
    }

    match cli.command {
        Commands::Fetch(args) => fetch::run(args),
        Commands::Load(args) => store::run_load(args),
        Commands::Run(args) => pipeline::run(args),
        Commands::Stamp(args) => store::run_stamp(args),
        Commands::Drop(args) => store::run_drop(args),
    }
}

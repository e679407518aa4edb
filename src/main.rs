use clap::Parser;
use symbindex::cli::commands;
use symbindex::cli::{Cli, Commands};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Init { force } => commands::run_init(force),
        Commands::Import { store_path } => commands::run_import(store_path),
        Commands::Watch { store_path } => commands::run_watch(store_path),
        Commands::Query { store_path, query } => commands::run_query(store_path, query),
        Commands::Config => commands::run_config(),
    }
}

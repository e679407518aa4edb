//! Command-line surface: a thin exerciser over the facade, driving
//! `IndexSystem` directly. No RPC/MCP server here; that surface is out of
//! scope.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "symbindex")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Persistent symbol index over unit/record providers")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write a default .symbindex/settings.toml in the current directory.
    Init {
        #[arg(short, long)]
        force: bool,
    },

    /// Poll the store once and import every new or changed unit.
    Import {
        /// Directory the compiler writes unit/record files into.
        store_path: PathBuf,
    },

    /// Watch the store and user files, importing changes as they happen.
    Watch {
        store_path: PathBuf,
    },

    /// Look symbols up in an already-imported index.
    Query {
        store_path: PathBuf,
        #[command(subcommand)]
        query: QueryCommand,
    },

    /// Print the effective configuration.
    Config,
}

#[derive(Subcommand)]
pub enum QueryCommand {
    /// Occurrences of one exact USR.
    Usr { usr: String },

    /// USRs whose name matches a pattern.
    Name {
        pattern: String,
        #[arg(long)]
        subsequence: bool,
        #[arg(long)]
        ignore_case: bool,
    },

    /// Every call occurrence of a USR, including dynamic-dispatch overrides.
    Calls { usr: String },

    /// Every transitive overrider of a USR.
    Overrides { usr: String },

    /// Units whose main file is `path`.
    File { path: PathBuf },
}

pub mod commands;

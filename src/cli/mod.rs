// src/cli/mod.rs — CLI definition (clap derive)

pub mod migrate;
pub mod serve;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "jieyou", about = "Resumable streaming chat relay", version)]
pub struct Cli {
    /// Config file path
    #[arg(long, global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Clone)]
pub enum Commands {
    /// Run the HTTP server (default)
    Serve {
        /// Override the configured port
        #[arg(short, long)]
        port: Option<u16>,
        /// Override the configured database path
        #[arg(long)]
        db: Option<String>,
    },
    /// Show or manage database migrations
    Migrate {
        /// Show migration status only
        #[arg(long)]
        status: bool,
        /// Roll back the most recent migration
        #[arg(long, conflicts_with = "status")]
        rollback: bool,
        /// Override the configured database path
        #[arg(long)]
        db: Option<String>,
    },
}

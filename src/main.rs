// src/main.rs — jieyou entry point

use clap::Parser;

use jieyou::cli::{Cli, Commands};
use jieyou::infra::config::Config;
use jieyou::infra::logger;

#[tokio::main]
async fn main() {
    // Respects JIEYOU_LOG / RUST_LOG
    logger::init_logging("info");

    if let Err(e) = run().await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = if let Some(ref path) = cli.config {
        Config::load_from(std::path::Path::new(path))?
    } else {
        Config::load()?
    };

    match cli.command {
        Some(Commands::Migrate {
            status,
            rollback,
            db,
        }) => {
            let path = db
                .map(std::path::PathBuf::from)
                .unwrap_or_else(|| config.database.resolved_path());
            jieyou::cli::migrate::run_migrate(&path, status, rollback)
        }
        Some(Commands::Serve { port, db }) => jieyou::cli::serve::run_serve(config, port, db).await,
        None => jieyou::cli::serve::run_serve(config, None, None).await,
    }
}

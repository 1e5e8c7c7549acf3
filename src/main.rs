use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

use repograph::cli::{self, Cli};
use repograph::config::Config;
use repograph::logging::init_logging;

#[tokio::main]
async fn main() -> Result<()> {
    let root = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    let config = Config::load(&root).unwrap_or_default();

    // The guard must be held until exit so file logs are flushed
    let _logging_guard = init_logging(&config.logging, &root)?;

    let cli = Cli::parse();
    cli::run(cli, config, root).await
}

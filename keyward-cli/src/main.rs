//! keyward
//!
//! Manages raw volume keys in a directory key store: list, report, backup,
//! and rekey or create ZFS datasets against new keys.

mod cli;

use anyhow::Result;
use clap::Parser;
use keyward_config::AppConfig;
use keyward_logging::init_logging;
use std::process::ExitCode;
use tracing::error;

use cli::{execute, Cli};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Load configuration
    let config = AppConfig::from_env()
        .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;

    init_logging("keyward", config.log_format, config.log_level());

    match execute(cli.command, &config).await {
        Ok(code) => Ok(code),
        Err(e) => {
            error!(error = %e, "Command failed");
            eprintln!("Error: {:#}", e);
            Ok(ExitCode::FAILURE)
        }
    }
}

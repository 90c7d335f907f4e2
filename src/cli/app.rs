use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use tracing::{error, info, warn};

use healreplay::config::load_config;
use healreplay::logging::{effective_level, init_logging};

use super::commands::Commands;
use super::encrypt::cmd_encrypt;
use super::env::CliArgs;
use super::replay::cmd_replay;
use super::validate::cmd_validate;

pub async fn run() -> Result<ExitCode> {
    let cli = CliArgs::parse();

    let loaded = load_config(cli.config.as_deref()).await?;
    let level = effective_level(cli.log_level.as_deref(), cli.debug, &loaded.config.logging);
    let _log_guard = init_logging(&level, &loaded.config.logging)?;

    info!("Starting HealReplay v{}", env!("CARGO_PKG_VERSION"));
    if loaded.found {
        info!("Loaded configuration from: {}", loaded.path.display());
    } else {
        warn!(
            "Config file not found, using defaults: {}",
            loaded.path.display()
        );
    }
    let config = loaded.config;

    let outcome = match cli.command {
        Commands::Replay(args) => cmd_replay(args, &config).await,
        Commands::Validate(args) => cmd_validate(args).await,
        Commands::Encrypt(args) => cmd_encrypt(args, &config),
    };

    match outcome {
        Ok(true) => {
            info!("Command completed successfully");
            Ok(ExitCode::SUCCESS)
        }
        Ok(false) => Ok(ExitCode::FAILURE),
        Err(err) => {
            error!("Command failed: {:#}", err);
            Err(err)
        }
    }
}

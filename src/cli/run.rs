use crate::config::parse::{load_config, ConfigError};
use crate::config::types::Config;
use crate::logger::{setup_logger, Logger, LoggerError};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::signal;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum RunError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("logger error: {0}")]
    Logger(#[from] LoggerError),

    #[error("failed to read input: {0}")]
    Io(#[from] std::io::Error),
}

/// Command-line values that take precedence over the config file.
#[derive(Debug, Clone, Default)]
pub struct RunOverrides {
    pub log_group: Option<String>,
    pub log_stream: Option<String>,
}

pub async fn run(
    config_path: Option<PathBuf>,
    overrides: RunOverrides,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = match (config_path, overrides.log_group.clone()) {
        (Some(path), _) => load(&path)?,
        (None, Some(group)) => Config::new(group),
        (None, None) => {
            eprintln!("Error: config not found");
            eprintln!("Searched locations:");
            eprintln!("  ~/.config/logship/config.yml");
            eprintln!("  /etc/logship/config.yml");
            eprintln!("\nUse --config <path> or --log-group <name>, or run 'logship config init' to generate a config.");
            std::process::exit(1);
        }
    };

    ship_stdin(apply_overrides(config, overrides))
        .await
        .map_err(|e| e.into())
}

fn load(path: &Path) -> Result<Config, RunError> {
    info!(config_path = %path.display(), "Loading configuration");
    Ok(load_config(path)?)
}

pub fn apply_overrides(mut config: Config, overrides: RunOverrides) -> Config {
    if let Some(group) = overrides.log_group {
        config.log_group = Some(group);
    }
    if let Some(stream) = overrides.log_stream {
        config.log_stream = Some(stream);
    }
    config
}

async fn ship_stdin(config: Config) -> Result<(), RunError> {
    let logger = setup_logger(&config)?;
    info!(stream = %logger.active_stream_name(), "Shipping stdin");

    let input = BufReader::new(tokio::io::stdin());
    let result = tokio::select! {
        result = ship_lines(&logger, input) => result.map(Some),
        _ = signal::ctrl_c() => {
            info!("Shutdown signal received");
            Ok(None)
        }
    };

    let stats = logger.close().await;

    match result {
        Ok(Some(lines)) => info!(lines, appended = stats.events_appended, "Input closed"),
        Ok(None) => {}
        Err(e) => {
            warn!(error = %e, "Stopped reading input");
            return Err(e.into());
        }
    }
    Ok(())
}

/// Log every line of `input` at INFO. Returns the number of lines read.
pub async fn ship_lines<R>(logger: &Logger, input: R) -> std::io::Result<usize>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = input.lines();
    let mut count = 0;
    while let Some(line) = lines.next_line().await? {
        logger.info(line);
        count += 1;
    }
    Ok(count)
}

use crate::config::parse::{validate_config, ConfigError};
use crate::config::types::Config;
use crate::delivery::{DeliveryError, DeliveryManager, StatsSnapshot, StreamIdentity};
use crate::format::{Formatter, Message};
use crate::sink::{CloudWatchConnector, SinkConnector};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
    /// Always shipped, whatever the level.
    Any,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Severity::Debug => "DEBUG",
            Severity::Info => "INFO",
            Severity::Warn => "WARN",
            Severity::Error => "ERROR",
            Severity::Fatal => "FATAL",
            Severity::Any => "ANY",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Error)]
pub enum LoggerError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("delivery error: {0}")]
    Delivery(#[from] DeliveryError),
}

/// Severity-filtered front end over a [`DeliveryManager`].
pub struct Logger {
    manager: DeliveryManager,
    formatter: Formatter,
    level: Severity,
    progname: Option<String>,
}

impl Logger {
    pub fn new(manager: DeliveryManager, formatter: Formatter) -> Self {
        Self {
            manager,
            formatter,
            level: Severity::Debug,
            progname: None,
        }
    }

    pub fn with_level(mut self, level: Severity) -> Self {
        self.level = level;
        self
    }

    pub fn with_progname(mut self, progname: impl Into<String>) -> Self {
        self.progname = Some(progname.into());
        self
    }

    pub fn level(&self) -> Severity {
        self.level
    }

    pub fn log(&self, severity: Severity, message: impl Into<Message>) {
        if severity < self.level {
            return;
        }
        let line = self
            .formatter
            .format(severity, self.progname.as_deref(), &message.into());
        self.manager.deliver(line);
    }

    pub fn debug(&self, message: impl Into<Message>) {
        self.log(Severity::Debug, message);
    }

    pub fn info(&self, message: impl Into<Message>) {
        self.log(Severity::Info, message);
    }

    pub fn warn(&self, message: impl Into<Message>) {
        self.log(Severity::Warn, message);
    }

    pub fn error(&self, message: impl Into<Message>) {
        self.log(Severity::Error, message);
    }

    pub fn fatal(&self, message: impl Into<Message>) {
        self.log(Severity::Fatal, message);
    }

    pub fn unknown(&self, message: impl Into<Message>) {
        self.log(Severity::Any, message);
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.manager.stats()
    }

    pub fn active_stream_name(&self) -> String {
        self.manager.active_stream_name()
    }

    /// Flush everything logged so far and stop the delivery worker.
    /// Returns the final delivery counters.
    pub async fn close(self) -> StatsSnapshot {
        self.manager.shutdown().await
    }
}

/// Build a logger that ships to CloudWatch Logs as described by `config`.
/// Must be called from within a tokio runtime.
pub fn setup_logger(config: &Config) -> Result<Logger, LoggerError> {
    setup_logger_with_connector(config, Arc::new(CloudWatchConnector::from_config(config)))
}

pub fn setup_logger_with_connector(
    config: &Config,
    connector: Arc<dyn SinkConnector>,
) -> Result<Logger, LoggerError> {
    validate_config(config)?;
    let identity = StreamIdentity::new(
        config.log_group.clone().unwrap_or_default(),
        config.log_stream.clone(),
    )?;
    let formatter = Formatter::new(config.format.kind, identity.log_stream_name());
    info!(
        group = %identity.log_group_name(),
        stream = %identity.log_stream_name(),
        level = %config.format.level,
        "Setting up logger"
    );

    let manager = DeliveryManager::new(identity, connector, config.delivery.clone())?;
    let logger = Logger::new(manager, formatter).with_level(config.format.level);
    Ok(match &config.format.progname {
        Some(progname) => logger.with_progname(progname.clone()),
        None => logger,
    })
}

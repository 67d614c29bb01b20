use crate::logger::Severity;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Upper bound imposed by the PutLogEvents API on events per call.
pub const MAX_EVENTS_PER_BATCH: usize = 10_000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Target log group. Required; kept optional here so a missing value is
    /// reported by validation instead of as a YAML parse error.
    pub log_group: Option<String>,
    /// Stream base name. Defaults to `hostname-uuid` when absent.
    #[serde(default)]
    pub log_stream: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    /// Endpoint override (localstack, mock servers).
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub credentials: Option<CredentialsConfig>,
    #[serde(default)]
    pub delivery: DeliveryConfig,
    #[serde(default)]
    pub format: FormatConfig,
}

impl Config {
    /// A config with every optional setting at its default.
    pub fn new(log_group: impl Into<String>) -> Self {
        Self {
            log_group: Some(log_group.into()),
            log_stream: None,
            region: None,
            endpoint: None,
            credentials: None,
            delivery: DeliveryConfig::default(),
            format: FormatConfig::default(),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct CredentialsConfig {
    pub access_key_id: String,
    pub secret_access_key: String,
    #[serde(default)]
    pub session_token: Option<String>,
}

impl fmt::Debug for CredentialsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialsConfig")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field(
                "session_token",
                &self.session_token.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryConfig {
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,
    #[serde(default = "default_network_timeout", with = "humantime_serde")]
    pub open_timeout: Duration,
    #[serde(default = "default_network_timeout", with = "humantime_serde")]
    pub read_timeout: Duration,
    /// Attempts after the first for transport/throttling failures.
    #[serde(default = "default_max_append_retries")]
    pub max_append_retries: usize,
    #[serde(default = "default_retry_backoff", with = "humantime_serde")]
    pub retry_backoff: Duration,
    #[serde(default = "default_shutdown_timeout", with = "humantime_serde")]
    pub shutdown_timeout: Duration,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            max_batch_size: default_max_batch_size(),
            open_timeout: default_network_timeout(),
            read_timeout: default_network_timeout(),
            max_append_retries: default_max_append_retries(),
            retry_backoff: default_retry_backoff(),
            shutdown_timeout: default_shutdown_timeout(),
        }
    }
}

fn default_max_batch_size() -> usize {
    25
}

fn default_network_timeout() -> Duration {
    Duration::from_secs(120)
}

fn default_max_append_retries() -> usize {
    3
}

fn default_retry_backoff() -> Duration {
    Duration::from_millis(500)
}

fn default_shutdown_timeout() -> Duration {
    Duration::from_secs(30)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormatConfig {
    #[serde(default)]
    pub kind: FormatKind,
    #[serde(default = "default_level")]
    pub level: Severity,
    #[serde(default)]
    pub progname: Option<String>,
}

impl Default for FormatConfig {
    fn default() -> Self {
        Self {
            kind: FormatKind::default(),
            level: default_level(),
            progname: None,
        }
    }
}

fn default_level() -> Severity {
    Severity::Debug
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormatKind {
    #[default]
    Text,
    Json,
}

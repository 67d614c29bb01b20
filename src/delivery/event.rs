use super::manager::DeliveryError;
use crate::sink::InputLogEvent;
use chrono::NaiveDate;
use uuid::Uuid;

/// A log message stamped at the moment it was accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    pub payload: String,
}

impl Event {
    pub fn new(timestamp: i64, payload: String) -> Self {
        Self { timestamp, payload }
    }
}

impl From<Event> for InputLogEvent {
    fn from(event: Event) -> Self {
        InputLogEvent {
            timestamp: event.timestamp,
            message: event.payload,
        }
    }
}

/// Items travelling through the shared intake queue.
#[derive(Debug)]
pub(crate) enum Envelope {
    Event(Event),
    /// Stop after draining; carries the generation of the worker it is meant for.
    Exit(u64),
}

/// Where events go: a log group and the base name of its day-scoped streams.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamIdentity {
    log_group_name: String,
    log_stream_name: String,
}

impl StreamIdentity {
    /// A missing stream name is derived from the host; an empty one is an error.
    pub fn new(
        log_group_name: impl Into<String>,
        log_stream_name: Option<String>,
    ) -> Result<Self, DeliveryError> {
        let log_group_name = log_group_name.into();
        if log_group_name.trim().is_empty() {
            return Err(DeliveryError::LogGroupNameRequired);
        }

        let log_stream_name = match log_stream_name {
            Some(name) if name.trim().is_empty() => {
                return Err(DeliveryError::LogStreamNameRequired)
            }
            Some(name) => name,
            None => default_log_stream_name(),
        };

        Ok(Self {
            log_group_name,
            log_stream_name,
        })
    }

    pub fn log_group_name(&self) -> &str {
        &self.log_group_name
    }

    pub fn log_stream_name(&self) -> &str {
        &self.log_stream_name
    }

    /// The name actually written to: `base/YYYY-MM-DD`.
    pub fn effective_stream_name(&self, date: NaiveDate) -> String {
        format!("{}/{}", self.log_stream_name, date.format("%Y-%m-%d"))
    }
}

/// `hostname-uuid`, unique per logger instance.
pub fn default_log_stream_name() -> String {
    format!("{}-{}", local_hostname(), Uuid::new_v4())
}

pub(crate) fn local_hostname() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.to_str().map(|s| s.to_string()))
        .unwrap_or_else(|| "localhost".to_string())
}

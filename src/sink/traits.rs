use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::ops::Range;
use thiserror::Error;

/// A single event as sent to the service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputLogEvent {
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct PutLogEventsRequest<'a> {
    pub log_group_name: &'a str,
    pub log_stream_name: &'a str,
    pub log_events: &'a [InputLogEvent],
    pub sequence_token: Option<&'a str>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PutLogEventsResponse {
    #[serde(default)]
    pub next_sequence_token: Option<String>,
    #[serde(default)]
    pub rejected_log_events_info: Option<RejectedLogEventsInfo>,
}

/// Index ranges of events the service accepted the call for but refused to store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectedLogEventsInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub too_new_log_event_start_index: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub too_old_log_event_end_index: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expired_log_event_end_index: Option<i64>,
}

impl RejectedLogEventsInfo {
    /// Indices of a `len`-event batch that the service stored. End indices
    /// are exclusive, the too-new start index is inclusive.
    pub fn accepted_range(&self, len: usize) -> Range<usize> {
        let clamp = |index: i64| usize::try_from(index).unwrap_or(0).min(len);
        let start = [self.too_old_log_event_end_index, self.expired_log_event_end_index]
            .into_iter()
            .flatten()
            .map(clamp)
            .max()
            .unwrap_or(0);
        let end = self.too_new_log_event_start_index.map_or(len, clamp);
        start..end.max(start)
    }
}

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("resource already exists: {0}")]
    AlreadyExists(String),

    #[error("resource not found: {0}")]
    NotFound(String),

    #[error("invalid sequence token, expected {expected:?}")]
    InvalidSequenceToken { expected: Option<String> },

    #[error("batch already accepted, expected sequence token {expected:?}")]
    DataAlreadyAccepted { expected: Option<String> },

    #[error("throttled: {0}")]
    Throttled(String),

    #[error("service error {status} ({code}): {message}")]
    Service {
        status: u16,
        code: String,
        message: String,
    },

    #[error("HTTP request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("JSON serialization/deserialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("no credentials: set them in config or AWS_ACCESS_KEY_ID/AWS_SECRET_ACCESS_KEY")]
    MissingCredentials,

    #[error("no region configured: set region in config or AWS_REGION")]
    MissingRegion,
}

impl SinkError {
    /// Whether the same request may succeed if simply sent again later.
    pub fn is_transient(&self) -> bool {
        match self {
            SinkError::Throttled(_) | SinkError::Transport(_) => true,
            SinkError::Service { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, SinkError>;

/// The remote append-only log service, as seen by one worker connection.
#[async_trait]
pub trait RemoteSink: Send + Sync {
    async fn create_log_group(&self, log_group_name: &str) -> Result<()>;

    async fn create_log_stream(&self, log_group_name: &str, log_stream_name: &str) -> Result<()>;

    async fn put_log_events(
        &self,
        request: PutLogEventsRequest<'_>,
    ) -> Result<PutLogEventsResponse>;
}

/// Opens sink connections. Each worker calls `connect` once when it starts.
pub trait SinkConnector: Send + Sync {
    fn connect(&self) -> Result<Box<dyn RemoteSink>>;
}

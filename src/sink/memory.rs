//! In-process stand-in for the log service.
//!
//! Enforces the same sequencing rules as the real API (groups must exist
//! before streams, every append after the first must carry the latest token)
//! and records every append attempt, so delivery behaviour can be asserted
//! without a network. Fault injection hooks cover connection failures,
//! throttling and rejected events.

use super::traits::{
    InputLogEvent, PutLogEventsRequest, PutLogEventsResponse, RejectedLogEventsInfo, RemoteSink,
    Result, SinkConnector, SinkError,
};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PutOutcome {
    Accepted {
        next_token: String,
        rejected: Option<RejectedLogEventsInfo>,
    },
    StaleToken {
        expected: Option<String>,
    },
    Failed(String),
}

/// One recorded PutLogEvents attempt.
#[derive(Debug, Clone)]
pub struct PutCall {
    pub log_group_name: String,
    pub log_stream_name: String,
    pub events: Vec<InputLogEvent>,
    pub sequence_token: Option<String>,
    pub outcome: PutOutcome,
}

impl PutCall {
    pub fn messages(&self) -> Vec<String> {
        self.events.iter().map(|e| e.message.clone()).collect()
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self.outcome, PutOutcome::Accepted { .. })
    }
}

#[derive(Debug, Default)]
struct StreamState {
    expected_token: Option<String>,
    events: Vec<InputLogEvent>,
}

#[derive(Debug, Default)]
struct MemoryState {
    groups: HashSet<String>,
    streams: BTreeMap<(String, String), StreamState>,
    calls: Vec<PutCall>,
    token_counter: u64,
    connects: usize,
    connect_failures: usize,
    append_failures: usize,
    rejections: VecDeque<RejectedLogEventsInfo>,
}

#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    state: Arc<Mutex<MemoryState>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Pre-create a group, as if another process had made it.
    pub fn insert_group(&self, group: &str) {
        self.lock().groups.insert(group.to_string());
    }

    /// Pre-create a stream (and its group).
    pub fn insert_stream(&self, group: &str, stream: &str) {
        let mut state = self.lock();
        state.groups.insert(group.to_string());
        state
            .streams
            .entry((group.to_string(), stream.to_string()))
            .or_default();
    }

    /// Make the stream expect `token` on the next append, as if another
    /// writer had appended to it.
    pub fn set_expected_token(&self, group: &str, stream: &str, token: &str) {
        let mut state = self.lock();
        state.groups.insert(group.to_string());
        state
            .streams
            .entry((group.to_string(), stream.to_string()))
            .or_default()
            .expected_token = Some(token.to_string());
    }

    /// The next `count` connection attempts fail.
    pub fn fail_next_connects(&self, count: usize) {
        self.lock().connect_failures = count;
    }

    /// The next `count` appends fail with a throttling error.
    pub fn fail_next_appends(&self, count: usize) {
        self.lock().append_failures = count;
    }

    /// The next accepted append reports `info` as rejected events.
    pub fn reject_next_append(&self, info: RejectedLogEventsInfo) {
        self.lock().rejections.push_back(info);
    }

    pub fn calls(&self) -> Vec<PutCall> {
        self.lock().calls.clone()
    }

    /// Message batches of the accepted appends to one stream, in call order.
    pub fn accepted_batches(&self, group: &str, stream: &str) -> Vec<Vec<String>> {
        self.lock()
            .calls
            .iter()
            .filter(|c| c.is_accepted())
            .filter(|c| c.log_group_name == group && c.log_stream_name == stream)
            .map(PutCall::messages)
            .collect()
    }

    /// Messages stored in a stream.
    pub fn messages(&self, group: &str, stream: &str) -> Vec<String> {
        self.lock()
            .streams
            .get(&(group.to_string(), stream.to_string()))
            .map(|s| s.events.iter().map(|e| e.message.clone()).collect())
            .unwrap_or_default()
    }

    /// Stream names in a group, sorted.
    pub fn streams(&self, group: &str) -> Vec<String> {
        self.lock()
            .streams
            .keys()
            .filter(|(g, _)| g == group)
            .map(|(_, s)| s.clone())
            .collect()
    }

    pub fn has_group(&self, group: &str) -> bool {
        self.lock().groups.contains(group)
    }

    pub fn connect_count(&self) -> usize {
        self.lock().connects
    }
}

impl SinkConnector for MemorySink {
    fn connect(&self) -> Result<Box<dyn RemoteSink>> {
        let mut state = self.lock();
        state.connects += 1;
        if state.connect_failures > 0 {
            state.connect_failures -= 1;
            return Err(SinkError::Connect("injected connection failure".to_string()));
        }
        Ok(Box::new(self.clone()))
    }
}

#[async_trait]
impl RemoteSink for MemorySink {
    async fn create_log_group(&self, log_group_name: &str) -> Result<()> {
        let mut state = self.lock();
        if !state.groups.insert(log_group_name.to_string()) {
            return Err(SinkError::AlreadyExists(format!(
                "log group {} already exists",
                log_group_name
            )));
        }
        Ok(())
    }

    async fn create_log_stream(&self, log_group_name: &str, log_stream_name: &str) -> Result<()> {
        let mut state = self.lock();
        if !state.groups.contains(log_group_name) {
            return Err(SinkError::NotFound(format!(
                "log group {} does not exist",
                log_group_name
            )));
        }
        let key = (log_group_name.to_string(), log_stream_name.to_string());
        if state.streams.contains_key(&key) {
            return Err(SinkError::AlreadyExists(format!(
                "log stream {} already exists",
                log_stream_name
            )));
        }
        state.streams.insert(key, StreamState::default());
        Ok(())
    }

    async fn put_log_events(
        &self,
        request: PutLogEventsRequest<'_>,
    ) -> Result<PutLogEventsResponse> {
        let mut guard = self.lock();
        let state = &mut *guard;

        let mut call = PutCall {
            log_group_name: request.log_group_name.to_string(),
            log_stream_name: request.log_stream_name.to_string(),
            events: request.log_events.to_vec(),
            sequence_token: request.sequence_token.map(str::to_string),
            outcome: PutOutcome::Failed(String::new()),
        };

        if state.append_failures > 0 {
            state.append_failures -= 1;
            call.outcome = PutOutcome::Failed("throttled".to_string());
            state.calls.push(call);
            return Err(SinkError::Throttled("Rate exceeded".to_string()));
        }

        let key = (call.log_group_name.clone(), call.log_stream_name.clone());
        let Some(stream) = state.streams.get_mut(&key) else {
            call.outcome = PutOutcome::Failed("stream not found".to_string());
            state.calls.push(call);
            return Err(SinkError::NotFound(format!(
                "log stream {} does not exist",
                request.log_stream_name
            )));
        };

        if stream.expected_token.as_deref() != request.sequence_token {
            let expected = stream.expected_token.clone();
            call.outcome = PutOutcome::StaleToken {
                expected: expected.clone(),
            };
            state.calls.push(call);
            return Err(SinkError::InvalidSequenceToken { expected });
        }

        state.token_counter += 1;
        let next_token = format!("{:020}", state.token_counter);
        stream.expected_token = Some(next_token.clone());

        let rejected = state.rejections.pop_front();
        let stored = match &rejected {
            Some(info) => &request.log_events[info.accepted_range(request.log_events.len())],
            None => request.log_events,
        };
        stream.events.extend(stored.iter().cloned());

        call.outcome = PutOutcome::Accepted {
            next_token: next_token.clone(),
            rejected: rejected.clone(),
        };
        state.calls.push(call);

        Ok(PutLogEventsResponse {
            next_sequence_token: Some(next_token),
            rejected_log_events_info: rejected,
        })
    }
}

use super::clock::{Clock, SystemClock};
use super::event::{Envelope, Event, StreamIdentity};
use super::stats::{DeliveryStats, StatsSnapshot};
use super::worker::{NotAccepted, SharedIntake, WorkerContext, WorkerHandle};
use crate::config::types::{DeliveryConfig, MAX_EVENTS_PER_BATCH};
use crate::sink::SinkConnector;
use chrono::NaiveDate;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Handoffs refused in a row before the event is queued without a live worker.
const MAX_HANDOFF_ATTEMPTS: usize = 3;

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("log group name is required")]
    LogGroupNameRequired,

    #[error("log stream name is required")]
    LogStreamNameRequired,

    #[error("invalid delivery option: {0}")]
    InvalidOption(String),

    #[error("no tokio runtime available to run delivery workers")]
    NoRuntime,
}

/// Parts every worker is built from.
struct Shared {
    identity: StreamIdentity,
    connector: Arc<dyn SinkConnector>,
    config: DeliveryConfig,
    intake: SharedIntake,
    stats: Arc<DeliveryStats>,
    runtime: Handle,
}

impl Shared {
    fn spawn_worker(
        &self,
        generation: u64,
        date: NaiveDate,
        predecessor: Option<&WorkerHandle>,
    ) -> WorkerHandle {
        let ctx = WorkerContext {
            generation,
            log_group_name: self.identity.log_group_name().to_string(),
            log_stream_name: self.identity.effective_stream_name(date),
            connector: Arc::clone(&self.connector),
            intake: Arc::clone(&self.intake),
            config: self.config.clone(),
            stats: Arc::clone(&self.stats),
        };
        WorkerHandle::spawn(
            &self.runtime,
            ctx,
            predecessor.map(WorkerHandle::finished_signal),
        )
    }
}

struct ManagerState {
    active_date: NaiveDate,
    current: WorkerHandle,
    next_generation: u64,
}

/// Accepts log messages from any thread and keeps exactly one worker
/// appending them to today's stream.
pub struct DeliveryManager {
    shared: Shared,
    clock: Arc<dyn Clock>,
    sender: mpsc::UnboundedSender<Envelope>,
    state: Mutex<ManagerState>,
    /// Handoffs still to be sabotaged by killing the worker right before them.
    #[cfg(test)]
    kill_before_handoff: std::sync::atomic::AtomicUsize,
}

impl DeliveryManager {
    /// Must be called from within a tokio runtime; workers are spawned onto it.
    pub fn new(
        identity: StreamIdentity,
        connector: Arc<dyn SinkConnector>,
        config: DeliveryConfig,
    ) -> Result<Self, DeliveryError> {
        Self::with_clock(identity, connector, config, Arc::new(SystemClock))
    }

    pub fn with_clock(
        identity: StreamIdentity,
        connector: Arc<dyn SinkConnector>,
        config: DeliveryConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, DeliveryError> {
        if config.max_batch_size == 0 || config.max_batch_size > MAX_EVENTS_PER_BATCH {
            return Err(DeliveryError::InvalidOption(format!(
                "max_batch_size must be between 1 and {}",
                MAX_EVENTS_PER_BATCH
            )));
        }
        let runtime = Handle::try_current().map_err(|_| DeliveryError::NoRuntime)?;

        let (sender, receiver) = mpsc::unbounded_channel();
        let shared = Shared {
            identity,
            connector,
            config,
            intake: Arc::new(tokio::sync::Mutex::new(receiver)),
            stats: Arc::new(DeliveryStats::default()),
            runtime,
        };

        let active_date = clock.today();
        let current = shared.spawn_worker(1, active_date, None);
        info!(
            group = %shared.identity.log_group_name(),
            stream = %current.stream_name(),
            "Delivery manager started"
        );

        Ok(Self {
            shared,
            clock,
            sender,
            state: Mutex::new(ManagerState {
                active_date,
                current,
                next_generation: 2,
            }),
            #[cfg(test)]
            kill_before_handoff: std::sync::atomic::AtomicUsize::new(0),
        })
    }

    /// Queue a message for delivery. Never blocks on the network and never fails.
    pub fn deliver(&self, payload: impl Into<String>) {
        let payload = payload.into();
        let mut state = self.lock_state();

        let now = self.clock.now();
        let today = self.clock.today();
        if today != state.active_date {
            self.rotate(&mut state, today);
        }
        if !state.current.is_alive() {
            warn!(
                stream = %state.current.stream_name(),
                generation = state.current.generation(),
                "Delivery worker is not running, starting a replacement"
            );
            self.replace(&mut state);
        }

        // Stamped under the lock so timestamps follow queue order.
        let mut event = Event::new(now.timestamp_millis(), payload);
        let mut attempts = 0;
        loop {
            #[cfg(test)]
            self.kill_worker_before_handoff(&state);

            match state.current.submit(&self.sender, event) {
                Ok(()) => break,
                Err(NotAccepted(refused)) => {
                    attempts += 1;
                    if attempts >= MAX_HANDOFF_ATTEMPTS {
                        warn!(
                            attempts,
                            "No live delivery worker, leaving event queued for the next one"
                        );
                        let _ = self.sender.send(Envelope::Event(refused));
                        break;
                    }
                    warn!(
                        generation = state.current.generation(),
                        "Delivery worker stopped during handoff, starting a replacement"
                    );
                    event = refused;
                    self.replace(&mut state);
                }
            }
        }

        self.shared.stats.record_accepted();
    }

    /// Drain queued events through the current worker and wait for its final
    /// append, bounded by `shutdown_timeout`. Returns the counters as they
    /// stand once the worker has finished or the timeout has passed.
    pub async fn shutdown(self) -> StatsSnapshot {
        {
            let mut state = self.lock_state();
            if !state.current.is_alive() {
                self.replace(&mut state);
            }
            info!(
                stream = %state.current.stream_name(),
                "Shutting down delivery, draining queued events"
            );
            state.current.retire(&self.sender);
        }

        let timeout = self.shared.config.shutdown_timeout;
        let stats = Arc::clone(&self.shared.stats);
        let state = self.state.into_inner().unwrap_or_else(PoisonError::into_inner);
        drop(self.sender);

        let stream = state.current.stream_name().to_string();
        match tokio::time::timeout(timeout, state.current.into_task()).await {
            Ok(Ok(())) => info!(stream = %stream, "Delivery shut down cleanly"),
            Ok(Err(e)) => warn!(stream = %stream, error = %e, "Delivery worker ended abnormally"),
            Err(_) => warn!(
                stream = %stream,
                timeout_ms = timeout.as_millis() as u64,
                abandoned = stats.snapshot().pending_events(),
                "Delivery worker did not drain before shutdown timeout"
            ),
        }

        stats.snapshot()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.shared.stats.snapshot()
    }

    pub fn identity(&self) -> &StreamIdentity {
        &self.shared.identity
    }

    /// Effective stream name the current worker writes to.
    pub fn active_stream_name(&self) -> String {
        self.lock_state().current.stream_name().to_string()
    }

    fn lock_state(&self) -> MutexGuard<'_, ManagerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn rotate(&self, state: &mut ManagerState, today: NaiveDate) {
        info!(from = %state.active_date, to = %today, "Date changed, rotating log stream");
        state.active_date = today;
        state.current.retire(&self.sender);
        self.start_next(state);
        self.shared.stats.record_rotation();
    }

    fn replace(&self, state: &mut ManagerState) {
        state.current.abort();
        self.start_next(state);
    }

    #[cfg(test)]
    fn kill_worker_before_handoff(&self, state: &ManagerState) {
        use std::sync::atomic::Ordering;

        let armed = self
            .kill_before_handoff
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1))
            .is_ok();
        if armed {
            state.current.abort();
        }
    }

    fn start_next(&self, state: &mut ManagerState) {
        let generation = state.next_generation;
        state.next_generation += 1;
        let next = self
            .shared
            .spawn_worker(generation, state.active_date, Some(&state.current));
        state.current = next;
    }
}

use super::event::{Envelope, Event};
use super::stats::DeliveryStats;
use crate::config::types::DeliveryConfig;
use crate::sink::{InputLogEvent, PutLogEventsRequest, RemoteSink, SinkConnector, SinkError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::mpsc::error::{SendError, TryRecvError};
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("failed to open stream {stream}: {source}")]
    Connect {
        stream: String,
        #[source]
        source: SinkError,
    },

    #[error("append to {stream} failed after {attempts} attempt(s): {source}")]
    Append {
        stream: String,
        attempts: usize,
        #[source]
        source: SinkError,
    },
}

/// Receiving end of the intake queue, held by whichever worker is current.
pub(crate) type SharedIntake = Arc<Mutex<mpsc::UnboundedReceiver<Envelope>>>;

/// Everything a worker owns for its lifetime.
pub(crate) struct WorkerContext {
    pub generation: u64,
    pub log_group_name: String,
    /// Effective (day-scoped) stream name.
    pub log_stream_name: String,
    pub connector: Arc<dyn SinkConnector>,
    pub intake: SharedIntake,
    pub config: DeliveryConfig,
    pub stats: Arc<DeliveryStats>,
}

/// Returned when a handoff reaches a worker that is no longer running.
#[derive(Debug)]
pub(crate) struct NotAccepted(pub Event);

/// Completes once the worker it was taken from has fully stopped.
pub(crate) type FinishedSignal = watch::Receiver<()>;

/// Clears the liveness flag however the worker task ends: return, panic or abort.
struct LivenessGuard {
    alive: Arc<AtomicBool>,
    _finished: watch::Sender<()>,
}

impl Drop for LivenessGuard {
    fn drop(&mut self) {
        self.alive.store(false, Ordering::Release);
    }
}

/// The manager's view of a running worker task.
pub(crate) struct WorkerHandle {
    generation: u64,
    stream_name: String,
    alive: Arc<AtomicBool>,
    finished: FinishedSignal,
    task: JoinHandle<()>,
}

impl WorkerHandle {
    /// Start a worker. With a predecessor, the new worker connects right away
    /// but reads nothing from the intake until the predecessor has stopped.
    pub(crate) fn spawn(
        runtime: &Handle,
        ctx: WorkerContext,
        predecessor: Option<FinishedSignal>,
    ) -> Self {
        let alive = Arc::new(AtomicBool::new(true));
        let (finished_tx, finished_rx) = watch::channel(());
        let guard = LivenessGuard {
            alive: Arc::clone(&alive),
            _finished: finished_tx,
        };

        let generation = ctx.generation;
        let stream_name = ctx.log_stream_name.clone();
        ctx.stats.record_worker_start();

        let task = runtime.spawn(async move {
            let _guard = guard;
            let stats = Arc::clone(&ctx.stats);
            let stream = ctx.log_stream_name.clone();

            let mut worker = Worker::new(ctx, predecessor);
            match worker.run().await {
                Ok(()) => info!(stream = %stream, generation, "Delivery worker stopped"),
                Err(e) => {
                    stats.record_worker_failure();
                    error!(stream = %stream, generation, error = %e, "Delivery worker failed");
                }
            }
        });

        Self {
            generation,
            stream_name,
            alive,
            finished: finished_rx,
            task,
        }
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }

    pub(crate) fn stream_name(&self) -> &str {
        &self.stream_name
    }

    pub(crate) fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire) && !self.task.is_finished()
    }

    pub(crate) fn finished_signal(&self) -> FinishedSignal {
        self.finished.clone()
    }

    /// Queue an event for this worker.
    pub(crate) fn submit(
        &self,
        queue: &mpsc::UnboundedSender<Envelope>,
        event: Event,
    ) -> Result<(), NotAccepted> {
        if !self.is_alive() {
            return Err(NotAccepted(event));
        }
        if let Err(SendError(Envelope::Event(event))) = queue.send(Envelope::Event(event)) {
            return Err(NotAccepted(event));
        }
        Ok(())
    }

    /// Ask the worker to append everything queued so far and stop.
    pub(crate) fn retire(&self, queue: &mpsc::UnboundedSender<Envelope>) {
        if queue.send(Envelope::Exit(self.generation)).is_err() {
            warn!(generation = self.generation, "Intake closed before exit signal could be sent");
        }
    }

    /// Stop the task at its next await point, dropping any in-flight batch.
    pub(crate) fn abort(&self) {
        self.alive.store(false, Ordering::Release);
        self.task.abort();
    }

    pub(crate) fn into_task(self) -> JoinHandle<()> {
        self.task
    }
}

struct Worker {
    ctx: WorkerContext,
    predecessor: Option<FinishedSignal>,
    sequence_token: Option<String>,
}

impl Worker {
    fn new(ctx: WorkerContext, predecessor: Option<FinishedSignal>) -> Self {
        Self {
            ctx,
            predecessor,
            sequence_token: None,
        }
    }

    async fn run(&mut self) -> Result<(), WorkerError> {
        let sink = self.connect().await?;

        if let Some(mut predecessor) = self.predecessor.take() {
            // Err once the predecessor's guard is dropped; no value is ever sent.
            while predecessor.changed().await.is_ok() {}
        }

        let intake = Arc::clone(&self.ctx.intake);
        let mut intake = intake.lock().await;
        debug!(
            stream = %self.ctx.log_stream_name,
            generation = self.ctx.generation,
            "Delivery worker reading intake"
        );

        loop {
            let (batch, exiting) = self.collect_batch(&mut intake).await;
            if !batch.is_empty() {
                self.append(sink.as_ref(), batch).await?;
            }
            if exiting {
                return Ok(());
            }
        }
    }

    /// Open a connection and make sure the target stream exists.
    async fn connect(&self) -> Result<Box<dyn RemoteSink>, WorkerError> {
        let group = self.ctx.log_group_name.as_str();
        let stream = self.ctx.log_stream_name.as_str();
        let wrap = |source: SinkError| WorkerError::Connect {
            stream: stream.to_string(),
            source,
        };

        let sink = self.ctx.connector.connect().map_err(wrap)?;

        match sink.create_log_stream(group, stream).await {
            Ok(()) => info!(group = %group, stream = %stream, "Created log stream"),
            Err(SinkError::AlreadyExists(_)) => {
                debug!(group = %group, stream = %stream, "Log stream already exists")
            }
            Err(SinkError::NotFound(_)) => {
                match sink.create_log_group(group).await {
                    Ok(()) => info!(group = %group, "Created log group"),
                    Err(SinkError::AlreadyExists(_)) => {}
                    Err(e) => return Err(wrap(e)),
                }
                match sink.create_log_stream(group, stream).await {
                    Ok(()) => info!(group = %group, stream = %stream, "Created log stream"),
                    Err(SinkError::AlreadyExists(_)) => {}
                    Err(e) => return Err(wrap(e)),
                }
            }
            Err(e) => return Err(wrap(e)),
        }

        Ok(sink)
    }

    /// Wait for the first item, then take whatever else is already queued,
    /// up to the batch limit. Returns the batch and whether to stop afterwards.
    async fn collect_batch(
        &self,
        intake: &mut mpsc::UnboundedReceiver<Envelope>,
    ) -> (Vec<Event>, bool) {
        let mut batch = Vec::with_capacity(self.ctx.config.max_batch_size);

        let mut exiting = match intake.recv().await {
            Some(envelope) => self.take(envelope, &mut batch),
            None => return (batch, true),
        };

        while !exiting && batch.len() < self.ctx.config.max_batch_size {
            match intake.try_recv() {
                Ok(envelope) => exiting = self.take(envelope, &mut batch),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => exiting = true,
            }
        }

        (batch, exiting)
    }

    fn take(&self, envelope: Envelope, batch: &mut Vec<Event>) -> bool {
        match envelope {
            Envelope::Event(event) => {
                batch.push(event);
                false
            }
            Envelope::Exit(generation) if generation == self.ctx.generation => true,
            Envelope::Exit(generation) => {
                debug!(
                    generation,
                    current = self.ctx.generation,
                    "Ignoring exit signal addressed to an earlier worker"
                );
                false
            }
        }
    }

    async fn append(
        &mut self,
        sink: &dyn RemoteSink,
        batch: Vec<Event>,
    ) -> Result<(), WorkerError> {
        let events: Vec<InputLogEvent> = batch.into_iter().map(InputLogEvent::from).collect();
        let mut failures = 0;
        let mut backoff = self.ctx.config.retry_backoff;

        loop {
            let request = PutLogEventsRequest {
                log_group_name: &self.ctx.log_group_name,
                log_stream_name: &self.ctx.log_stream_name,
                log_events: &events,
                sequence_token: self.sequence_token.as_deref(),
            };

            match sink.put_log_events(request).await {
                Ok(response) => {
                    self.sequence_token = response.next_sequence_token;
                    match response.rejected_log_events_info {
                        Some(info) => {
                            let appended = info.accepted_range(events.len()).len();
                            let rejected = events.len() - appended;
                            error!(
                                stream = %self.ctx.log_stream_name,
                                appended,
                                rejected,
                                info = ?info,
                                "Service rejected log events"
                            );
                            if appended > 0 {
                                self.ctx.stats.record_append(appended);
                            }
                            self.ctx.stats.record_rejection(info, rejected);
                        }
                        None => {
                            debug!(
                                stream = %self.ctx.log_stream_name,
                                count = events.len(),
                                "Appended log events"
                            );
                            self.ctx.stats.record_append(events.len());
                        }
                    }
                    return Ok(());
                }
                Err(SinkError::InvalidSequenceToken { expected }) => {
                    debug!(
                        stream = %self.ctx.log_stream_name,
                        expected = ?expected,
                        "Sequence token was stale, retrying with expected token"
                    );
                    self.ctx.stats.record_stale_token();
                    self.sequence_token = expected;
                }
                Err(SinkError::DataAlreadyAccepted { expected }) => {
                    warn!(
                        stream = %self.ctx.log_stream_name,
                        count = events.len(),
                        "Batch was already accepted"
                    );
                    self.sequence_token = expected;
                    return Ok(());
                }
                Err(e) if e.is_transient() && failures < self.ctx.config.max_append_retries => {
                    failures += 1;
                    warn!(
                        stream = %self.ctx.log_stream_name,
                        attempt = failures,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "Append failed, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                    backoff = std::cmp::min(backoff * 2, Duration::from_secs(60));
                }
                Err(e) => {
                    self.ctx.stats.record_dropped(events.len());
                    return Err(WorkerError::Append {
                        stream: self.ctx.log_stream_name.clone(),
                        attempts: failures + 1,
                        source: e,
                    });
                }
            }
        }
    }
}

use crate::sink::RejectedLogEventsInfo;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

/// Counters shared between the manager and its workers.
#[derive(Debug, Default)]
pub struct DeliveryStats {
    events_accepted: AtomicU64,
    events_appended: AtomicU64,
    batches_appended: AtomicU64,
    stale_token_retries: AtomicU64,
    rejected_batches: AtomicU64,
    rejected_events: AtomicU64,
    dropped_events: AtomicU64,
    worker_starts: AtomicU64,
    worker_failures: AtomicU64,
    rotations: AtomicU64,
    last_rejection: Mutex<Option<RejectedLogEventsInfo>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub events_accepted: u64,
    pub events_appended: u64,
    pub batches_appended: u64,
    pub stale_token_retries: u64,
    pub rejected_batches: u64,
    pub rejected_events: u64,
    pub dropped_events: u64,
    pub worker_starts: u64,
    pub worker_failures: u64,
    pub rotations: u64,
    pub last_rejection: Option<RejectedLogEventsInfo>,
}

impl DeliveryStats {
    pub(crate) fn record_accepted(&self) {
        self.events_accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_append(&self, events: usize) {
        self.events_appended.fetch_add(events as u64, Ordering::Relaxed);
        self.batches_appended.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_stale_token(&self) {
        self.stale_token_retries.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_rejection(&self, info: RejectedLogEventsInfo, events: usize) {
        self.rejected_batches.fetch_add(1, Ordering::Relaxed);
        self.rejected_events.fetch_add(events as u64, Ordering::Relaxed);
        *self
            .last_rejection
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(info);
    }

    pub(crate) fn record_dropped(&self, events: usize) {
        self.dropped_events.fetch_add(events as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_worker_start(&self) {
        self.worker_starts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_worker_failure(&self) {
        self.worker_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_rotation(&self) {
        self.rotations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            events_accepted: self.events_accepted.load(Ordering::Relaxed),
            events_appended: self.events_appended.load(Ordering::Relaxed),
            batches_appended: self.batches_appended.load(Ordering::Relaxed),
            stale_token_retries: self.stale_token_retries.load(Ordering::Relaxed),
            rejected_batches: self.rejected_batches.load(Ordering::Relaxed),
            rejected_events: self.rejected_events.load(Ordering::Relaxed),
            dropped_events: self.dropped_events.load(Ordering::Relaxed),
            worker_starts: self.worker_starts.load(Ordering::Relaxed),
            worker_failures: self.worker_failures.load(Ordering::Relaxed),
            rotations: self.rotations.load(Ordering::Relaxed),
            last_rejection: self
                .last_rejection
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
        }
    }
}

impl StatsSnapshot {
    /// Accepted events that were neither appended, rejected nor dropped yet.
    pub fn pending_events(&self) -> u64 {
        self.events_accepted.saturating_sub(
            self.events_appended + self.rejected_events + self.dropped_events,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_reflects_counters() {
        let stats = DeliveryStats::default();
        stats.record_accepted();
        stats.record_accepted();
        stats.record_append(2);
        stats.record_rejection(
            RejectedLogEventsInfo {
                too_new_log_event_start_index: Some(1),
                ..Default::default()
            },
            1,
        );

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.events_accepted, 2);
        assert_eq!(snapshot.events_appended, 2);
        assert_eq!(snapshot.batches_appended, 1);
        assert_eq!(snapshot.rejected_batches, 1);
        assert_eq!(snapshot.rejected_events, 1);
        assert_eq!(
            snapshot.last_rejection.unwrap().too_new_log_event_start_index,
            Some(1)
        );
    }

    #[test]
    fn test_pending_events_excludes_settled_ones() {
        let stats = DeliveryStats::default();
        for _ in 0..10 {
            stats.record_accepted();
        }
        stats.record_append(4);
        stats.record_rejection(RejectedLogEventsInfo::default(), 2);
        stats.record_dropped(1);

        assert_eq!(stats.snapshot().pending_events(), 3);
        assert_eq!(StatsSnapshot::default().pending_events(), 0);
    }
}

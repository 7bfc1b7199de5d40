//! Concurrent store that assembles raw events into traces.
//!
//! The trace-id map is a `DashMap`; get-or-create for an unseen trace id runs
//! under the shard's write lock, so concurrent first events for the same id
//! always converge on a single [`Trace`]. Mutation of a trace happens only
//! after the map guard is dropped, under the trace's own lock.

mod trace;

pub use trace::{Span, Trace, TraceSnapshot};

use crate::core::{EnrichmentContext, Event};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

/// Ingestion counters.
#[derive(Debug, Default)]
struct TrackerCounters {
    events_processed: AtomicU64,
    events_ignored: AtomicU64,
    traces_evicted: AtomicU64,
}

/// Point-in-time copy of the tracker counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TrackerStats {
    /// Events appended to a trace
    pub events_processed: u64,
    /// Events dropped for lacking a trace id
    pub events_ignored: u64,
    /// Traces removed by cleanup
    pub traces_evicted: u64,
    /// Traces currently held
    pub active_traces: usize,
}

/// Append-only (per trace) ingestion store.
#[derive(Debug, Default)]
pub struct TraceTracker {
    traces: DashMap<String, Arc<Trace>>,
    counters: TrackerCounters,
}

impl TraceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds one event into its trace; events without a trace id are ignored.
    pub fn process_event(&self, event: &Event, ctx: Option<&EnrichmentContext>) {
        if !event.has_trace() {
            self.counters.events_ignored.fetch_add(1, Ordering::Relaxed);
            return;
        }

        let trace = self.get_or_create(&event.trace_id, event.timestamp);
        self.record_into(trace, event, ctx);
        self.counters.events_processed.fetch_add(1, Ordering::Relaxed);
    }

    /// Records into `trace`; if cleanup removed it from the map meanwhile,
    /// the event is recorded once more into the live trace for its id.
    fn record_into(&self, trace: Arc<Trace>, event: &Event, ctx: Option<&EnrichmentContext>) {
        trace.record(event, ctx);
        let still_live = self
            .traces
            .get(&event.trace_id)
            .is_some_and(|current| Arc::ptr_eq(current.value(), &trace));
        if !still_live {
            tracing::debug!(trace_id = %event.trace_id, "trace evicted during ingest, re-recording");
            self.get_or_create(&event.trace_id, event.timestamp)
                .record(event, ctx);
        }
    }

    fn get_or_create(&self, trace_id: &str, first_seen: SystemTime) -> Arc<Trace> {
        if let Some(existing) = self.traces.get(trace_id) {
            return Arc::clone(existing.value());
        }
        // Re-checked under the shard write lock; a racing creator wins and we reuse its trace.
        let entry = self
            .traces
            .entry(trace_id.to_string())
            .or_insert_with(|| Arc::new(Trace::new(trace_id.to_string(), first_seen)));
        Arc::clone(entry.value())
    }

    pub fn get_trace(&self, trace_id: &str) -> Option<Arc<Trace>> {
        self.traces.get(trace_id).map(|t| Arc::clone(t.value()))
    }

    /// Snapshot of the current trace handles; iterating it holds no map locks.
    pub fn get_all_traces(&self) -> Vec<Arc<Trace>> {
        self.traces.iter().map(|t| Arc::clone(t.value())).collect()
    }

    /// Consistent copies of every trace.
    pub fn snapshot_all(&self) -> Vec<TraceSnapshot> {
        self.get_all_traces().iter().map(|t| t.snapshot()).collect()
    }

    pub fn get_trace_count(&self) -> usize {
        self.traces.len()
    }

    /// Evicts traces whose last event is older than `now - max_age`.
    pub fn cleanup_old_traces(&self, max_age: Duration) -> usize {
        let cutoff = SystemTime::now()
            .checked_sub(max_age)
            .unwrap_or(SystemTime::UNIX_EPOCH);
        self.cleanup_before(cutoff)
    }

    /// Evicts traces whose `end_time` is strictly before `cutoff`.
    pub fn cleanup_before(&self, cutoff: SystemTime) -> usize {
        let before = self.traces.len();
        self.traces.retain(|_, trace| trace.end_time() >= cutoff);
        let removed = before.saturating_sub(self.traces.len());

        if removed > 0 {
            self.counters
                .traces_evicted
                .fetch_add(removed as u64, Ordering::Relaxed);
            tracing::debug!(removed, remaining = self.traces.len(), "evicted old traces");
        }
        removed
    }

    pub fn stats(&self) -> TrackerStats {
        TrackerStats {
            events_processed: self.counters.events_processed.load(Ordering::Relaxed),
            events_ignored: self.counters.events_ignored.load(Ordering::Relaxed),
            traces_evicted: self.counters.traces_evicted.load(Ordering::Relaxed),
            active_traces: self.traces.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::EventType;

    fn event(trace_id: &str, span_id: &str, at: SystemTime) -> Event {
        let mut event = Event::new(EventType::TcpConnect, at);
        event.trace_id = trace_id.to_string();
        event.span_id = span_id.to_string();
        event
    }

    #[test]
    fn test_single_root_event() {
        let tracker = TraceTracker::new();
        tracker.process_event(&event("t1", "s1", SystemTime::now()), None);

        assert_eq!(tracker.get_trace_count(), 1);
        let trace = tracker.get_trace("t1").unwrap();
        assert_eq!(trace.span_count(), 1);
        assert!(trace.span("s1").unwrap().parent_span_id.is_none());
    }

    #[test]
    fn test_events_without_trace_id_are_ignored() {
        let tracker = TraceTracker::new();
        tracker.process_event(&event("", "s1", SystemTime::now()), None);
        assert_eq!(tracker.get_trace_count(), 0);
        assert_eq!(tracker.stats().events_ignored, 1);
    }

    #[test]
    fn test_time_bounds_widen_regardless_of_order() {
        let tracker = TraceTracker::new();
        let base = SystemTime::now() - Duration::from_secs(60);
        let offsets = [20u64, 5, 40, 0, 33];
        for (i, offset) in offsets.iter().enumerate() {
            let at = base + Duration::from_secs(*offset);
            tracker.process_event(&event("t1", &format!("s{i}"), at), None);
        }

        let trace = tracker.get_trace("t1").unwrap();
        assert_eq!(trace.start_time(), base);
        assert_eq!(trace.end_time(), base + Duration::from_secs(40));
        assert_eq!(trace.span_count(), offsets.len());
    }

    #[test]
    fn test_repeated_span_ids_accumulate() {
        let tracker = TraceTracker::new();
        let now = SystemTime::now();
        for _ in 0..3 {
            tracker.process_event(&event("t1", "s1", now), None);
        }
        tracker.process_event(&event("t1", "s2", now), None);

        let trace = tracker.get_trace("t1").unwrap();
        assert_eq!(trace.span_count(), 2);
        assert_eq!(trace.span("s1").unwrap().events.len(), 3);
        assert_eq!(trace.span("s2").unwrap().events.len(), 1);
    }

    #[test]
    fn test_cleanup_by_age() {
        let tracker = TraceTracker::new();
        let stale = SystemTime::now() - Duration::from_secs(15 * 60);
        tracker.process_event(&event("old", "s1", stale), None);
        tracker.process_event(&event("fresh", "s1", SystemTime::now()), None);

        assert_eq!(tracker.cleanup_old_traces(Duration::from_secs(20 * 60)), 0);
        assert!(tracker.get_trace("old").is_some());

        assert_eq!(tracker.cleanup_old_traces(Duration::from_secs(10 * 60)), 1);
        assert!(tracker.get_trace("old").is_none());
        assert!(tracker.get_trace("fresh").is_some());
        assert_eq!(tracker.stats().traces_evicted, 1);
    }

    #[test]
    fn test_cleanup_is_idempotent_for_same_cutoff() {
        let tracker = TraceTracker::new();
        let now = SystemTime::now();
        tracker.process_event(&event("a", "s1", now - Duration::from_secs(100)), None);
        tracker.process_event(&event("b", "s1", now - Duration::from_secs(10)), None);

        let cutoff = now - Duration::from_secs(50);
        assert_eq!(tracker.cleanup_before(cutoff), 1);
        assert_eq!(tracker.cleanup_before(cutoff), 0);
        assert_eq!(tracker.get_trace_count(), 1);
    }

    #[test]
    fn test_get_all_traces_is_a_snapshot() {
        let tracker = TraceTracker::new();
        let now = SystemTime::now();
        tracker.process_event(&event("a", "s1", now), None);
        tracker.process_event(&event("b", "s1", now), None);

        let traces = tracker.get_all_traces();
        // Mutating the store while holding the snapshot must not deadlock.
        tracker.process_event(&event("c", "s1", now), None);
        tracker.cleanup_before(now + Duration::from_secs(1));
        assert_eq!(traces.len(), 2);
        assert_eq!(tracker.get_trace_count(), 0);
    }

    #[test]
    fn test_event_recorded_into_evicted_trace_is_recovered() {
        let tracker = TraceTracker::new();
        let now = SystemTime::now();
        let stale = tracker.get_or_create("t1", now - Duration::from_secs(600));
        // Cleanup runs between get-or-create and record.
        assert_eq!(tracker.cleanup_before(now), 1);

        tracker.record_into(stale, &event("t1", "s1", now), None);

        let live = tracker.get_trace("t1").unwrap();
        assert_eq!(live.span_count(), 1);
        assert_eq!(live.end_time(), now);
    }

    #[test]
    fn test_live_trace_is_recorded_once() {
        let tracker = TraceTracker::new();
        let now = SystemTime::now();
        let trace = tracker.get_or_create("t1", now);
        tracker.record_into(trace, &event("t1", "s1", now), None);
        assert_eq!(tracker.get_trace("t1").unwrap().span("s1").unwrap().events.len(), 1);
    }
}

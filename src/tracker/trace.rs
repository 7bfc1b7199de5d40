//! Trace and span aggregates assembled from raw events.

use crate::core::otel_compliance::attributes;
use crate::core::{service_key, EnrichmentContext, Event, ServiceInfo};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::time::{Duration, SystemTime};

/// One unit of work inside a trace.
#[derive(Debug, Clone, Serialize)]
pub struct Span {
    pub trace_id: String,
    pub span_id: String,
    pub parent_span_id: Option<String>,
    /// Owning service; empty until enrichment provides one
    pub service: String,
    pub operation: String,
    pub start_time: SystemTime,
    /// Only meaningful after [`Span::update_duration`]
    pub duration: Duration,
    /// Constituent events in arrival order
    pub events: Vec<Event>,
    pub attributes: HashMap<String, String>,
    /// Sticky: once set it is never cleared
    pub error: bool,
}

impl Span {
    fn from_first_event(event: &Event) -> Self {
        let mut attrs = HashMap::new();
        if !event.process_name.is_empty() {
            attrs.insert(attributes::PROCESS_NAME.to_string(), event.process_name.clone());
        }
        if !event.target.is_empty() {
            attrs.insert(attributes::EVENT_TARGET.to_string(), event.target.clone());
        }
        if !event.details.is_empty() {
            attrs.insert(attributes::EVENT_DETAILS.to_string(), event.details.clone());
        }
        if event.pid != 0 {
            attrs.insert(attributes::PROCESS_PID.to_string(), event.pid.to_string());
        }

        Self {
            trace_id: event.trace_id.clone(),
            span_id: event.span_id.clone(),
            parent_span_id: Some(event.parent_span_id.clone()).filter(|p| !p.is_empty()),
            service: String::new(),
            operation: event.event_type.operation_name().to_string(),
            start_time: event.timestamp,
            duration: Duration::ZERO,
            events: Vec::new(),
            attributes: attrs,
            error: false,
        }
    }

    /// Returns true if this span has no parent.
    pub fn is_root(&self) -> bool {
        self.parent_span_id.is_none()
    }

    /// Recomputes `start_time` and `duration` from the earliest and latest event.
    pub fn update_duration(&mut self) {
        let mut timestamps = self.events.iter().map(|e| e.timestamp);
        let Some(first) = timestamps.next() else {
            return;
        };
        let (min, max) = timestamps.fold((first, first), |(min, max), t| (min.min(t), max.max(t)));
        self.start_time = min;
        self.duration = max.duration_since(min).unwrap_or_default();
    }

    /// Namespace-qualified service key, if the span has an owner.
    pub fn service_key(&self) -> Option<String> {
        if self.service.is_empty() {
            return None;
        }
        let namespace = self
            .attributes
            .get(attributes::K8S_NAMESPACE)
            .map(String::as_str)
            .unwrap_or_default();
        Some(service_key(namespace, &self.service))
    }

    fn backfill_service(&mut self, ctx: &EnrichmentContext) {
        if self.service.is_empty() {
            self.service = ctx.service_name.clone();
        }
        let mut scoped = vec![(attributes::SERVICE_NAME, &ctx.service_name)];
        if !ctx.namespace.is_empty() {
            scoped.push((attributes::K8S_NAMESPACE, &ctx.namespace));
        }
        if !ctx.pod_name.is_empty() {
            scoped.push((attributes::K8S_POD_NAME, &ctx.pod_name));
        }
        for (key, value) in scoped {
            self.attributes
                .entry(key.to_string())
                .or_insert_with(|| value.clone());
        }
    }
}

#[derive(Debug)]
struct TraceState {
    spans: HashMap<String, Span>,
    start_time: SystemTime,
    end_time: SystemTime,
    services: HashMap<String, ServiceInfo>,
}

/// All spans correlated by one trace id.
///
/// Span and time-bound mutation is serialized by a lock scoped to this trace,
/// so ingestion into unrelated traces never contends.
#[derive(Debug)]
pub struct Trace {
    trace_id: String,
    state: RwLock<TraceState>,
}

impl Trace {
    pub(crate) fn new(trace_id: String, first_seen: SystemTime) -> Self {
        Self {
            trace_id,
            state: RwLock::new(TraceState {
                spans: HashMap::new(),
                start_time: first_seen,
                end_time: first_seen,
                services: HashMap::new(),
            }),
        }
    }

    pub fn trace_id(&self) -> &str {
        &self.trace_id
    }

    pub fn start_time(&self) -> SystemTime {
        self.state.read().start_time
    }

    pub fn end_time(&self) -> SystemTime {
        self.state.read().end_time
    }

    pub fn span_count(&self) -> usize {
        self.state.read().spans.len()
    }

    /// Copy of one span with its duration recomputed.
    pub fn span(&self, span_id: &str) -> Option<Span> {
        let mut span = self.state.read().spans.get(span_id).cloned()?;
        span.update_duration();
        Some(span)
    }

    pub fn services(&self) -> HashMap<String, ServiceInfo> {
        self.state.read().services.clone()
    }

    /// Appends one event under the trace lock.
    pub(crate) fn record(&self, event: &Event, ctx: Option<&EnrichmentContext>) {
        let mut state = self.state.write();
        state.start_time = state.start_time.min(event.timestamp);
        state.end_time = state.end_time.max(event.timestamp);

        let identity = ctx.filter(|c| c.has_service());
        if let Some(ctx) = identity {
            state
                .services
                .entry(ctx.service_key())
                .or_insert_with(|| ServiceInfo::from(ctx));
        }

        let span = state
            .spans
            .entry(event.span_id.clone())
            .or_insert_with(|| Span::from_first_event(event));
        span.events.push(event.clone());
        if event.is_error() {
            span.error = true;
        }
        if let Some(ctx) = identity {
            span.backfill_service(ctx);
        }
    }

    /// Consistent copy of the trace taken under a single read lock.
    pub fn snapshot(&self) -> TraceSnapshot {
        let state = self.state.read();
        let mut spans: Vec<Span> = state.spans.values().cloned().collect();
        let services = state.services.clone();
        let (start_time, end_time) = (state.start_time, state.end_time);
        drop(state);

        for span in &mut spans {
            span.update_duration();
        }
        spans.sort_by(|a, b| a.start_time.cmp(&b.start_time).then_with(|| a.span_id.cmp(&b.span_id)));

        TraceSnapshot {
            trace_id: self.trace_id.clone(),
            spans,
            start_time,
            end_time,
            services,
        }
    }
}

/// Immutable copy of a [`Trace`], handed to graph building and exporters.
#[derive(Debug, Clone, Serialize)]
pub struct TraceSnapshot {
    pub trace_id: String,
    /// Sorted by start time, durations recomputed
    pub spans: Vec<Span>,
    pub start_time: SystemTime,
    pub end_time: SystemTime,
    pub services: HashMap<String, ServiceInfo>,
}

impl TraceSnapshot {
    pub fn span(&self, span_id: &str) -> Option<&Span> {
        self.spans.iter().find(|s| s.span_id == span_id)
    }

    /// First root span, falling back to the earliest span.
    pub fn root_span(&self) -> Option<&Span> {
        self.spans
            .iter()
            .find(|s| s.is_root())
            .or_else(|| self.spans.first())
    }

    pub fn has_errors(&self) -> bool {
        self.spans.iter().any(|s| s.error)
    }

    pub fn duration(&self) -> Duration {
        self.end_time.duration_since(self.start_time).unwrap_or_default()
    }
}

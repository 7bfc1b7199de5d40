//! Common test utilities and fixtures.

#![allow(dead_code)]

use spanweave::core::{EnrichmentContext, Event, EventType};
use spanweave::tracker::TraceTracker;
use std::time::{Duration, SystemTime};

/// Test fixture builder for creating events with sensible defaults.
pub struct TestEventBuilder {
    trace_id: String,
    span_id: String,
    parent_span_id: String,
    event_type: EventType,
    timestamp: SystemTime,
    error: i32,
    details: String,
}

impl TestEventBuilder {
    pub fn new(trace_id: &str, span_id: &str) -> Self {
        Self {
            trace_id: trace_id.to_string(),
            span_id: span_id.to_string(),
            parent_span_id: String::new(),
            event_type: EventType::HttpRequest,
            timestamp: SystemTime::now(),
            error: 0,
            details: String::new(),
        }
    }

    pub fn parent(mut self, parent_span_id: &str) -> Self {
        self.parent_span_id = parent_span_id.to_string();
        self
    }

    pub fn event_type(mut self, event_type: EventType) -> Self {
        self.event_type = event_type;
        self
    }

    pub fn at(mut self, timestamp: SystemTime) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn ago(mut self, age: Duration) -> Self {
        self.timestamp = SystemTime::now() - age;
        self
    }

    pub fn with_error(mut self, code: i32) -> Self {
        self.error = code;
        self
    }

    pub fn details(mut self, details: &str) -> Self {
        self.details = details.to_string();
        self
    }

    pub fn build(self) -> Event {
        let mut event = Event::new(self.event_type, self.timestamp);
        event.trace_id = self.trace_id;
        event.span_id = self.span_id;
        event.parent_span_id = self.parent_span_id;
        event.error = self.error;
        event.details = self.details;
        event
    }
}

/// Enrichment context for a service, optionally namespaced.
pub fn service(name: &str) -> EnrichmentContext {
    EnrichmentContext::for_service(name)
}

/// Feeds a root span owned by `root_service` plus one child per entry of
/// `children`, with the child's duration in milliseconds.
pub fn create_call_tree(tracker: &TraceTracker, trace_id: &str, root_service: &str, children: &[(&str, u64)]) {
    let base = SystemTime::now() - Duration::from_secs(1);
    tracker.process_event(
        &TestEventBuilder::new(trace_id, "root").at(base).build(),
        Some(&service(root_service)),
    );

    for (i, (child_service, duration_ms)) in children.iter().enumerate() {
        let span_id = format!("child-{i}");
        let ctx = service(child_service);
        let start = base + Duration::from_millis(1);
        tracker.process_event(
            &TestEventBuilder::new(trace_id, &span_id).parent("root").at(start).build(),
            Some(&ctx),
        );
        tracker.process_event(
            &TestEventBuilder::new(trace_id, &span_id)
                .parent("root")
                .event_type(EventType::HttpResponse)
                .at(start + Duration::from_millis(*duration_ms))
                .build(),
            Some(&ctx),
        );
    }
}

/// Macro for creating a test event quickly.
#[macro_export]
macro_rules! test_event {
    ($trace:expr, $span:expr) => {
        TestEventBuilder::new($trace, $span).build()
    };
    ($trace:expr, $span:expr, parent: $parent:expr) => {
        TestEventBuilder::new($trace, $span).parent($parent).build()
    };
    ($trace:expr, $span:expr, error) => {
        TestEventBuilder::new($trace, $span).with_error(-1).build()
    };
}

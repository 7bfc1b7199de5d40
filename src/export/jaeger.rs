//! Jaeger JSON exporter.

use super::{HttpTransport, TraceExporter};
use crate::core::config::JaegerConfig;
use crate::core::otel_compliance::system_time_to_micros;
use crate::core::Result;
use crate::service_map::UNKNOWN_SERVICE;
use crate::tracker::{Span, TraceSnapshot};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;

/// Posts `{"data": [trace, ...]}` in the Jaeger JSON model to the configured endpoint.
#[derive(Debug)]
pub struct JaegerExporter {
    endpoint: String,
    sample_rate: f64,
    transport: HttpTransport,
}

impl JaegerExporter {
    pub fn new(config: &JaegerConfig, timeout: Duration) -> Result<Self> {
        Ok(Self {
            endpoint: config.endpoint.clone(),
            sample_rate: config.sample_rate,
            transport: HttpTransport::new("jaeger", timeout)?,
        })
    }
}

#[async_trait]
impl TraceExporter for JaegerExporter {
    fn name(&self) -> &str {
        "jaeger"
    }

    fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    async fn export_traces(&self, traces: &[TraceSnapshot]) -> Result<()> {
        if traces.is_empty() || self.transport.is_closed() {
            return Ok(());
        }

        let data: Vec<Value> = traces
            .iter()
            .filter_map(|trace| match serde_json::to_value(convert_to_jaeger(trace)) {
                Ok(value) => Some(value),
                Err(e) => {
                    tracing::warn!(trace_id = %trace.trace_id, "skipping unencodable trace: {}", e);
                    None
                }
            })
            .collect();
        if data.is_empty() {
            return Ok(());
        }

        let count = data.len();
        let request = self
            .transport
            .client()
            .post(&self.endpoint)
            .json(&serde_json::json!({ "data": data }));
        self.transport.send(request).await?;

        tracing::debug!(backend = "jaeger", traces = count, "exported traces");
        Ok(())
    }

    async fn shutdown(&self, timeout: Duration) -> Result<()> {
        self.transport.shutdown(timeout).await
    }
}

#[derive(Debug, Serialize)]
struct JaegerTrace {
    #[serde(rename = "traceID")]
    trace_id: String,
    spans: Vec<JaegerSpan>,
    processes: BTreeMap<String, JaegerProcess>,
}

#[derive(Debug, Serialize)]
struct JaegerSpan {
    #[serde(rename = "traceID")]
    trace_id: String,
    #[serde(rename = "spanID")]
    span_id: String,
    #[serde(rename = "operationName")]
    operation_name: String,
    references: Vec<JaegerReference>,
    /// Microseconds since the epoch
    #[serde(rename = "startTime")]
    start_time: u64,
    /// Microseconds
    duration: u64,
    tags: Vec<JaegerTag>,
    logs: Vec<JaegerLog>,
    #[serde(rename = "processID")]
    process_id: String,
}

#[derive(Debug, Serialize)]
struct JaegerProcess {
    #[serde(rename = "serviceName")]
    service_name: String,
    tags: Vec<JaegerTag>,
}

#[derive(Debug, Serialize)]
struct JaegerReference {
    #[serde(rename = "refType")]
    ref_type: &'static str,
    #[serde(rename = "traceID")]
    trace_id: String,
    #[serde(rename = "spanID")]
    span_id: String,
}

#[derive(Debug, Serialize)]
struct JaegerTag {
    key: String,
    #[serde(rename = "type")]
    tag_type: &'static str,
    value: Value,
}

#[derive(Debug, Serialize)]
struct JaegerLog {
    timestamp: u64,
    fields: Vec<JaegerTag>,
}

impl JaegerTag {
    fn string(key: &str, value: &str) -> Self {
        Self {
            key: key.to_string(),
            tag_type: "string",
            value: Value::String(value.to_string()),
        }
    }
}

fn convert_to_jaeger(trace: &TraceSnapshot) -> JaegerTrace {
    let mut processes = BTreeMap::new();
    let spans = trace
        .spans
        .iter()
        .map(|span| {
            let service = if span.service.is_empty() {
                UNKNOWN_SERVICE
            } else {
                span.service.as_str()
            };
            processes
                .entry(service.to_string())
                .or_insert_with(|| JaegerProcess {
                    service_name: service.to_string(),
                    tags: vec![],
                });
            convert_span(span, service)
        })
        .collect();

    JaegerTrace {
        trace_id: trace.trace_id.clone(),
        spans,
        processes,
    }
}

fn convert_span(span: &Span, process_id: &str) -> JaegerSpan {
    let mut attrs: Vec<(&String, &String)> = span.attributes.iter().collect();
    attrs.sort_unstable();
    let mut tags: Vec<JaegerTag> = attrs
        .into_iter()
        .map(|(key, value)| JaegerTag::string(key, value))
        .collect();
    if span.error {
        tags.push(JaegerTag {
            key: "error".to_string(),
            tag_type: "bool",
            value: Value::Bool(true),
        });
    }

    let references = span
        .parent_span_id
        .iter()
        .map(|parent| JaegerReference {
            ref_type: "CHILD_OF",
            trace_id: span.trace_id.clone(),
            span_id: parent.clone(),
        })
        .collect();

    let logs = span
        .events
        .iter()
        .map(|event| JaegerLog {
            timestamp: system_time_to_micros(event.timestamp),
            fields: vec![
                JaegerTag::string("event", event.event_type.operation_name()),
                JaegerTag {
                    key: "error.code".to_string(),
                    tag_type: "int64",
                    value: Value::from(event.error),
                },
            ],
        })
        .collect();

    JaegerSpan {
        trace_id: span.trace_id.clone(),
        span_id: span.span_id.clone(),
        operation_name: span.operation.clone(),
        references,
        start_time: system_time_to_micros(span.start_time),
        duration: span.duration.as_micros() as u64,
        tags,
        logs,
        process_id: process_id.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{EnrichmentContext, Event, EventType};
    use crate::tracker::TraceTracker;
    use std::time::SystemTime;

    #[test]
    fn test_convert_links_parent_and_process() {
        let tracker = TraceTracker::new();
        let base = SystemTime::now();

        let mut root = Event::new(EventType::HttpRequest, base);
        root.trace_id = "t1".to_string();
        root.span_id = "s1".to_string();
        tracker.process_event(&root, Some(&EnrichmentContext::for_service("web")));

        let mut child = Event::new(EventType::TcpConnect, base + Duration::from_millis(3));
        child.trace_id = "t1".to_string();
        child.span_id = "s2".to_string();
        child.parent_span_id = "s1".to_string();
        child.error = -111;
        tracker.process_event(&child, Some(&EnrichmentContext::for_service("db")));

        let trace = tracker.get_trace("t1").unwrap().snapshot();
        let value = serde_json::to_value(convert_to_jaeger(&trace)).unwrap();

        assert_eq!(value["traceID"], "t1");
        assert_eq!(value["processes"]["web"]["serviceName"], "web");
        assert_eq!(value["processes"]["db"]["serviceName"], "db");

        let spans = value["spans"].as_array().unwrap();
        assert_eq!(spans.len(), 2);
        assert!(spans[0]["references"].as_array().unwrap().is_empty());
        assert_eq!(spans[1]["references"][0]["refType"], "CHILD_OF");
        assert_eq!(spans[1]["references"][0]["spanID"], "s1");
        assert_eq!(spans[1]["processID"], "db");
        assert!(spans[1]["tags"]
            .as_array()
            .unwrap()
            .iter()
            .any(|t| t["key"] == "error" && t["value"] == true));
        assert_eq!(spans[1]["logs"][0]["fields"][1]["value"], -111);
    }
}

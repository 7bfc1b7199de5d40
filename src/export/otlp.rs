//! OTLP/HTTP JSON exporter.

use super::{join_url, HttpTransport, TraceExporter};
use crate::core::config::OtlpConfig;
use crate::core::otel_compliance::{attributes, system_time_to_nanos};
use crate::core::Result;
use crate::service_map::UNKNOWN_SERVICE;
use crate::tracker::{Span, TraceSnapshot};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

const TRACES_PATH: &str = "v1/traces";
const SPAN_KIND_INTERNAL: u8 = 1;
const STATUS_CODE_OK: u8 = 1;
const STATUS_CODE_ERROR: u8 = 2;

/// Posts `resourceSpans` documents to `{endpoint}/v1/traces`.
#[derive(Debug)]
pub struct OtlpExporter {
    url: String,
    headers: BTreeMap<String, String>,
    sample_rate: f64,
    transport: HttpTransport,
}

impl OtlpExporter {
    pub fn new(config: &OtlpConfig, timeout: Duration) -> Result<Self> {
        Ok(Self {
            url: join_url(&config.endpoint, TRACES_PATH),
            headers: config.headers.clone(),
            sample_rate: config.sample_rate,
            transport: HttpTransport::new("otlp", timeout)?,
        })
    }
}

#[async_trait]
impl TraceExporter for OtlpExporter {
    fn name(&self) -> &str {
        "otlp"
    }

    fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    async fn export_traces(&self, traces: &[TraceSnapshot]) -> Result<()> {
        if traces.is_empty() || self.transport.is_closed() {
            return Ok(());
        }

        let body = convert_to_otlp(traces);
        let mut request = self.transport.client().post(&self.url).json(&body);
        for (key, value) in &self.headers {
            request = request.header(key, value);
        }
        self.transport.send(request).await?;

        tracing::debug!(backend = "otlp", traces = traces.len(), "exported traces");
        Ok(())
    }

    async fn shutdown(&self, timeout: Duration) -> Result<()> {
        self.transport.shutdown(timeout).await
    }
}

/// Groups spans by service into one `resourceSpans` entry per service.
fn convert_to_otlp(traces: &[TraceSnapshot]) -> Value {
    let mut by_service: BTreeMap<&str, Vec<&Span>> = BTreeMap::new();
    for trace in traces {
        for span in &trace.spans {
            let service = if span.service.is_empty() {
                UNKNOWN_SERVICE
            } else {
                span.service.as_str()
            };
            by_service.entry(service).or_default().push(span);
        }
    }

    let resource_spans: Vec<Value> = by_service
        .into_iter()
        .map(|(service, spans)| {
            let otel_spans: Vec<Value> = spans.into_iter().map(convert_span).collect();
            json!({
                "resource": {
                    "attributes": [string_attribute(attributes::SERVICE_NAME, service)]
                },
                "scopeSpans": [
                    {
                        "scope": { "name": "spanweave" },
                        "spans": otel_spans
                    }
                ]
            })
        })
        .collect();

    json!({ "resourceSpans": resource_spans })
}

fn convert_span(span: &Span) -> Value {
    let start = system_time_to_nanos(span.start_time);
    let end = system_time_to_nanos(span.start_time + span.duration);
    let attributes: Vec<Value> = sorted(&span.attributes)
        .into_iter()
        .map(|(key, value)| string_attribute(key, value))
        .collect();
    let events: Vec<Value> = span
        .events
        .iter()
        .map(|event| {
            json!({
                "name": event.event_type.operation_name(),
                "timeUnixNano": system_time_to_nanos(event.timestamp).to_string(),
                "attributes": [string_attribute("event.error", &event.error.to_string())]
            })
        })
        .collect();

    json!({
        "traceId": span.trace_id,
        "spanId": span.span_id,
        "parentSpanId": span.parent_span_id.as_deref().unwrap_or_default(),
        "name": span.operation,
        "kind": SPAN_KIND_INTERNAL,
        "startTimeUnixNano": start.to_string(),
        "endTimeUnixNano": end.to_string(),
        "attributes": attributes,
        "events": events,
        "status": {
            "code": if span.error { STATUS_CODE_ERROR } else { STATUS_CODE_OK }
        }
    })
}

fn string_attribute(key: &str, value: &str) -> Value {
    json!({ "key": key, "value": { "stringValue": value } })
}

fn sorted(map: &HashMap<String, String>) -> Vec<(&str, &str)> {
    let mut pairs: Vec<(&str, &str)> = map.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
    pairs.sort_unstable();
    pairs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{EnrichmentContext, Event, EventType};
    use crate::tracker::TraceTracker;
    use std::time::SystemTime;

    #[test]
    fn test_convert_groups_by_service() {
        let tracker = TraceTracker::new();
        let now = SystemTime::now();
        for (span, service) in [("s1", Some("web")), ("s2", Some("db")), ("s3", None)] {
            let mut event = Event::new(EventType::HttpRequest, now);
            event.trace_id = "t1".to_string();
            event.span_id = span.to_string();
            let ctx = service.map(EnrichmentContext::for_service);
            tracker.process_event(&event, ctx.as_ref());
        }

        let body = convert_to_otlp(&tracker.snapshot_all());
        let resources = body["resourceSpans"].as_array().unwrap();
        assert_eq!(resources.len(), 3);
        let names: Vec<&str> = resources
            .iter()
            .map(|r| r["resource"]["attributes"][0]["value"]["stringValue"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["db", UNKNOWN_SERVICE, "web"]);

        let span = &resources[0]["scopeSpans"][0]["spans"][0];
        assert_eq!(span["traceId"], "t1");
        assert_eq!(span["name"], "http.request");
        assert_eq!(span["parentSpanId"], "");
        assert_eq!(span["events"].as_array().unwrap().len(), 1);
    }
}

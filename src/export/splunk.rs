//! Splunk HTTP Event Collector exporter.
//!
//! Each span becomes one HEC event; events are sent newline-delimited in a
//! single request per batch. The HEC token is optional.

use super::{join_url, HttpTransport, TraceExporter};
use crate::core::config::SplunkConfig;
use crate::core::Result;
use crate::tracker::{Span, TraceSnapshot};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::{Duration, UNIX_EPOCH};

const EVENT_PATH: &str = "services/collector/event";
const SOURCETYPE: &str = "spanweave:span";

#[derive(Debug)]
pub struct SplunkExporter {
    url: String,
    authorization: Option<String>,
    sample_rate: f64,
    transport: HttpTransport,
}

impl SplunkExporter {
    pub fn new(config: &SplunkConfig, timeout: Duration) -> Result<Self> {
        Ok(Self {
            url: join_url(&config.endpoint, EVENT_PATH),
            authorization: config.token.as_ref().map(|token| format!("Splunk {token}")),
            sample_rate: config.sample_rate,
            transport: HttpTransport::new("splunk", timeout)?,
        })
    }
}

#[async_trait]
impl TraceExporter for SplunkExporter {
    fn name(&self) -> &str {
        "splunk"
    }

    fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    async fn export_traces(&self, traces: &[TraceSnapshot]) -> Result<()> {
        if traces.is_empty() || self.transport.is_closed() {
            return Ok(());
        }

        let mut body = String::new();
        let mut events = 0usize;
        for trace in traces {
            match encode_trace(trace) {
                Ok(lines) => {
                    for line in lines {
                        body.push_str(&line);
                        body.push('\n');
                        events += 1;
                    }
                }
                Err(e) => {
                    tracing::warn!(trace_id = %trace.trace_id, "skipping unencodable trace: {}", e);
                }
            }
        }
        if events == 0 {
            return Ok(());
        }

        let mut request = self
            .transport
            .client()
            .post(&self.url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body);
        if let Some(authorization) = &self.authorization {
            request = request.header(reqwest::header::AUTHORIZATION, authorization);
        }
        self.transport.send(request).await?;

        tracing::debug!(backend = "splunk", traces = traces.len(), events, "exported traces");
        Ok(())
    }

    async fn shutdown(&self, timeout: Duration) -> Result<()> {
        self.transport.shutdown(timeout).await
    }
}

/// One serialized HEC event per span of the trace.
fn encode_trace(trace: &TraceSnapshot) -> serde_json::Result<Vec<String>> {
    trace
        .spans
        .iter()
        .map(|span| serde_json::to_string(&hec_event(span)))
        .collect()
}

fn hec_event(span: &Span) -> Value {
    let time = span
        .start_time
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64();
    json!({
        "time": time,
        "sourcetype": SOURCETYPE,
        "event": {
            "trace_id": span.trace_id,
            "span_id": span.span_id,
            "parent_span_id": span.parent_span_id,
            "service": span.service,
            "operation": span.operation,
            "duration_us": span.duration.as_micros() as u64,
            "error": span.error,
            "event_count": span.events.len(),
            "attributes": span.attributes,
        }
    })
}

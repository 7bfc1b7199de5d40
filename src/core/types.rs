use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::SystemTime;

/// Kind of captured event; determines the operation name of the span it seeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// Process started executing a new image
    ProcessExec,
    /// Process exited
    ProcessExit,
    /// Outbound TCP connection
    TcpConnect,
    /// Inbound TCP connection accepted
    TcpAccept,
    /// TCP connection closed
    TcpClose,
    /// DNS query issued
    DnsQuery,
    /// HTTP request observed on the wire
    HttpRequest,
    /// HTTP response observed on the wire
    HttpResponse,
    /// File opened
    FileOpen,
    /// Anything the capture layer could not classify
    #[default]
    Unknown,
}

impl EventType {
    /// Returns the operation name used for spans seeded by this event type
    pub fn operation_name(&self) -> &'static str {
        match self {
            EventType::ProcessExec => "process.exec",
            EventType::ProcessExit => "process.exit",
            EventType::TcpConnect => "tcp.connect",
            EventType::TcpAccept => "tcp.accept",
            EventType::TcpClose => "tcp.close",
            EventType::DnsQuery => "dns.query",
            EventType::HttpRequest => "http.request",
            EventType::HttpResponse => "http.response",
            EventType::FileOpen => "file.open",
            EventType::Unknown => "unknown",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.operation_name())
    }
}

/// A single timestamped event captured from a running workload.
///
/// Trace identifiers are plain strings; an empty string means "absent".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Trace this event belongs to
    #[serde(default)]
    pub trace_id: String,
    /// Span this event belongs to
    #[serde(default)]
    pub span_id: String,
    /// Parent of `span_id`, empty for a root span
    #[serde(default)]
    pub parent_span_id: String,
    /// W3C trace flags rendered as two hex digits, empty if unknown
    #[serde(default)]
    pub trace_flags: String,
    /// Opaque vendor trace state
    #[serde(default)]
    pub trace_state: String,
    /// Capture time
    #[serde(with = "humantime_serde")]
    pub timestamp: SystemTime,
    /// Event kind
    #[serde(rename = "type", default)]
    pub event_type: EventType,
    /// Error code, zero for success
    #[serde(default)]
    pub error: i32,
    /// Target of the operation (address, path, host)
    #[serde(default)]
    pub target: String,
    /// Free-form details; may carry a raw CRLF header blob
    #[serde(default)]
    pub details: String,
    /// Name of the process that produced the event
    #[serde(default)]
    pub process_name: String,
    /// PID of the process that produced the event
    #[serde(default)]
    pub pid: u32,
}

impl Event {
    /// Creates an event of the given type at the given instant with no trace identity
    pub fn new(event_type: EventType, timestamp: SystemTime) -> Self {
        Self {
            trace_id: String::new(),
            span_id: String::new(),
            parent_span_id: String::new(),
            trace_flags: String::new(),
            trace_state: String::new(),
            timestamp,
            event_type,
            error: 0,
            target: String::new(),
            details: String::new(),
            process_name: String::new(),
            pid: 0,
        }
    }

    /// Returns true if the event carries a trace id
    pub fn has_trace(&self) -> bool {
        !self.trace_id.is_empty()
    }

    /// Returns true if the event reports an error
    pub fn is_error(&self) -> bool {
        self.error != 0
    }

    /// Returns true if `details` looks like a raw HTTP header blob
    pub fn has_raw_headers(&self) -> bool {
        self.details.contains("\r\n") && self.details.contains(':')
    }
}

/// Workload identity attached to an event by the enrichment layer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnrichmentContext {
    /// Logical service name
    pub service_name: String,
    /// Kubernetes namespace
    pub namespace: String,
    /// Pod name
    pub pod_name: String,
    /// Pod or service labels
    pub labels: BTreeMap<String, String>,
}

impl EnrichmentContext {
    /// Creates a context for the given service with no namespace or pod
    pub fn for_service<S: Into<String>>(service_name: S) -> Self {
        Self {
            service_name: service_name.into(),
            ..Self::default()
        }
    }

    /// Sets the namespace
    pub fn with_namespace<S: Into<String>>(mut self, namespace: S) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Sets the pod name
    pub fn with_pod<S: Into<String>>(mut self, pod_name: S) -> Self {
        self.pod_name = pod_name.into();
        self
    }

    /// Returns true if the context identifies a service
    pub fn has_service(&self) -> bool {
        !self.service_name.is_empty()
    }

    /// Namespace-qualified key under which the service is recorded in a trace
    pub fn service_key(&self) -> String {
        service_key(&self.namespace, &self.service_name)
    }
}

/// Service identity recorded on a trace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceInfo {
    /// Service name
    pub name: String,
    /// Namespace, empty if unknown
    pub namespace: String,
    /// First pod seen for this service in the trace
    pub pod: String,
    /// Labels from the enrichment layer
    pub labels: BTreeMap<String, String>,
}

impl From<&EnrichmentContext> for ServiceInfo {
    fn from(ctx: &EnrichmentContext) -> Self {
        Self {
            name: ctx.service_name.clone(),
            namespace: ctx.namespace.clone(),
            pod: ctx.pod_name.clone(),
            labels: ctx.labels.clone(),
        }
    }
}

/// Builds the `namespace/service` key, or just `service` without a namespace.
pub fn service_key(namespace: &str, service: &str) -> String {
    if namespace.is_empty() {
        service.to_string()
    } else {
        format!("{namespace}/{service}")
    }
}

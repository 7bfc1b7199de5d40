//! Service dependency mapping.
//!
//! A [`RequestFlowGraph`] is rebuilt from a full scan of traces on every
//! request: one node per service, one directed edge per parent→child service
//! pair, each carrying request/error counts and edges a running mean latency.

use crate::tracker::{Span, Trace, TraceSnapshot};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;

/// Node id used for spans that never received a service identity.
pub const UNKNOWN_SERVICE: &str = "unknown";

/// Service node in the dependency graph.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphNode {
    /// Namespace-qualified service key, or [`UNKNOWN_SERVICE`]
    pub id: String,
    pub service: String,
    pub namespace: String,
    /// First pod seen for the service
    pub pod: String,
    pub request_count: u64,
    pub error_count: u64,
}

/// Directed parent→child service dependency.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphEdge {
    pub source: String,
    pub target: String,
    pub request_count: u64,
    pub error_count: u64,
    /// Running mean of child span durations, in microseconds
    pub avg_latency_us: f64,
}

impl GraphEdge {
    fn new(source: &str, target: &str) -> Self {
        Self {
            source: source.to_string(),
            target: target.to_string(),
            request_count: 0,
            error_count: 0,
            avg_latency_us: 0.0,
        }
    }

    /// Folds one call in; the mean is updated incrementally (`m += (x - m) / n`).
    fn record(&mut self, latency: Duration, is_error: bool) {
        self.request_count += 1;
        if is_error {
            self.error_count += 1;
        }
        let sample = latency.as_secs_f64() * 1_000_000.0;
        self.avg_latency_us += (sample - self.avg_latency_us) / self.request_count as f64;
    }

    pub fn avg_latency(&self) -> Duration {
        Duration::from_secs_f64(self.avg_latency_us.max(0.0) / 1_000_000.0)
    }
}

/// Edge map key: `"<source>-><target>"`.
pub fn edge_key(source: &str, target: &str) -> String {
    format!("{source}->{target}")
}

/// Aggregate service dependency graph.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RequestFlowGraph {
    pub nodes: BTreeMap<String, GraphNode>,
    pub edges: BTreeMap<String, GraphEdge>,
    pub trace_count: usize,
}

impl RequestFlowGraph {
    /// Builds the graph from live traces, snapshotting each one.
    pub fn build_from_traces(traces: &[Arc<Trace>]) -> Self {
        let snapshots: Vec<TraceSnapshot> = traces.iter().map(|t| t.snapshot()).collect();
        Self::build_from_snapshots(&snapshots)
    }

    pub fn build_from_snapshots(traces: &[TraceSnapshot]) -> Self {
        let mut graph = Self::default();
        for trace in traces {
            graph.add_trace(trace);
        }
        graph
    }

    fn add_trace(&mut self, trace: &TraceSnapshot) {
        self.trace_count += 1;
        let by_id: HashMap<&str, &Span> = trace.spans.iter().map(|s| (s.span_id.as_str(), s)).collect();

        for span in &trace.spans {
            let node_id = self.ensure_node(span, trace);
            if let Some(node) = self.nodes.get_mut(&node_id) {
                node.request_count += 1;
                if span.error {
                    node.error_count += 1;
                }
            }

            let Some(parent) = span
                .parent_span_id
                .as_deref()
                .and_then(|parent_id| by_id.get(parent_id))
            else {
                continue;
            };
            let parent_id = self.ensure_node(parent, trace);
            if parent_id == node_id {
                continue;
            }
            self.edges
                .entry(edge_key(&parent_id, &node_id))
                .or_insert_with(|| GraphEdge::new(&parent_id, &node_id))
                .record(span.duration, span.error);
        }
    }

    /// Resolves a span to its node id, creating the node on first sight.
    fn ensure_node(&mut self, span: &Span, trace: &TraceSnapshot) -> String {
        let Some(key) = span.service_key() else {
            self.nodes
                .entry(UNKNOWN_SERVICE.to_string())
                .or_insert_with(|| GraphNode {
                    id: UNKNOWN_SERVICE.to_string(),
                    service: UNKNOWN_SERVICE.to_string(),
                    namespace: String::new(),
                    pod: String::new(),
                    request_count: 0,
                    error_count: 0,
                });
            return UNKNOWN_SERVICE.to_string();
        };

        let node = self.nodes.entry(key.clone()).or_insert_with(|| GraphNode {
            id: key.clone(),
            service: span.service.clone(),
            namespace: String::new(),
            pod: String::new(),
            request_count: 0,
            error_count: 0,
        });
        if let Some(info) = trace.services.get(&key) {
            if node.namespace.is_empty() {
                node.namespace = info.namespace.clone();
            }
            if node.pod.is_empty() {
                node.pod = info.pod.clone();
            }
        }
        key
    }

    pub fn node(&self, id: &str) -> Option<&GraphNode> {
        self.nodes.get(id)
    }

    pub fn edge(&self, source: &str, target: &str) -> Option<&GraphEdge> {
        self.edges.get(&edge_key(source, target))
    }

    /// Nodes with no incoming edge.
    pub fn root_nodes(&self) -> Vec<&GraphNode> {
        let targets: HashSet<&str> = self.edges.values().map(|e| e.target.as_str()).collect();
        self.nodes
            .values()
            .filter(|n| !targets.contains(n.id.as_str()))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Renders the graph in Graphviz DOT.
    pub fn to_dot(&self) -> String {
        let mut out = String::from("digraph request_flow {\n");
        out.push_str("  rankdir=LR;\n");
        out.push_str("  node [shape=box];\n");

        for node in self.nodes.values() {
            let mut label = node.id.clone();
            if !node.pod.is_empty() {
                let _ = write!(label, "\npod: {}", node.pod);
            }
            let _ = write!(label, "\nrequests: {} errors: {}", node.request_count, node.error_count);
            let color = if node.error_count > 0 { "red" } else { "black" };
            let _ = writeln!(
                out,
                "  \"{}\" [label=\"{}\", color={}];",
                escape_dot(&node.id),
                escape_dot(&label),
                color
            );
        }

        for edge in self.edges.values() {
            let label = format!(
                "requests: {} errors: {} avg: {:.2}ms",
                edge.request_count,
                edge.error_count,
                edge.avg_latency_us / 1000.0
            );
            let _ = writeln!(
                out,
                "  \"{}\" -> \"{}\" [label=\"{}\"];",
                escape_dot(&edge.source),
                escape_dot(&edge.target),
                escape_dot(&label)
            );
        }

        out.push_str("}\n");
        out
    }
}

/// Escapes a DOT double-quoted string; newlines become `\n` escapes.
fn escape_dot(s: &str) -> String {
    let mut escaped = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '"' => escaped.push_str("\\\""),
            '\\' => escaped.push_str("\\\\"),
            '\n' => escaped.push_str("\\n"),
            '\r' => {},
            c => escaped.push(c),
        }
    }
    escaped
}

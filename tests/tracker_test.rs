//! Trace tracker and dependency graph integration tests.

use pretty_assertions::assert_eq;
use spanweave::service_map::{edge_key, RequestFlowGraph, UNKNOWN_SERVICE};
use spanweave::tracker::TraceTracker;
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

mod common;
use common::*;

#[test]
fn test_scenario_single_root_event() {
    let tracker = TraceTracker::new();
    tracker.process_event(&test_event!("t1", "s1"), None);

    assert_eq!(tracker.get_trace_count(), 1);
    let trace = tracker.get_trace("t1").unwrap();
    assert_eq!(trace.span_count(), 1);
    assert!(trace.span("s1").unwrap().is_root());
}

#[test]
fn test_scenario_parent_child_across_services() {
    let tracker = TraceTracker::new();
    tracker.process_event(&test_event!("t1", "s1"), Some(&service("frontend")));
    tracker.process_event(&test_event!("t1", "s2", parent: "s1"), Some(&service("backend")));

    let graph = RequestFlowGraph::build_from_traces(&tracker.get_all_traces());
    assert_eq!(graph.nodes.len(), 2);
    assert_eq!(graph.edges.len(), 1);

    let edge = graph.edge("frontend", "backend").unwrap();
    assert_eq!(edge.request_count, 1);
    assert_eq!(edge.error_count, 0);
    assert!(graph.edges.contains_key(&edge_key("frontend", "backend")));
}

#[test]
fn test_scenario_cleanup_by_retention() {
    let tracker = TraceTracker::new();
    tracker.process_event(
        &TestEventBuilder::new("stale", "s1").ago(Duration::from_secs(15 * 60)).build(),
        None,
    );

    assert_eq!(tracker.cleanup_old_traces(Duration::from_secs(20 * 60)), 0);
    assert_eq!(tracker.get_trace_count(), 1);
    assert_eq!(tracker.cleanup_old_traces(Duration::from_secs(10 * 60)), 1);
    assert_eq!(tracker.get_trace_count(), 0);
}

#[test]
fn test_span_counts_match_distinct_ids() {
    let tracker = TraceTracker::new();
    for i in 0..25 {
        tracker.process_event(&test_event!("t1", &format!("s{i}")), None);
    }
    for _ in 0..4 {
        tracker.process_event(&test_event!("t1", "s0"), None);
    }

    let trace = tracker.get_trace("t1").unwrap();
    assert_eq!(trace.span_count(), 25);
    assert_eq!(trace.span("s0").unwrap().events.len(), 5);
    assert_eq!(tracker.stats().events_processed, 29);
}

#[test]
fn test_concurrent_first_events_converge_on_one_trace() {
    let tracker = Arc::new(TraceTracker::new());
    let threads = 8;
    let per_thread = 50;
    let barrier = Arc::new(Barrier::new(threads));

    let handles: Vec<_> = (0..threads)
        .map(|t| {
            let tracker = Arc::clone(&tracker);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                for i in 0..per_thread {
                    let event = TestEventBuilder::new(&format!("trace-{}", i % 5), &format!("span-{t}-{i}")).build();
                    tracker.process_event(&event, None);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(tracker.get_trace_count(), 5);
    let total_spans: usize = tracker.get_all_traces().iter().map(|t| t.span_count()).sum();
    assert_eq!(total_spans, threads * per_thread);
}

#[test]
fn test_graph_error_counts_and_mean_latency() {
    let tracker = TraceTracker::new();
    create_call_tree(&tracker, "t1", "gateway", &[("users", 10), ("users", 30)]);
    create_call_tree(&tracker, "t2", "gateway", &[("users", 20)]);
    tracker.process_event(
        &TestEventBuilder::new("t2", "child-0").parent("root").with_error(-5).build(),
        Some(&service("users")),
    );

    let graph = RequestFlowGraph::build_from_traces(&tracker.get_all_traces());
    let edge = graph.edge("gateway", "users").unwrap();
    assert_eq!(edge.request_count, 3);
    assert_eq!(edge.error_count, 1);

    let users = graph.node("users").unwrap();
    assert_eq!(users.request_count, 3);
    assert_eq!(users.error_count, 1);
    assert_eq!(graph.root_nodes().len(), 1);
    assert_eq!(graph.trace_count, 2);
}

#[test]
fn test_unenriched_spans_land_on_unknown_node() {
    let tracker = TraceTracker::new();
    tracker.process_event(&test_event!("t1", "s1"), Some(&service("web")));
    tracker.process_event(&test_event!("t1", "s2", parent: "s1"), None);

    let graph = RequestFlowGraph::build_from_traces(&tracker.get_all_traces());
    assert!(graph.node(UNKNOWN_SERVICE).is_some());
    assert!(graph.edge("web", UNKNOWN_SERVICE).is_some());
}

#[test]
fn test_dot_output_lists_every_node_and_edge_once() {
    let tracker = TraceTracker::new();
    create_call_tree(&tracker, "t1", "gateway", &[("users", 10), ("orders", 5)]);

    let dot = RequestFlowGraph::build_from_traces(&tracker.get_all_traces()).to_dot();
    assert!(dot.starts_with("digraph"));
    assert!(dot.trim_end().ends_with('}'));
    for id in ["gateway", "users", "orders"] {
        let declaration = format!("\"{id}\" [label=\"{id}");
        assert_eq!(dot.matches(&declaration).count(), 1, "{id}");
    }
    assert_eq!(dot.matches("\"gateway\" -> \"users\"").count(), 1);
    assert_eq!(dot.matches("\"gateway\" -> \"orders\"").count(), 1);
}

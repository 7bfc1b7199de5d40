//! Ingestion and graph rebuild benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use spanweave::core::{EnrichmentContext, Event, EventType};
use spanweave::service_map::RequestFlowGraph;
use spanweave::tracker::TraceTracker;
use std::time::{Duration, SystemTime};

const SERVICES: [&str; 5] = ["frontend", "api-gateway", "auth-service", "database", "cache"];

// Ten spans per trace, each span parented on the previous one.
fn generate_events(count: usize) -> Vec<(Event, EnrichmentContext)> {
    let base = SystemTime::now();
    (0..count)
        .map(|i| {
            let mut event = Event::new(EventType::HttpRequest, base + Duration::from_micros(i as u64));
            event.trace_id = format!("{:032x}", i / 10);
            event.span_id = format!("{:016x}", i);
            if i % 10 != 0 {
                event.parent_span_id = format!("{:016x}", i - 1);
            }
            if i % 100 == 0 {
                event.error = -1;
            }
            (event, EnrichmentContext::for_service(SERVICES[i % SERVICES.len()]))
        })
        .collect()
}

fn bench_process_event(c: &mut Criterion) {
    let mut group = c.benchmark_group("process_event");

    for size in [1_000, 10_000, 100_000] {
        let events = generate_events(size);
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &events, |b, events| {
            b.iter(|| {
                let tracker = TraceTracker::new();
                for (event, ctx) in events {
                    tracker.process_event(black_box(event), Some(ctx));
                }
                black_box(tracker.get_trace_count())
            });
        });
    }
    group.finish();
}

fn bench_graph_rebuild(c: &mut Criterion) {
    let mut group = c.benchmark_group("graph_rebuild");

    for size in [1_000, 10_000] {
        let tracker = TraceTracker::new();
        for (event, ctx) in generate_events(size) {
            tracker.process_event(&event, Some(&ctx));
        }
        let traces = tracker.get_all_traces();
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &traces, |b, traces| {
            b.iter(|| black_box(RequestFlowGraph::build_from_traces(traces)));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_process_event, bench_graph_rebuild);
criterion_main!(benches);

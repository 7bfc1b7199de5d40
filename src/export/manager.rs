//! Lifecycle orchestration over the tracker and the configured backends.
//!
//! The manager owns two background tasks once started: an export loop that
//! pushes sampled trace snapshots to every backend on a timer, and a cleanup
//! loop that evicts traces older than the retention window. Both select on
//! their timer and a shared stop signal.

use super::{JaegerExporter, OtlpExporter, SplunkExporter, TraceExporter};
use crate::core::{Config, EnrichmentContext, Event, Result, WeaveError};
use crate::propagation::ContextExtractor;
use crate::sampling;
use crate::service_map::RequestFlowGraph;
use crate::tracker::{TraceSnapshot, TraceTracker};
use futures::future::join_all;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

type Exporters = Arc<[Arc<dyn TraceExporter>]>;

// Stand-in deadline when the caller's would overflow `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365);

/// Where the manager is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagerState {
    /// Feature flag off; every operation is a no-op
    Disabled,
    /// Constructed, loops not running
    Enabled,
    /// Export and cleanup loops running
    Started,
    /// Stop signal issued, final export in progress
    ShuttingDown,
    /// Loops joined and backends closed
    Stopped,
}

/// Owns the tracker, the backend set and the background loops.
pub struct ExportManager {
    config: Config,
    state: Mutex<ManagerState>,
    tracker: Arc<TraceTracker>,
    extractor: ContextExtractor,
    exporters: Exporters,
    stop_tx: watch::Sender<bool>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl fmt::Debug for ExportManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.exporters.iter().map(|e| e.name()).collect();
        f.debug_struct("ExportManager")
            .field("state", &*self.state.lock())
            .field("exporters", &names)
            .field("traces", &self.tracker.get_trace_count())
            .finish()
    }
}

impl ExportManager {
    /// Builds the manager and every backend present in `config.exporters`.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let exporters = if config.tracing.enabled {
            build_exporters(&config)?
        } else {
            Vec::new()
        };
        Self::with_exporters(config, exporters)
    }

    /// Builds the manager around an explicit backend set.
    pub fn with_exporters(config: Config, exporters: Vec<Arc<dyn TraceExporter>>) -> Result<Self> {
        config.validate()?;
        let state = if config.tracing.enabled {
            ManagerState::Enabled
        } else {
            ManagerState::Disabled
        };
        let (stop_tx, _) = watch::channel(false);

        tracing::info!(
            enabled = config.tracing.enabled,
            exporters = exporters.len(),
            "trace export manager created"
        );

        Ok(Self {
            extractor: ContextExtractor::new(config.extraction.clone()),
            config,
            state: Mutex::new(state),
            tracker: Arc::new(TraceTracker::new()),
            exporters: Arc::from(exporters),
            stop_tx,
            workers: Mutex::new(Vec::new()),
        })
    }

    pub fn state(&self) -> ManagerState {
        *self.state.lock()
    }

    pub fn is_enabled(&self) -> bool {
        self.state() != ManagerState::Disabled
    }

    pub fn tracker(&self) -> &TraceTracker {
        &self.tracker
    }

    /// Names of the configured backends.
    pub fn exporter_names(&self) -> Vec<String> {
        self.exporters.iter().map(|e| e.name().to_string()).collect()
    }

    /// Feeds one event into the tracker.
    ///
    /// Raw header blobs in `details` are mined for propagation context first;
    /// a recovered context overwrites the event's correlation fields.
    pub fn process_event(&self, mut event: Event, ctx: Option<&EnrichmentContext>) {
        if !self.is_enabled() {
            return;
        }

        if event.has_raw_headers() {
            if let Some(tc) = self.extractor.extract_from_raw(&event.details) {
                if tc.is_valid() {
                    event.trace_flags = tc.flags_hex();
                    event.trace_id = tc.trace_id;
                    event.span_id = tc.span_id;
                    event.parent_span_id = tc.parent_span_id.unwrap_or_default();
                    event.trace_state = tc.state.unwrap_or_default();
                }
            }
        }

        self.tracker.process_event(&event, ctx);
    }

    /// Spawns the export and cleanup loops. Only the first call from
    /// `Enabled` has an effect.
    pub async fn start(&self) -> Result<()> {
        {
            let mut state = self.state.lock();
            if *state != ManagerState::Enabled {
                tracing::debug!(state = ?*state, "start ignored");
                return Ok(());
            }
            *state = ManagerState::Started;
        }

        let tracing_config = &self.config.tracing;
        let export = tokio::spawn(run_export_loop(
            Arc::clone(&self.tracker),
            Arc::clone(&self.exporters),
            tracing_config.export_interval,
            tracing_config.export_timeout,
            self.stop_tx.subscribe(),
        ));
        let cleanup = tokio::spawn(run_cleanup_loop(
            Arc::clone(&self.tracker),
            tracing_config.cleanup_interval,
            tracing_config.retention,
            self.stop_tx.subscribe(),
        ));
        self.workers.lock().extend([export, cleanup]);

        tracing::info!(
            export_interval = ?tracing_config.export_interval,
            cleanup_interval = ?tracing_config.cleanup_interval,
            "trace export manager started"
        );
        Ok(())
    }

    /// Stops the loops, runs a final export and closes every backend, all
    /// within `deadline`.
    ///
    /// The final export gets at most half of the time left after the loops
    /// are joined; backend shutdown gets the rest. Loops still running at the
    /// deadline are aborted. Every backend is asked to shut down even if
    /// others fail; failures are reported together. Calling this again after
    /// it completed is a no-op.
    pub async fn shutdown(&self, deadline: Duration) -> Result<()> {
        {
            let mut state = self.state.lock();
            match *state {
                ManagerState::Disabled | ManagerState::ShuttingDown | ManagerState::Stopped => {
                    return Ok(());
                }
                ManagerState::Enabled | ManagerState::Started => {
                    *state = ManagerState::ShuttingDown;
                }
            }
        }
        let now = Instant::now();
        let deadline = now.checked_add(deadline).unwrap_or_else(|| now + FAR_FUTURE);
        tracing::info!("shutting down trace export manager");

        self.stop_tx.send_replace(true);
        let workers: Vec<JoinHandle<()>> = self.workers.lock().drain(..).collect();
        for mut worker in workers {
            match tokio::time::timeout_at(deadline, &mut worker).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::warn!("background loop ended abnormally: {}", e),
                Err(_) => {
                    tracing::warn!("background loop still busy at deadline, aborting");
                    worker.abort();
                }
            }
        }

        let tracing_config = &self.config.tracing;
        let final_export = remaining(deadline).div_f64(2.0).min(tracing_config.export_timeout);
        export_cycle(&self.tracker, &self.exporters, final_export).await;

        let close = remaining(deadline).min(tracing_config.shutdown_timeout);
        let failed = shutdown_exporters(&self.exporters, close).await;
        *self.state.lock() = ManagerState::Stopped;

        if failed.is_empty() {
            tracing::info!("trace export manager stopped");
            Ok(())
        } else {
            Err(WeaveError::Shutdown { failed })
        }
    }

    /// Rebuilds the service dependency graph from the current traces.
    pub fn get_request_flow_graph(&self) -> Option<RequestFlowGraph> {
        if !self.is_enabled() {
            return None;
        }
        Some(RequestFlowGraph::build_from_traces(&self.tracker.get_all_traces()))
    }

    pub fn get_trace_count(&self) -> usize {
        if !self.is_enabled() {
            return 0;
        }
        self.tracker.get_trace_count()
    }
}

fn remaining(deadline: Instant) -> Duration {
    deadline.saturating_duration_since(Instant::now())
}

fn build_exporters(config: &Config) -> Result<Vec<Arc<dyn TraceExporter>>> {
    let timeout = config.tracing.export_timeout;
    let mut exporters: Vec<Arc<dyn TraceExporter>> = Vec::new();
    if let Some(otlp) = &config.exporters.otlp {
        exporters.push(Arc::new(OtlpExporter::new(otlp, timeout)?));
    }
    if let Some(jaeger) = &config.exporters.jaeger {
        exporters.push(Arc::new(JaegerExporter::new(jaeger, timeout)?));
    }
    if let Some(splunk) = &config.exporters.splunk {
        exporters.push(Arc::new(SplunkExporter::new(splunk, timeout)?));
    }
    Ok(exporters)
}

async fn run_export_loop(
    tracker: Arc<TraceTracker>,
    exporters: Exporters,
    interval: Duration,
    export_timeout: Duration,
    mut stop: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately.
    ticker.tick().await;

    while !*stop.borrow() {
        tokio::select! {
            _ = ticker.tick() => {
                export_cycle(&tracker, &exporters, export_timeout).await;
            }
            _ = stop.changed() => break,
        }
    }
    tracing::debug!("export loop stopped");
}

async fn run_cleanup_loop(
    tracker: Arc<TraceTracker>,
    interval: Duration,
    retention: Duration,
    mut stop: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await;

    while !*stop.borrow() {
        tokio::select! {
            _ = ticker.tick() => {
                let removed = tracker.cleanup_old_traces(retention);
                if removed > 0 {
                    tracing::info!(removed, "evicted traces past retention");
                }
            }
            _ = stop.changed() => break,
        }
    }
    tracing::debug!("cleanup loop stopped");
}

/// Snapshots the tracker and sends each backend its sampled share.
///
/// Backends run concurrently and independently; a failure or timeout is
/// logged and never affects the others.
async fn export_cycle(tracker: &TraceTracker, exporters: &[Arc<dyn TraceExporter>], timeout: Duration) {
    if exporters.is_empty() {
        return;
    }
    let snapshots = tracker.snapshot_all();
    if snapshots.is_empty() {
        return;
    }

    let exports = exporters.iter().map(|exporter| {
        let batch: Vec<TraceSnapshot> = snapshots
            .iter()
            .filter(|t| sampling::should_sample(&t.trace_id, exporter.sample_rate()))
            .cloned()
            .collect();
        async move {
            if batch.is_empty() {
                return;
            }
            match tokio::time::timeout(timeout, exporter.export_traces(&batch)).await {
                Ok(Ok(())) => {
                    tracing::debug!(backend = %exporter.name(), traces = batch.len(), "export cycle complete");
                }
                Ok(Err(e)) => {
                    tracing::warn!(backend = %exporter.name(), category = e.category(), "export failed: {}", e);
                }
                Err(_) => {
                    tracing::warn!(backend = %exporter.name(), timeout = ?timeout, "export timed out");
                }
            }
        }
    });
    join_all(exports).await;
}

/// Closes every backend, returning the names of those that failed.
async fn shutdown_exporters(exporters: &[Arc<dyn TraceExporter>], timeout: Duration) -> Vec<String> {
    let results = join_all(exporters.iter().map(|exporter| async move {
        let result = match tokio::time::timeout(timeout, exporter.shutdown(timeout)).await {
            Ok(result) => result,
            Err(_) => Err(WeaveError::Timeout {
                timeout_ms: timeout.as_millis() as u64,
            }),
        };
        (exporter.name().to_string(), result)
    }))
    .await;

    results
        .into_iter()
        .filter_map(|(name, result)| match result {
            Ok(()) => None,
            Err(e) => {
                tracing::error!(backend = %name, "backend shutdown failed: {}", e);
                Some(name)
            }
        })
        .collect()
}

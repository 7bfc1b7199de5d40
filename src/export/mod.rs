//! Trace export to external backends.
//!
//! Every backend implements [`TraceExporter`]. The [`ExportManager`] owns the
//! configured set and drives them from its background export loop; backends
//! are never called on the ingestion path.

pub mod jaeger;
pub mod manager;
pub mod otlp;
pub mod splunk;

pub use jaeger::JaegerExporter;
pub use manager::{ExportManager, ManagerState};
pub use otlp::OtlpExporter;
pub use splunk::SplunkExporter;

use crate::core::{Result, WeaveError};
use crate::tracker::TraceSnapshot;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;

/// Backend exporter contract.
///
/// `export_traces` is best-effort: an empty batch is a successful no-op, and
/// a trace that cannot be encoded is skipped rather than failing the batch.
/// `shutdown` must return within `timeout`.
#[async_trait]
pub trait TraceExporter: Send + Sync {
    /// Backend name used in logs and errors.
    fn name(&self) -> &str;

    /// Fraction of traces this backend receives (0.0 to 1.0).
    fn sample_rate(&self) -> f64;

    /// Sends a batch of traces.
    async fn export_traces(&self, traces: &[TraceSnapshot]) -> Result<()>;

    /// Flushes and closes the backend.
    async fn shutdown(&self, timeout: Duration) -> Result<()>;
}

/// HTTP plumbing shared by the bundled backends.
///
/// Each send holds a read guard on `in_flight`; shutdown takes the write
/// guard, so it waits for outstanding requests up to its deadline.
#[derive(Debug)]
pub(crate) struct HttpTransport {
    backend: &'static str,
    client: reqwest::Client,
    closed: AtomicBool,
    in_flight: RwLock<()>,
}

impl HttpTransport {
    pub(crate) fn new(backend: &'static str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            backend,
            client,
            closed: AtomicBool::new(false),
            in_flight: RwLock::new(()),
        })
    }

    pub(crate) fn client(&self) -> &reqwest::Client {
        &self.client
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Sends the request, mapping non-2xx responses to [`WeaveError::Export`].
    pub(crate) async fn send(&self, request: reqwest::RequestBuilder) -> Result<()> {
        let _guard = self.in_flight.read().await;
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(WeaveError::export(
            self.backend,
            format!("{} {}", status, body.chars().take(256).collect::<String>()),
        ))
    }

    pub(crate) async fn shutdown(&self, timeout: Duration) -> Result<()> {
        self.closed.store(true, Ordering::Release);
        match tokio::time::timeout(timeout, self.in_flight.write()).await {
            Ok(_guard) => Ok(()),
            Err(_) => Err(WeaveError::Timeout {
                timeout_ms: timeout.as_millis() as u64,
            }),
        }
    }
}

/// Joins a base URL and a path without doubling the slash.
pub(crate) fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

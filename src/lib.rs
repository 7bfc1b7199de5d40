//! spanweave - distributed trace assembly from captured workload events.
//!
//! spanweave ingests a stream of timestamped, trace-tagged events, assembles
//! them into traces and spans, derives a service dependency graph, and ships
//! traces to one or more tracing backends.
//!
//! # Architecture
//!
//! - `propagation`: W3C `traceparent` and B3 codecs, header context extraction
//! - `tracker`: concurrent trace/span assembly store
//! - `service_map`: service dependency graph and DOT rendering
//! - `sampling`: per-backend deterministic trace sampling
//! - `export`: backend exporters (OTLP, Jaeger, Splunk) and the export manager
//! - `core`: event model, configuration and errors
//! - `cli`: command-line interface
//!
//! # Example
//!
//! ```no_run
//! use spanweave::core::{Config, Event, EventType};
//! use spanweave::export::ExportManager;
//! use std::time::{Duration, SystemTime};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let manager = ExportManager::new(Config::default())?;
//!     manager.start().await?;
//!
//!     let mut event = Event::new(EventType::HttpRequest, SystemTime::now());
//!     event.trace_id = "4bf92f3577b34da6a3ce929d0e0e4736".to_string();
//!     event.span_id = "00f067aa0ba902b7".to_string();
//!     manager.process_event(event, None);
//!
//!     manager.shutdown(Duration::from_secs(10)).await?;
//!     Ok(())
//! }
//! ```

#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

pub mod cli;
pub mod core;
pub mod export;
pub mod propagation;
pub mod sampling;
pub mod service_map;
pub mod tracker;

// Re-export core types for convenience
pub use crate::core::{Config, Result, WeaveError};
pub use crate::export::{ExportManager, TraceExporter};
pub use crate::propagation::{ContextExtractor, TraceContext};
pub use crate::service_map::RequestFlowGraph;
pub use crate::tracker::TraceTracker;

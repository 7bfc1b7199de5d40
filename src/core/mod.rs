//! Core domain types, configuration and errors for spanweave.
//!
//! This module contains the event contract consumed by the tracker and
//! the types shared by every other subsystem.

#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod otel_compliance;
pub mod types;

// Re-export commonly used types
pub use config::{Config, ConfigBuilder};
pub use error::{Result, WeaveError};
pub use types::{service_key, EnrichmentContext, Event, EventType, ServiceInfo};

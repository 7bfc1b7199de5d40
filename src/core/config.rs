//! Configuration management for spanweave.
//!
//! This module provides configuration handling with:
//! - YAML file support
//! - CLI argument overrides
//! - Validation and defaults
//!
//! The export manager receives a resolved [`Config`] at construction and
//! never consults process-wide state afterwards.

use crate::core::{Result, WeaveError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Complete configuration for spanweave
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Trace assembly and export scheduling
    pub tracing: TracingConfig,
    /// Backend exporters; any subset may be configured
    pub exporters: ExportersConfig,
    /// Bounds applied when mining headers for propagation context
    pub extraction: ExtractionLimits,
    /// Logging configuration
    pub logging: LoggingConfig,
    /// Debug mode
    #[serde(skip)]
    pub debug: bool,
}

/// Trace assembly configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TracingConfig {
    /// Feature flag; a disabled manager turns every operation into a no-op
    pub enabled: bool,
    /// How often traces are pushed to the backends
    #[serde(with = "humantime_serde")]
    pub export_interval: Duration,
    /// How often old traces are evicted
    #[serde(with = "humantime_serde")]
    pub cleanup_interval: Duration,
    /// Traces whose last event is older than this are evicted
    #[serde(with = "humantime_serde")]
    pub retention: Duration,
    /// Upper bound on a single backend export call
    #[serde(with = "humantime_serde")]
    pub export_timeout: Duration,
    /// Upper bound on each backend's shutdown; the caller's overall deadline
    /// may shorten it
    #[serde(with = "humantime_serde")]
    pub shutdown_timeout: Duration,
}

/// Backend exporter configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportersConfig {
    /// OTLP/HTTP collector
    pub otlp: Option<OtlpConfig>,
    /// Jaeger collector
    pub jaeger: Option<JaegerConfig>,
    /// Splunk HTTP Event Collector
    pub splunk: Option<SplunkConfig>,
}

/// OTLP/HTTP exporter configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OtlpConfig {
    /// Collector base URL, e.g. `http://localhost:4318`
    pub endpoint: String,
    /// Fraction of traces to export (0.0 to 1.0)
    #[serde(default = "default_sample_rate")]
    pub sample_rate: f64,
    /// Extra request headers
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

/// Jaeger exporter configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JaegerConfig {
    /// Collector URL traces are posted to
    pub endpoint: String,
    /// Fraction of traces to export (0.0 to 1.0)
    #[serde(default = "default_sample_rate")]
    pub sample_rate: f64,
}

/// Splunk HEC exporter configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SplunkConfig {
    /// HEC base URL, e.g. `https://splunk:8088`
    pub endpoint: String,
    /// HEC token; sent as `Authorization: Splunk <token>` when set
    #[serde(default)]
    pub token: Option<String>,
    /// Fraction of traces to export (0.0 to 1.0)
    #[serde(default = "default_sample_rate")]
    pub sample_rate: f64,
}

/// Defensive bounds for header-based context extraction
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionLimits {
    /// Header sets larger than this are rejected outright
    pub max_headers: usize,
    /// Longer header names are ignored
    pub max_header_name_len: usize,
    /// Longer header values are ignored
    pub max_header_value_len: usize,
    /// Raw header blobs larger than this are rejected outright
    pub max_raw_len: usize,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level
    pub level: LogLevel,
    /// Structured logging format
    pub structured: bool,
}

/// Log levels
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

fn default_sample_rate() -> f64 {
    1.0
}

impl Default for TracingConfig {
    fn default() -> Self {
        TracingConfig {
            enabled: true,
            export_interval: Duration::from_secs(10),
            cleanup_interval: Duration::from_secs(60),
            retention: Duration::from_secs(600), // 10 minutes
            export_timeout: Duration::from_secs(5),
            shutdown_timeout: Duration::from_secs(5),
        }
    }
}

impl Default for ExtractionLimits {
    fn default() -> Self {
        ExtractionLimits {
            max_headers: 100,
            max_header_name_len: 256,
            max_header_value_len: 8192,
            max_raw_len: 64 * 1024,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: LogLevel::Info,
            structured: false,
        }
    }
}

impl Config {
    /// Create new config with defaults
    pub fn new() -> Result<Self> {
        let config = Config::default();
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        let tracing = &self.tracing;
        if tracing.export_interval.is_zero() {
            return Err(WeaveError::config("export_interval must be greater than 0"));
        }
        if tracing.cleanup_interval.is_zero() {
            return Err(WeaveError::config("cleanup_interval must be greater than 0"));
        }
        if tracing.retention.is_zero() {
            return Err(WeaveError::config("retention must be greater than 0"));
        }

        if let Some(otlp) = &self.exporters.otlp {
            validate_backend("otlp", &otlp.endpoint, otlp.sample_rate)?;
        }
        if let Some(jaeger) = &self.exporters.jaeger {
            validate_backend("jaeger", &jaeger.endpoint, jaeger.sample_rate)?;
        }
        if let Some(splunk) = &self.exporters.splunk {
            validate_backend("splunk", &splunk.endpoint, splunk.sample_rate)?;
        }

        let limits = &self.extraction;
        if limits.max_headers == 0 || limits.max_header_name_len == 0 || limits.max_header_value_len == 0 {
            return Err(WeaveError::config("extraction limits must be greater than 0"));
        }

        Ok(())
    }
}

fn validate_backend(name: &str, endpoint: &str, sample_rate: f64) -> Result<()> {
    if endpoint.trim().is_empty() {
        return Err(WeaveError::config(format!("{name} exporter requires an endpoint")));
    }
    if !(0.0..=1.0).contains(&sample_rate) {
        return Err(WeaveError::InvalidSamplingRate(sample_rate));
    }
    Ok(())
}

impl LogLevel {
    /// Convert to tracing filter string
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Configuration builder for programmatic construction
pub struct ConfigBuilder {
    config: Config,
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigBuilder {
    /// Create a new builder with defaults
    pub fn new() -> Self {
        ConfigBuilder {
            config: Config::default(),
        }
    }

    /// Load configuration from YAML string
    pub fn from_yaml(mut self, yaml: &str) -> Result<Self> {
        self.config = serde_yaml::from_str(yaml)
            .map_err(|e| WeaveError::config(format!("Failed to parse YAML config: {}", e)))?;
        Ok(self)
    }

    /// Enable or disable tracing
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.config.tracing.enabled = enabled;
        self
    }

    /// Set export interval
    pub fn export_interval(mut self, interval: Duration) -> Self {
        self.config.tracing.export_interval = interval;
        self
    }

    /// Set cleanup interval
    pub fn cleanup_interval(mut self, interval: Duration) -> Self {
        self.config.tracing.cleanup_interval = interval;
        self
    }

    /// Set trace retention
    pub fn retention(mut self, retention: Duration) -> Self {
        self.config.tracing.retention = retention;
        self
    }

    /// Set the per-call export timeout
    pub fn export_timeout(mut self, timeout: Duration) -> Self {
        self.config.tracing.export_timeout = timeout;
        self
    }

    /// Set the per-backend shutdown timeout
    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.config.tracing.shutdown_timeout = timeout;
        self
    }

    /// Configure the OTLP exporter
    pub fn otlp<S: Into<String>>(mut self, endpoint: S, sample_rate: f64) -> Self {
        self.config.exporters.otlp = Some(OtlpConfig {
            endpoint: endpoint.into(),
            sample_rate,
            headers: BTreeMap::new(),
        });
        self
    }

    /// Configure the Jaeger exporter
    pub fn jaeger<S: Into<String>>(mut self, endpoint: S, sample_rate: f64) -> Self {
        self.config.exporters.jaeger = Some(JaegerConfig {
            endpoint: endpoint.into(),
            sample_rate,
        });
        self
    }

    /// Configure the Splunk exporter; an empty token means no authorization header
    pub fn splunk<S: Into<String>, T: Into<String>>(mut self, endpoint: S, token: T, sample_rate: f64) -> Self {
        let token = token.into();
        self.config.exporters.splunk = Some(SplunkConfig {
            endpoint: endpoint.into(),
            token: (!token.is_empty()).then_some(token),
            sample_rate,
        });
        self
    }

    /// Set debug mode
    pub fn debug(mut self, debug: bool) -> Self {
        self.config.debug = debug;
        self
    }

    /// Build and validate the configuration
    pub fn build(self) -> Result<Config> {
        self.config.validate()?;
        Ok(self.config)
    }
}

//! Command-line interface for spanweave.
//!
//! Replays a JSON-lines event capture through the export manager, optionally
//! writes the service dependency graph as DOT, and shuts down with a final
//! export to the configured backends.

use crate::core::config::{ConfigBuilder, LoggingConfig};
use crate::core::{Config, EnrichmentContext, Event, Result, WeaveError};
use crate::export::ExportManager;
use clap::Parser;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Assemble captured events into traces and ship them to tracing backends.
#[derive(Parser, Debug)]
#[command(name = "spanweave")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Configuration file path (YAML)
    #[arg(short, long, env = "SPANWEAVE_CONFIG")]
    pub config: Option<PathBuf>,

    /// JSON-lines file of events to replay
    #[arg(short, long)]
    pub events: Option<PathBuf>,

    /// Write the service dependency graph to this path in DOT format
    #[arg(long)]
    pub dot: Option<PathBuf>,

    /// Keep the export loops running until Ctrl-C
    #[arg(long)]
    pub wait: bool,

    /// Seconds allowed for the final export and backend shutdown
    #[arg(long, value_name = "SECS", default_value_t = 15)]
    pub shutdown_deadline: u64,

    /// Enable debug logging
    #[arg(short, long, env = "SPANWEAVE_DEBUG")]
    pub debug: bool,

    /// Validate configuration and exit
    #[arg(long)]
    pub check_config: bool,
}

/// One line of a replay file.
#[derive(Debug, Deserialize)]
pub struct ReplayRecord {
    pub event: Event,
    #[serde(default)]
    pub context: Option<EnrichmentContext>,
}

impl Cli {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Cli::parse()
    }

    /// Load configuration: the YAML file if given, otherwise defaults, then
    /// CLI overrides.
    pub async fn load_config(&self) -> Result<Config> {
        let mut builder = ConfigBuilder::new();

        if let Some(path) = &self.config {
            let content = tokio::fs::read_to_string(path).await.map_err(|e| {
                WeaveError::config(format!("Failed to read config file {:?}: {}", path, e))
            })?;
            builder = builder.from_yaml(&content)?;
        }

        builder.debug(self.debug).build()
    }

    /// Initialize logging.
    ///
    /// `RUST_LOG` wins; otherwise `--debug` or the configured level applies.
    pub fn init_logging(&self, logging: &LoggingConfig) -> Result<()> {
        use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

        let log_level = if self.debug {
            "debug"
        } else {
            logging.level.as_str()
        };

        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

        let fmt_layer = if logging.structured {
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_line_number(true)
                .compact()
        } else {
            tracing_subscriber::fmt::layer().with_target(false).compact()
        };

        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer)
            .try_init()
            .map_err(|e| WeaveError::config(format!("Failed to initialize logging: {}", e)))?;

        Ok(())
    }
}

/// Parses one replay line.
pub fn parse_record(line: &str) -> Result<ReplayRecord> {
    Ok(serde_json::from_str(line)?)
}

/// Feeds every record of a JSON-lines file into the manager.
///
/// Blank lines are skipped; malformed lines are logged and skipped. Returns
/// the number of events fed.
pub async fn replay_events(manager: &ExportManager, path: &Path) -> Result<usize> {
    let content = tokio::fs::read_to_string(path).await?;
    let mut fed = 0;
    for (index, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match parse_record(line) {
            Ok(record) => {
                manager.process_event(record.event, record.context.as_ref());
                fed += 1;
            }
            Err(e) => tracing::warn!(line = index + 1, "skipping malformed event: {}", e),
        }
    }
    Ok(fed)
}

/// Execute the spanweave command.
pub async fn execute(cli: Cli) -> Result<()> {
    let config = cli.load_config().await?;
    cli.init_logging(&config.logging)?;

    if cli.check_config {
        println!("Configuration is valid!");
        println!("  Tracing enabled: {}", config.tracing.enabled);
        println!("  Export interval: {:?}", config.tracing.export_interval);
        println!("  Retention: {:?}", config.tracing.retention);
        println!("  OTLP: {}", describe(config.exporters.otlp.as_ref().map(|c| &c.endpoint)));
        println!("  Jaeger: {}", describe(config.exporters.jaeger.as_ref().map(|c| &c.endpoint)));
        println!("  Splunk: {}", describe(config.exporters.splunk.as_ref().map(|c| &c.endpoint)));
        return Ok(());
    }

    let manager = ExportManager::new(config)?;
    manager.start().await?;

    if let Some(path) = &cli.events {
        let fed = replay_events(&manager, path).await?;
        tracing::info!(events = fed, traces = manager.get_trace_count(), "replayed events");
    }

    if cli.wait {
        tracing::info!("waiting for Ctrl-C");
        tokio::signal::ctrl_c().await?;
    }

    if let Some(path) = &cli.dot {
        match manager.get_request_flow_graph() {
            Some(graph) => {
                tokio::fs::write(path, graph.to_dot()).await?;
                tracing::info!(
                    nodes = graph.nodes.len(),
                    edges = graph.edges.len(),
                    "wrote dependency graph to {:?}",
                    path
                );
            }
            None => tracing::warn!("tracing disabled, no dependency graph written"),
        }
    }

    manager
        .shutdown(Duration::from_secs(cli.shutdown_deadline))
        .await
}

fn describe(endpoint: Option<&String>) -> &str {
    endpoint.map_or("disabled", String::as_str)
}

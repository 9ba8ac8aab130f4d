//! ---
//! bl_section: "05-control-cli"
//! bl_subsection: "binary"
//! bl_type: "source"
//! bl_scope: "code"
//! bl_description: "Process-wide configuration, store handle and reconciler."
//! bl_version: "v0.1.0"
//! bl_owner: "tbd"
//! ---
use std::future::Future;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use blobleas_common::{init_tracing, AppConfig};
use blobleas_reconciler::{new_registry, LeaseMetrics, LeaseReconciler};
use blobleas_store::{AzureBlobStore, InMemoryLeaseStore, SharedLeaseStore};
use prometheus::{Encoder, TextEncoder};
use serde::Serialize;
use tracing::{debug, info};

const CONFIG_CANDIDATES: &[&str] = &["blobleas.toml", "/etc/blobleas/blobleas.toml"];

/// Everything a subcommand needs, built once per process.
pub struct CliContext {
    pub config: AppConfig,
    pub store: SharedLeaseStore,
    pub reconciler: LeaseReconciler,
    pub metrics: LeaseMetrics,
    timeout: Duration,
}

impl CliContext {
    pub fn build(config_path: Option<&Path>, in_memory: bool, timeout_secs: u64) -> Result<Self> {
        let (config, source) = match config_path {
            Some(path) => (AppConfig::from_path(path)?, Some(path.to_path_buf())),
            None => {
                let loaded = AppConfig::load_with_source(CONFIG_CANDIDATES)?;
                (loaded.config, loaded.source)
            }
        };
        init_tracing("blobleasctl", &config.logging)?;
        log_config_source(source.as_deref());

        if timeout_secs == 0 {
            return Err(anyhow!("--timeout must be greater than zero"));
        }

        let store: SharedLeaseStore = if in_memory {
            info!("using in-memory lease store");
            Arc::new(InMemoryLeaseStore::with_settings(config.store.clone()))
        } else {
            Arc::new(
                AzureBlobStore::from_config(config.store.clone(), &config.credentials)
                    .context("failed to initialise blob store client")?,
            )
        };
        let metrics = LeaseMetrics::new(new_registry())?;
        let reconciler = LeaseReconciler::new(store.clone()).with_metrics(metrics.clone());

        Ok(Self {
            config,
            store,
            reconciler,
            metrics,
            timeout: Duration::from_secs(timeout_secs),
        })
    }

    /// Bound a single store-facing operation by `--timeout`.
    pub async fn bounded<T, E, F>(&self, operation: &str, future: F) -> Result<T>
    where
        F: Future<Output = std::result::Result<T, E>>,
        E: std::error::Error + Send + Sync + 'static,
    {
        match tokio::time::timeout(self.timeout, future).await {
            Ok(result) => result.with_context(|| format!("{operation} failed")),
            Err(_) => Err(anyhow!(
                "{operation} timed out after {}s",
                self.timeout.as_secs()
            )),
        }
    }

    pub fn print_metrics(&self) -> Result<()> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.metrics.registry().gather(), &mut buffer)?;
        std::io::stderr().write_all(&buffer)?;
        Ok(())
    }
}

/// Report where the configuration came from. Called once tracing is installed.
fn log_config_source(source: Option<&Path>) {
    match source {
        Some(path) => debug!(config_source = %path.display(), "configuration loaded"),
        None => debug!("no configuration file found; using built-in defaults"),
    }
}

/// Write a JSON document to stdout.
pub fn emit<T: Serialize>(value: &T) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value)?;
    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{rendered}")?;
    Ok(())
}

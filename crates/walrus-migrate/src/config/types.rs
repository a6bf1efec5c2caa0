//! Configuration type definitions with auto-tuning based on system resources.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use sysinfo::System;
use tracing::info;

/// Largest worker pool a batch may use.
pub const MAX_CONCURRENCY: usize = 10;

/// System resource information for auto-tuning.
#[derive(Debug, Clone)]
pub struct SystemResources {
    /// Total RAM in GB.
    pub total_memory_gb: f64,
    /// Number of CPU cores.
    pub cpu_cores: usize,
}

impl SystemResources {
    /// Detect system resources.
    pub fn detect() -> Self {
        let mut sys = System::new_all();
        sys.refresh_all();

        let total_memory_gb = sys.total_memory() as f64 / (1024.0 * 1024.0 * 1024.0);
        let cpu_cores = sys.cpus().len();

        Self {
            total_memory_gb,
            cpu_cores,
        }
    }

    pub fn log(&self) {
        info!(
            "System resources: {:.1} GB RAM, {} CPU cores",
            self.total_memory_gb, self.cpu_cores
        );
    }
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Destination blob store endpoints and storage duration.
    #[serde(default)]
    pub walrus: WalrusConfig,

    /// Source object store settings (credentials are never stored here).
    #[serde(default)]
    pub source: SourceConfig,

    /// Transfer behavior configuration.
    #[serde(default)]
    pub transfer: TransferSettings,
}

impl Config {
    /// Apply auto-tuned defaults based on system resources.
    /// Only fills in values that weren't explicitly set in the config file.
    pub fn with_auto_tuning(mut self) -> Self {
        let resources = SystemResources::detect();
        resources.log();
        self.transfer = self.transfer.with_auto_tuning(&resources);
        self
    }
}

/// Destination (Walrus) configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalrusConfig {
    /// Aggregator base URL, used for reads.
    #[serde(default = "default_aggregator_url")]
    pub aggregator_url: String,

    /// Publisher base URL, used for writes.
    #[serde(default = "default_publisher_url")]
    pub publisher_url: String,

    /// Storage duration in epochs (default: 5).
    #[serde(default = "default_epochs")]
    pub epochs: u32,
}

impl Default for WalrusConfig {
    fn default() -> Self {
        Self {
            aggregator_url: default_aggregator_url(),
            publisher_url: default_publisher_url(),
            epochs: default_epochs(),
        }
    }
}

/// Source (S3-compatible) configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Region used when a request does not name one (default: "us-east-1").
    #[serde(default = "default_region")]
    pub region: String,

    /// Custom endpoint for S3-compatible stores (MinIO, R2, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    /// Use path-style addressing (default: false).
    #[serde(default)]
    pub force_path_style: bool,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            region: default_region(),
            endpoint: None,
            force_path_style: false,
        }
    }
}

/// Transfer behavior configuration.
/// Performance fields use Option<T> to distinguish between
/// "not set" (use auto-tuned default) and "explicitly set" (use provided value).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransferSettings {
    /// Number of parallel transfer workers. Auto-tuned based on CPU cores if not set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concurrency: Option<usize>,

    /// Timeout for a single destination HTTP call, in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_timeout_secs: Option<u64>,

    /// Location of the local index document.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index_path: Option<PathBuf>,

    /// Objects below this size are buffered in one allocation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub buffer_threshold_bytes: Option<u64>,
}

impl TransferSettings {
    /// Fill in values that are None (not explicitly set).
    pub fn with_auto_tuning(mut self, resources: &SystemResources) -> Self {
        if self.concurrency.is_none() {
            self.concurrency = Some(resources.cpu_cores.clamp(1, MAX_CONCURRENCY));
        }

        info!(
            "Auto-tuned transfer: concurrency={}, http_timeout={}s",
            self.get_concurrency(),
            self.get_http_timeout_secs()
        );

        self
    }

    pub fn get_concurrency(&self) -> usize {
        self.concurrency.unwrap_or(3)
    }

    pub fn get_http_timeout_secs(&self) -> u64 {
        self.http_timeout_secs
            .unwrap_or(crate::destination::DEFAULT_HTTP_TIMEOUT.as_secs())
    }

    pub fn get_buffer_threshold_bytes(&self) -> u64 {
        self.buffer_threshold_bytes
            .unwrap_or(crate::transfer::BUFFER_THRESHOLD_BYTES)
    }

    /// Configured index path, or the per-user default.
    pub fn get_index_path(&self) -> PathBuf {
        self.index_path
            .clone()
            .unwrap_or_else(crate::index::LocalIndex::default_path)
    }
}

fn default_aggregator_url() -> String {
    "https://aggregator.walrus-testnet.walrus.space".to_string()
}

fn default_publisher_url() -> String {
    "https://publisher.walrus-testnet.walrus.space".to_string()
}

fn default_epochs() -> u32 {
    5
}

fn default_region() -> String {
    "us-east-1".to_string()
}

//! Single-object transfer engine.
//!
//! Each transfer runs download -> buffer -> upload -> index update. A failure
//! in any phase is captured in the item's [`TransferResult`] instead of being
//! returned, so a batch keeps going past individual failures.

use crate::cost::{self, Cost};
use crate::destination::{BlobStore, StoreReceipt};
use crate::error::{MigrateError, Result};
use crate::index::{IndexEntry, LocalIndex};
use crate::source::{SourceObject, SourceStore};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

/// Appended to the target name of encrypted payloads.
pub const ENCRYPTED_SUFFIX: &str = ".sealed";

/// Objects below this size are buffered in a single allocation.
pub const BUFFER_THRESHOLD_BYTES: u64 = 100 * 1024 * 1024;

/// Display name for a source key: its last path segment (the whole key
/// when that segment is empty), plus the encryption suffix when requested.
pub fn target_name_for(key: &str, encrypt: bool) -> String {
    let trimmed = key.trim_end_matches('/');
    let base = match trimmed.rsplit('/').next() {
        Some(b) if !b.is_empty() => b,
        _ => key,
    };
    if encrypt {
        format!("{}{}", base, ENCRYPTED_SUFFIX)
    } else {
        base.to_string()
    }
}

/// Work item for one source object.
#[derive(Debug, Clone)]
pub struct TransferJob {
    pub bucket: String,
    pub source_key: String,
    pub target_name: String,
    /// Size from the listing, used for cost estimates and progress.
    pub size_hint: u64,
    pub epochs: u32,
    pub encrypt: bool,
}

impl TransferJob {
    pub fn new(bucket: &str, object: &SourceObject, epochs: u32, encrypt: bool) -> Self {
        Self {
            bucket: bucket.to_string(),
            source_key: object.key.clone(),
            target_name: target_name_for(&object.key, encrypt),
            size_hint: object.size,
            epochs,
            encrypt,
        }
    }
}

/// Step of a single transfer, reported in failure context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferPhase {
    Download,
    Buffer,
    Upload,
}

impl TransferPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferPhase::Download => "download",
            TransferPhase::Buffer => "buffer",
            TransferPhase::Upload => "upload",
        }
    }
}

impl fmt::Display for TransferPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one job.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferResult {
    pub source_key: String,
    pub target_name: String,
    pub blob_id: String,
    pub size: u64,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub estimated_cost: Cost,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiry_epoch: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub registered_epoch: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object_id: Option<String>,
    pub already_existed: bool,
    pub completed_at: DateTime<Utc>,
}

impl TransferResult {
    fn base(job: &TransferJob) -> Self {
        Self {
            source_key: job.source_key.clone(),
            target_name: job.target_name.clone(),
            blob_id: String::new(),
            size: job.size_hint,
            success: false,
            error: None,
            estimated_cost: cost::estimate(job.size_hint, job.epochs),
            expiry_epoch: None,
            registered_epoch: None,
            object_id: None,
            already_existed: false,
            completed_at: Utc::now(),
        }
    }

    /// Result for a job that was only priced, not moved.
    pub fn preview(job: &TransferJob) -> Self {
        Self {
            success: true,
            ..Self::base(job)
        }
    }

    /// Result for a job that failed with `err`.
    pub fn failed(job: &TransferJob, err: &MigrateError) -> Self {
        Self {
            error: Some(err.to_string()),
            ..Self::base(job)
        }
    }

    fn succeeded(job: &TransferJob, receipt: StoreReceipt, bytes_sent: u64) -> Self {
        Self {
            blob_id: receipt.blob_id,
            size: bytes_sent,
            success: true,
            expiry_epoch: receipt.expiry_epoch,
            registered_epoch: receipt.registered_epoch,
            object_id: receipt.object_id,
            already_existed: receipt.already_existed,
            ..Self::base(job)
        }
    }
}

/// Moves single objects from the source store to the blob store.
pub struct TransferEngine {
    source: Arc<dyn SourceStore>,
    destination: Arc<dyn BlobStore>,
    index: Option<Arc<LocalIndex>>,
    buffer_threshold: u64,
}

impl TransferEngine {
    pub fn new(source: Arc<dyn SourceStore>, destination: Arc<dyn BlobStore>) -> Self {
        Self {
            source,
            destination,
            index: None,
            buffer_threshold: BUFFER_THRESHOLD_BYTES,
        }
    }

    /// Record successful uploads in `index`.
    pub fn with_index(mut self, index: Arc<LocalIndex>) -> Self {
        self.index = Some(index);
        self
    }

    pub fn with_buffer_threshold(mut self, bytes: u64) -> Self {
        self.buffer_threshold = bytes;
        self
    }

    /// Run one job to completion or cancellation. Never fails: errors end up
    /// in the returned result.
    pub async fn execute(&self, job: &TransferJob, cancel: &CancellationToken) -> TransferResult {
        let start = Instant::now();

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(MigrateError::Cancelled),
            r = self.move_object(job) => r,
        };

        match outcome {
            Ok((receipt, bytes_sent)) => {
                self.record_in_index(job, &receipt, bytes_sent);
                debug!(
                    "Transferred {} -> {} ({} bytes in {:.2}s)",
                    job.source_key,
                    receipt.blob_id,
                    bytes_sent,
                    start.elapsed().as_secs_f64()
                );
                TransferResult::succeeded(job, receipt, bytes_sent)
            }
            Err(e) => {
                error!("Transfer of {} failed: {}", job.source_key, e);
                TransferResult::failed(job, &e)
            }
        }
    }

    async fn move_object(&self, job: &TransferJob) -> Result<(StoreReceipt, u64)> {
        let wrap = |phase: TransferPhase| {
            let key = job.source_key.clone();
            move |e: MigrateError| MigrateError::transfer(key, phase.as_str(), e)
        };

        let body = self
            .source
            .fetch_object(&job.bucket, &job.source_key)
            .await
            .map_err(wrap(TransferPhase::Download))?;

        let data: Bytes = body
            .materialize(self.buffer_threshold)
            .await
            .map_err(wrap(TransferPhase::Buffer))?;

        // payload is opaque here; only the target name reflects encryption
        let bytes_sent = data.len() as u64;

        let receipt = self
            .destination
            .store(data, job.epochs)
            .await
            .map_err(wrap(TransferPhase::Upload))?;
        if receipt.blob_id.is_empty() {
            return Err(wrap(TransferPhase::Upload)(MigrateError::unrecognized(
                "store receipt has an empty blob id",
                b"",
            )));
        }

        Ok((receipt, bytes_sent))
    }

    fn record_in_index(&self, job: &TransferJob, receipt: &StoreReceipt, bytes_sent: u64) {
        let Some(index) = &self.index else {
            return;
        };

        let entry = IndexEntry {
            blob_id: receipt.blob_id.clone(),
            size: bytes_sent,
            mod_time: Utc::now(),
            expiry_epoch: receipt.expiry_epoch.unwrap_or(0),
        };
        if let Err(e) = index.put(job.target_name.clone(), entry) {
            warn!("Not indexing {}: {}", job.target_name, e);
            return;
        }
        if let Err(e) = index.persist() {
            warn!("{}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_name_is_base_name() {
        assert_eq!(target_name_for("data/2024/report.csv", false), "report.csv");
        assert_eq!(target_name_for("top.txt", false), "top.txt");
        assert_eq!(target_name_for("dir/sub/", false), "sub");
        assert_eq!(target_name_for("/", false), "/");
    }

    #[test]
    fn test_target_name_encrypted_suffix() {
        assert_eq!(target_name_for("a/b.bin", true), "b.bin.sealed");
    }

    #[test]
    fn test_failed_result_keeps_message() {
        let job = TransferJob {
            bucket: "bkt".into(),
            source_key: "k".into(),
            target_name: "k".into(),
            size_hint: 10,
            epochs: 1,
            encrypt: false,
        };
        let err = MigrateError::transfer("k", "upload", MigrateError::BlobNotFound("x".into()));
        let result = TransferResult::failed(&job, &err);
        assert!(!result.success);
        assert!(result.error.unwrap().contains("upload"));
        assert_eq!(result.estimated_cost, cost::estimate(10, 1));
    }

    #[test]
    fn test_phase_names() {
        assert_eq!(TransferPhase::Download.to_string(), "download");
        assert_eq!(TransferPhase::Buffer.as_str(), "buffer");
        assert_eq!(TransferPhase::Upload.as_str(), "upload");
    }
}

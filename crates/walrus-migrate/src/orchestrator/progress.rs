//! Shared batch progress and the summary derived from it.

use crate::cost::Cost;
use crate::error::Result;
use crate::transfer::TransferResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, OnceLock, PoisonError};
use std::time::{Duration, Instant};

const MIB: f64 = 1024.0 * 1024.0;

/// Progress of one batch.
///
/// Workers bump the counters with atomic adds and append to `results` under
/// its own mutex, so no lock covers the whole struct.
#[derive(Debug)]
pub struct TransferProgress {
    run_id: String,
    total_jobs: usize,
    total_bytes: u64,
    dry_run: bool,
    processed: AtomicUsize,
    processed_bytes: AtomicU64,
    failed: AtomicUsize,
    cancelled: AtomicBool,
    started_at: DateTime<Utc>,
    start: Instant,
    elapsed: OnceLock<Duration>,
    results: Mutex<Vec<TransferResult>>,
}

impl TransferProgress {
    pub fn new(total_jobs: usize, total_bytes: u64, dry_run: bool) -> Self {
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            total_jobs,
            total_bytes,
            dry_run,
            processed: AtomicUsize::new(0),
            processed_bytes: AtomicU64::new(0),
            failed: AtomicUsize::new(0),
            cancelled: AtomicBool::new(false),
            started_at: Utc::now(),
            start: Instant::now(),
            elapsed: OnceLock::new(),
            results: Mutex::new(Vec::with_capacity(total_jobs)),
        }
    }

    /// Progress of a batch that matched nothing.
    pub fn empty(dry_run: bool) -> Self {
        let progress = Self::new(0, 0, dry_run);
        progress.finish();
        progress
    }

    /// Count a finished job and keep its result.
    pub fn record(&self, result: TransferResult) {
        if result.success {
            if !self.dry_run {
                self.processed_bytes.fetch_add(result.size, Ordering::Relaxed);
            }
        } else {
            self.failed.fetch_add(1, Ordering::Relaxed);
        }
        self.processed.fetch_add(1, Ordering::Relaxed);
        self.results
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(result);
    }

    pub(crate) fn mark_cancelled(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    /// Freeze the batch duration.
    pub(crate) fn finish(&self) {
        let _ = self.elapsed.set(self.start.elapsed());
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn total_jobs(&self) -> usize {
        self.total_jobs
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    pub fn processed(&self) -> usize {
        self.processed.load(Ordering::Relaxed)
    }

    pub fn processed_bytes(&self) -> u64 {
        self.processed_bytes.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> usize {
        self.failed.load(Ordering::Relaxed)
    }

    pub fn succeeded(&self) -> usize {
        self.processed().saturating_sub(self.failed())
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Time since start, or the final duration once the batch is drained.
    pub fn duration(&self) -> Duration {
        self.elapsed
            .get()
            .copied()
            .unwrap_or_else(|| self.start.elapsed())
    }

    /// Copy of the results recorded so far, in completion order.
    pub fn results(&self) -> Vec<TransferResult> {
        self.results
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Sum of per-item estimates.
    pub fn estimated_cost(&self) -> Cost {
        self.results
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|r| r.estimated_cost)
            .sum()
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        let elapsed = self.duration().as_secs_f64();
        let processed_bytes = self.processed_bytes();
        ProgressSnapshot {
            run_id: self.run_id.clone(),
            total_jobs: self.total_jobs,
            processed: self.processed(),
            failed: self.failed(),
            total_bytes: self.total_bytes,
            processed_bytes,
            elapsed_seconds: elapsed,
            mb_per_second: throughput(processed_bytes, elapsed),
        }
    }

    pub fn summary(&self) -> BatchSummary {
        let results = self.results();
        let duration = self.duration();
        let processed_bytes = self.processed_bytes();

        let failures = results
            .iter()
            .filter(|r| !r.success)
            .map(|r| FailedItem {
                key: r.source_key.clone(),
                error: r.error.clone().unwrap_or_default(),
            })
            .collect();
        let estimated_cost: Cost = results.iter().map(|r| r.estimated_cost).sum();

        let status = if self.is_cancelled() {
            "cancelled"
        } else if self.dry_run {
            "dry_run"
        } else if self.failed() > 0 {
            "completed_with_errors"
        } else {
            "completed"
        };

        BatchSummary {
            run_id: self.run_id.clone(),
            status: status.to_string(),
            dry_run: self.dry_run,
            started_at: self.started_at,
            completed_at: Utc::now(),
            duration_seconds: duration.as_secs_f64(),
            total_files: self.total_jobs,
            processed: self.processed(),
            successful: self.succeeded(),
            failed: self.failed(),
            skipped: self.total_jobs.saturating_sub(self.processed()),
            total_bytes: self.total_bytes,
            processed_bytes,
            mb_per_second: throughput(processed_bytes, duration.as_secs_f64()),
            estimated_cost,
            estimated_cost_wal: estimated_cost.as_wal(),
            failures,
        }
    }
}

fn throughput(bytes: u64, seconds: f64) -> f64 {
    if seconds > 0.0 {
        bytes as f64 / MIB / seconds
    } else {
        0.0
    }
}

/// Point-in-time view of a running batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub run_id: String,
    pub total_jobs: usize,
    pub processed: usize,
    pub failed: usize,
    pub total_bytes: u64,
    pub processed_bytes: u64,
    pub elapsed_seconds: f64,
    pub mb_per_second: f64,
}

/// A failed item and why.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedItem {
    pub key: String,
    pub error: String,
}

/// Final report of a batch.
#[derive(Debug, Clone, Serialize)]
pub struct BatchSummary {
    pub run_id: String,
    pub status: String,
    pub dry_run: bool,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration_seconds: f64,
    pub total_files: usize,
    pub processed: usize,
    pub successful: usize,
    pub failed: usize,
    /// Jobs never started because the batch was cancelled.
    pub skipped: usize,
    pub total_bytes: u64,
    pub processed_bytes: u64,
    pub mb_per_second: f64,
    /// In FROST.
    pub estimated_cost: Cost,
    pub estimated_cost_wal: f64,
    pub failures: Vec<FailedItem>,
}

impl BatchSummary {
    /// Convert to JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.dry_run {
            writeln!(f, "Dry Run Summary:")?;
            writeln!(f, "  Total Files: {}", self.total_files)?;
            writeln!(f, "  Total Size: {:.2} MB", self.total_bytes as f64 / MIB)?;
            return write!(f, "  Estimated Cost: {}", self.estimated_cost);
        }

        writeln!(f, "Transfer Summary:")?;
        writeln!(f, "  Total Files: {}", self.total_files)?;
        writeln!(f, "  Successful: {}", self.successful)?;
        writeln!(f, "  Failed: {}", self.failed)?;
        if self.skipped > 0 {
            writeln!(f, "  Skipped (cancelled): {}", self.skipped)?;
        }
        writeln!(
            f,
            "  Total Size: {:.2} MB",
            self.processed_bytes as f64 / MIB
        )?;
        writeln!(f, "  Duration: {:.0}s", self.duration_seconds)?;
        write!(f, "  Average Speed: {:.2} MB/s", self.mb_per_second)?;

        if !self.failures.is_empty() {
            write!(f, "\n  Failures:")?;
            for item in &self.failures {
                write!(f, "\n    {}: {}", item.key, item.error)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(key: &str, size: u64, success: bool) -> TransferResult {
        TransferResult {
            source_key: key.to_string(),
            target_name: key.to_string(),
            blob_id: if success { format!("blob-{key}") } else { String::new() },
            size,
            success,
            error: (!success).then(|| "upload failed".to_string()),
            estimated_cost: Cost::from_frost(100),
            expiry_epoch: None,
            registered_epoch: None,
            object_id: None,
            already_existed: false,
            completed_at: Utc::now(),
        }
    }

    #[test]
    fn test_counters_match_results() {
        let progress = TransferProgress::new(3, 30, false);
        progress.record(result("a", 10, true));
        progress.record(result("b", 10, false));
        progress.record(result("c", 10, true));
        progress.finish();

        assert_eq!(progress.processed(), progress.results().len());
        assert_eq!(progress.failed(), 1);
        assert_eq!(progress.succeeded(), 2);
        assert_eq!(progress.processed_bytes(), 20);
        assert_eq!(progress.estimated_cost().frost, 300);
    }

    #[test]
    fn test_dry_run_moves_no_bytes() {
        let progress = TransferProgress::new(1, 10, true);
        progress.record(result("a", 10, true));
        assert_eq!(progress.processed(), 1);
        assert_eq!(progress.processed_bytes(), 0);
        assert_eq!(progress.summary().status, "dry_run");
    }

    #[test]
    fn test_summary_lists_failures() {
        let progress = TransferProgress::new(2, 20, false);
        progress.record(result("ok", 10, true));
        progress.record(result("bad", 10, false));
        progress.finish();

        let summary = progress.summary();
        assert_eq!(summary.status, "completed_with_errors");
        assert_eq!(summary.failures.len(), 1);
        assert_eq!(summary.failures[0].key, "bad");

        let text = summary.to_string();
        assert!(text.contains("Total Files: 2"));
        assert!(text.contains("Failed: 1"));
        assert!(text.contains("bad: upload failed"));

        let json = summary.to_json().unwrap();
        assert!(json.contains("\"run_id\""));
    }

    #[test]
    fn test_cancelled_summary_counts_skipped() {
        let progress = TransferProgress::new(5, 50, false);
        progress.record(result("a", 10, true));
        progress.mark_cancelled();
        progress.finish();

        let summary = progress.summary();
        assert_eq!(summary.status, "cancelled");
        assert_eq!(summary.skipped, 4);
    }

    #[test]
    fn test_empty_progress() {
        let progress = TransferProgress::empty(false);
        assert_eq!(progress.total_jobs(), 0);
        assert_eq!(progress.snapshot().mb_per_second, 0.0);
    }
}

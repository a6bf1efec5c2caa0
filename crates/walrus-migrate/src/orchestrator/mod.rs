//! Batch orchestrator - drives a bounded worker pool over matched objects.

mod progress;

pub use progress::{BatchSummary, FailedItem, ProgressSnapshot, TransferProgress};

use crate::config::MAX_CONCURRENCY;
use crate::cost::{self, Cost};
use crate::destination::BlobStore;
use crate::error::Result;
use crate::index::LocalIndex;
use crate::source::{SourceStore, TransferFilter};
use crate::transfer::{TransferEngine, TransferJob, TransferResult, BUFFER_THRESHOLD_BYTES};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Clamp a requested worker count into 1..=10.
pub fn clamp_concurrency(requested: usize) -> usize {
    requested.clamp(1, MAX_CONCURRENCY)
}

/// What a batch moves.
#[derive(Debug, Clone)]
pub struct BatchRequest {
    pub bucket: String,
    pub filter: TransferFilter,
    pub epochs: u32,
    pub encrypt: bool,
}

/// Pre-flight cost of a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchEstimate {
    pub object_count: usize,
    pub total_bytes: u64,
    /// In FROST.
    pub total_cost: Cost,
}

/// Batch orchestrator.
pub struct Orchestrator {
    source: Arc<dyn SourceStore>,
    destination: Arc<dyn BlobStore>,
    index: Option<Arc<LocalIndex>>,
    concurrency: usize,
    dry_run: bool,
    buffer_threshold: u64,
    progress_sink: Option<mpsc::UnboundedSender<ProgressSnapshot>>,
}

impl Orchestrator {
    pub fn new(source: Arc<dyn SourceStore>, destination: Arc<dyn BlobStore>) -> Self {
        Self {
            source,
            destination,
            index: None,
            concurrency: 3,
            dry_run: false,
            buffer_threshold: BUFFER_THRESHOLD_BYTES,
            progress_sink: None,
        }
    }

    /// Record successful uploads in `index`.
    pub fn with_index(mut self, index: Arc<LocalIndex>) -> Self {
        self.index = Some(index);
        self
    }

    /// Worker count; out-of-range values are clamped, not rejected.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        let clamped = clamp_concurrency(concurrency);
        if clamped != concurrency {
            warn!(
                "Concurrency {} out of range, using {}",
                concurrency, clamped
            );
        }
        self.concurrency = clamped;
        self
    }

    /// Price batches instead of moving them.
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_buffer_threshold(mut self, bytes: u64) -> Self {
        self.buffer_threshold = bytes;
        self
    }

    /// Send a snapshot after every finished job.
    pub fn with_progress_sink(mut self, sink: mpsc::UnboundedSender<ProgressSnapshot>) -> Self {
        self.progress_sink = Some(sink);
        self
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    fn engine(&self) -> TransferEngine {
        let engine = TransferEngine::new(self.source.clone(), self.destination.clone())
            .with_buffer_threshold(self.buffer_threshold);
        match &self.index {
            Some(index) => engine.with_index(index.clone()),
            None => engine,
        }
    }

    /// Run a batch: list, then price or transfer every match.
    ///
    /// Only a listing failure is returned as an error. Item failures are in
    /// the progress results. On cancellation the progress covers the jobs
    /// that had started.
    pub async fn run_batch(
        &self,
        request: &BatchRequest,
        cancel: &CancellationToken,
    ) -> Result<Arc<TransferProgress>> {
        info!("Phase 1: Listing objects in {}", request.bucket);
        let objects = self
            .source
            .list_objects(&request.bucket, &request.filter)
            .await?;

        if objects.is_empty() {
            info!("No objects matched the filter");
            return Ok(Arc::new(TransferProgress::empty(self.dry_run)));
        }

        let total_bytes: u64 = objects.iter().map(|o| o.size).sum();
        let jobs: Vec<TransferJob> = objects
            .iter()
            .map(|o| TransferJob::new(&request.bucket, o, request.epochs, request.encrypt))
            .collect();
        let progress = Arc::new(TransferProgress::new(jobs.len(), total_bytes, self.dry_run));

        if self.dry_run {
            info!("Phase 2: Dry run, pricing {} objects", jobs.len());
            for job in &jobs {
                let preview = TransferResult::preview(job);
                debug!(
                    "DRY RUN: {} ({:.2} MB) -> {}",
                    job.source_key,
                    job.size_hint as f64 / (1024.0 * 1024.0),
                    preview.estimated_cost
                );
                progress.record(preview);
            }
            progress.finish();
            return Ok(progress);
        }

        info!(
            "Phase 2: Transferring {} objects ({} bytes) with {} workers",
            jobs.len(),
            total_bytes,
            self.concurrency
        );

        let (tx, rx) = async_channel::bounded(jobs.len());
        for job in jobs {
            if tx.send(job).await.is_err() {
                break;
            }
        }
        tx.close();

        let engine = Arc::new(self.engine());
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut handles = Vec::with_capacity(self.concurrency);

        for worker_id in 0..self.concurrency {
            let rx = rx.clone();
            let engine = engine.clone();
            let semaphore = semaphore.clone();
            let progress = progress.clone();
            let cancel = cancel.clone();
            let sink = self.progress_sink.clone();

            handles.push(tokio::spawn(async move {
                loop {
                    let job = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => break,
                        job = rx.recv() => match job {
                            Ok(job) => job,
                            Err(_) => break,
                        },
                    };

                    let permit = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => break,
                        permit = semaphore.clone().acquire_owned() => match permit {
                            Ok(permit) => permit,
                            Err(_) => break,
                        },
                    };

                    let result = engine.execute(&job, &cancel).await;
                    progress.record(result);
                    if let Some(sink) = &sink {
                        let _ = sink.send(progress.snapshot());
                    }
                    drop(permit);
                }
                debug!("Worker {} exiting", worker_id);
            }));
        }
        drop(rx);

        info!("Phase 3: Draining workers");
        for handle in handles {
            if let Err(e) = handle.await {
                error!("Transfer worker panicked: {}", e);
            }
        }

        if cancel.is_cancelled() {
            warn!(
                "Batch cancelled after {} of {} objects",
                progress.processed(),
                progress.total_jobs()
            );
            progress.mark_cancelled();
        }
        progress.finish();

        info!(
            "Batch {} finished: {} succeeded, {} failed",
            progress.run_id(),
            progress.succeeded(),
            progress.failed()
        );

        Ok(progress)
    }

    /// Price a batch without moving anything.
    pub async fn estimate_batch(
        &self,
        bucket: &str,
        filter: &TransferFilter,
        epochs: u32,
    ) -> Result<BatchEstimate> {
        let objects = self.source.list_objects(bucket, filter).await?;
        Ok(BatchEstimate {
            object_count: objects.len(),
            total_bytes: objects.iter().map(|o| o.size).sum(),
            total_cost: objects.iter().map(|o| cost::estimate(o.size, epochs)).sum(),
        })
    }

    /// Move one object, addressed by key.
    ///
    /// A missing object or unreachable source is returned as an error; any
    /// later failure is reported in the result. Honors dry-run.
    pub async fn transfer_single(
        &self,
        bucket: &str,
        key: &str,
        epochs: u32,
        encrypt: bool,
        cancel: &CancellationToken,
    ) -> Result<TransferResult> {
        let object = self.source.head_object(bucket, key).await?;
        let job = TransferJob::new(bucket, &object, epochs, encrypt);

        if self.dry_run {
            let preview = TransferResult::preview(&job);
            info!(
                "DRY RUN: would transfer {} ({} bytes) -> {}",
                key, object.size, preview.estimated_cost
            );
            return Ok(preview);
        }

        Ok(self.engine().execute(&job, cancel).await)
    }
}

//! # walrus-migrate
//!
//! Bulk migration of objects from S3-compatible stores into Walrus blob storage.
//!
//! This library provides:
//!
//! - **Filtered listings** by prefix, glob, size and modification time
//! - **Parallel transfers** over a bounded worker pool (1-10 workers)
//! - **Tolerant response decoding** for both publisher response schemas
//! - **Cost estimates** before anything is moved
//! - **A local index** mapping display names to blob ids
//! - **An HTTP surface** for the web front-end
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//! use walrus_migrate::{
//!     BatchRequest, Config, Orchestrator, S3Source, SourceCredentials, TransferFilter,
//!     WalrusClient,
//! };
//!
//! #[tokio::main]
//! async fn main() -> walrus_migrate::Result<()> {
//!     let config = Config::load("config.yaml")?;
//!     let source = S3Source::new(&SourceCredentials::from_env(), &config.source)?;
//!     let destination = WalrusClient::from_config(&config)?;
//!
//!     let orchestrator = Orchestrator::new(Arc::new(source), Arc::new(destination))
//!         .with_concurrency(config.transfer.get_concurrency());
//!     let request = BatchRequest {
//!         bucket: "my-bucket".into(),
//!         filter: TransferFilter::with_prefix("data/"),
//!         epochs: config.walrus.epochs,
//!         encrypt: false,
//!     };
//!     let progress = orchestrator.run_batch(&request, &CancellationToken::new()).await?;
//!     println!("{}", progress.summary());
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod config;
pub mod cost;
pub mod destination;
pub mod error;
pub mod index;
pub mod orchestrator;
pub mod source;
pub mod transfer;

// Re-exports for convenient access
pub use config::{Config, SourceConfig, TransferSettings, WalrusConfig};
pub use cost::Cost;
pub use destination::{BlobMetadata, BlobStore, RetryPolicy, StoreReceipt, WalrusClient};
pub use error::{MigrateError, Result};
pub use index::{IndexEntry, LocalIndex};
pub use orchestrator::{
    BatchEstimate, BatchRequest, BatchSummary, Orchestrator, ProgressSnapshot, TransferProgress,
};
pub use source::{
    S3Connector, S3Source, SourceConnector, SourceCredentials, SourceObject, SourceStore,
    TransferFilter,
};
pub use transfer::{TransferEngine, TransferJob, TransferResult};

//! Source object store operations.

mod filter;
mod s3;
mod types;

pub use filter::{match_pattern, should_include, TransferFilter};
pub use s3::{S3Connector, S3Source};
pub use types::*;

use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// Trait for source object store operations.
#[async_trait]
pub trait SourceStore: Send + Sync {
    /// List bucket names visible to the session.
    async fn list_buckets(&self) -> Result<Vec<String>>;

    /// List every object in `bucket` accepted by `filter`, following pagination.
    async fn list_objects(&self, bucket: &str, filter: &TransferFilter)
        -> Result<Vec<SourceObject>>;

    /// Open an object body for reading.
    async fn fetch_object(&self, bucket: &str, key: &str) -> Result<ObjectBody>;

    /// Object metadata without the body.
    async fn head_object(&self, bucket: &str, key: &str) -> Result<SourceObject>;

    /// Total bytes and object count a filter selects.
    async fn estimate_transfer_size(
        &self,
        bucket: &str,
        filter: &TransferFilter,
    ) -> Result<(u64, usize)> {
        let objects = self.list_objects(bucket, filter).await?;
        let total = objects.iter().map(|o| o.size).sum();
        Ok((total, objects.len()))
    }

    /// Store type, for logs.
    fn store_type(&self) -> &str;
}

/// Opens source store sessions from request credentials.
pub trait SourceConnector: Send + Sync {
    fn connect(&self, credentials: &SourceCredentials) -> Result<Arc<dyn SourceStore>>;
}

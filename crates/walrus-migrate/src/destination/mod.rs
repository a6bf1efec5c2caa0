//! Walrus destination store operations.

mod response;
mod retry;

pub use response::{
    decode_flat, decode_nested, decode_store_response, resolve_size, DecodedBlob, DECODERS,
};
pub use retry::{
    is_transient, is_transient_status, message_is_transient, with_retries, RetryPolicy,
};

use crate::config::Config;
use crate::cost::Cost;
use crate::error::{MigrateError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::StatusCode;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info, instrument};

/// Default timeout for a single destination HTTP call.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(60);

/// Outcome of a successful store call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreReceipt {
    pub blob_id: String,
    pub size: u64,
    pub expiry_epoch: Option<i64>,
    pub registered_epoch: Option<i64>,
    pub cost: Cost,
    /// Identical content was already certified on the network.
    pub already_existed: bool,
    /// On-chain object holding the blob, when reported.
    pub object_id: Option<String>,
}

/// Result of a blob status probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlobMetadata {
    pub blob_id: String,
    pub size: Option<u64>,
    pub content_type: Option<String>,
}

/// Trait for destination blob store operations.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Upload a payload in a single request.
    async fn store(&self, data: Bytes, epochs: u32) -> Result<StoreReceipt>;

    /// Read a blob back.
    async fn fetch(&self, blob_id: &str) -> Result<Bytes>;

    /// Existence and metadata probe.
    async fn status(&self, blob_id: &str) -> Result<BlobMetadata>;
}

/// HTTP client for a Walrus publisher/aggregator pair.
#[derive(Debug, Clone)]
pub struct WalrusClient {
    http: reqwest::Client,
    aggregator_url: String,
    publisher_url: String,
    retry: RetryPolicy,
}

impl WalrusClient {
    pub fn new(
        aggregator_url: impl Into<String>,
        publisher_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            aggregator_url: aggregator_url.into().trim_end_matches('/').to_string(),
            publisher_url: publisher_url.into().trim_end_matches('/').to_string(),
            retry: RetryPolicy::default(),
        })
    }

    /// Build a client from the `walrus` and `transfer` config sections.
    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(
            &config.walrus.aggregator_url,
            &config.walrus.publisher_url,
            Duration::from_secs(config.transfer.get_http_timeout_secs()),
        )
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn aggregator_url(&self) -> &str {
        &self.aggregator_url
    }

    pub fn publisher_url(&self) -> &str {
        &self.publisher_url
    }

    fn blob_url(&self, blob_id: &str) -> String {
        format!("{}/v1/blobs/{}", self.aggregator_url, blob_id)
    }

    async fn fetch_once(&self, blob_id: &str) -> Result<Bytes> {
        let response = self.http.get(self.blob_url(blob_id)).send().await?;
        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            return Err(MigrateError::BlobNotFound(blob_id.to_string()));
        }
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(MigrateError::HttpStatus {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response.bytes().await?)
    }
}

#[async_trait]
impl BlobStore for WalrusClient {
    #[instrument(skip(self, data), fields(size = data.len()))]
    async fn store(&self, data: Bytes, epochs: u32) -> Result<StoreReceipt> {
        let url = format!("{}/v1/blobs?epochs={}", self.publisher_url, epochs);
        let sent = data.len() as u64;

        let response = self
            .http
            .put(&url)
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(data)
            .send()
            .await?;

        let status = response.status();
        if status != StatusCode::OK && status != StatusCode::CREATED {
            let body = response.text().await.unwrap_or_default();
            return Err(MigrateError::HttpStatus {
                status: status.as_u16(),
                body,
            });
        }

        let body = response.bytes().await?;
        let receipt = decode_store_response(&body, sent)?;

        if receipt.size != sent {
            debug!(
                blob_id = %receipt.blob_id,
                reported = receipt.size,
                sent,
                "Destination reported a size different from the bytes sent"
            );
        }
        info!(
            blob_id = %receipt.blob_id,
            already_existed = receipt.already_existed,
            "Stored blob"
        );

        Ok(receipt)
    }

    #[instrument(skip(self))]
    async fn fetch(&self, blob_id: &str) -> Result<Bytes> {
        with_retries(&self.retry, "Blob retrieval", |_| self.fetch_once(blob_id)).await
    }

    #[instrument(skip(self))]
    async fn status(&self, blob_id: &str) -> Result<BlobMetadata> {
        let response = self.http.head(self.blob_url(blob_id)).send().await?;
        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            return Err(MigrateError::BlobNotFound(blob_id.to_string()));
        }
        if status != StatusCode::OK {
            return Err(MigrateError::StatusCheckFailed(status.as_u16()));
        }

        let headers = response.headers();
        let size = headers
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok());
        let content_type = headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        Ok(BlobMetadata {
            blob_id: blob_id.to_string(),
            size,
            content_type,
        })
    }
}

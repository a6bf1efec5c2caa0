//! In-memory source and destination stores for integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{TimeZone, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use walrus_migrate::destination::{BlobMetadata, BlobStore, StoreReceipt};
use walrus_migrate::source::{
    ObjectBody, SourceConnector, SourceCredentials, SourceObject, SourceStore, TransferFilter,
};
use walrus_migrate::{cost, MigrateError, Result};

pub fn object(key: &str, size: u64) -> SourceObject {
    SourceObject {
        key: key.to_string(),
        size,
        last_modified: Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap(),
        etag: format!("etag-{key}"),
    }
}

pub fn credentials() -> SourceCredentials {
    SourceCredentials {
        access_key_id: "AKIATEST".into(),
        secret_access_key: "secret".into(),
        ..Default::default()
    }
}

/// Source store holding objects in memory.
#[derive(Default)]
pub struct MemorySource {
    buckets: Vec<String>,
    objects: Vec<(SourceObject, Bytes)>,
    failing_keys: HashSet<String>,
    listing_fails: bool,
    fetch_delay: Option<Duration>,
    pub fetches: AtomicUsize,
    pub listings: AtomicUsize,
}

impl MemorySource {
    pub fn new() -> Self {
        Self {
            buckets: vec!["bkt".to_string()],
            ..Default::default()
        }
    }

    /// Add an object whose body is `size` copies of the key's first byte.
    pub fn with_object(mut self, key: &str, size: u64) -> Self {
        let fill = key.as_bytes().first().copied().unwrap_or(b'x');
        let data = Bytes::from(vec![fill; size as usize]);
        self.objects.push((object(key, size), data));
        self
    }

    pub fn with_bucket(mut self, name: &str) -> Self {
        self.buckets.push(name.to_string());
        self
    }

    /// Fetching `key` fails.
    pub fn failing(mut self, key: &str) -> Self {
        self.failing_keys.insert(key.to_string());
        self
    }

    /// Listing fails outright.
    pub fn with_listing_failure(mut self) -> Self {
        self.listing_fails = true;
        self
    }

    pub fn with_fetch_delay(mut self, delay: Duration) -> Self {
        self.fetch_delay = Some(delay);
        self
    }

    fn find(&self, key: &str) -> Option<&(SourceObject, Bytes)> {
        self.objects.iter().find(|(o, _)| o.key == key)
    }
}

#[async_trait]
impl SourceStore for MemorySource {
    async fn list_buckets(&self) -> Result<Vec<String>> {
        Ok(self.buckets.clone())
    }

    async fn list_objects(
        &self,
        _bucket: &str,
        filter: &TransferFilter,
    ) -> Result<Vec<SourceObject>> {
        self.listings.fetch_add(1, Ordering::SeqCst);
        if self.listing_fails {
            return Err(MigrateError::SourceUnavailable("access denied".into()));
        }
        Ok(self
            .objects
            .iter()
            .map(|(o, _)| o)
            .filter(|o| filter.should_include(o))
            .cloned()
            .collect())
    }

    async fn fetch_object(&self, _bucket: &str, key: &str) -> Result<ObjectBody> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.fetch_delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing_keys.contains(key) {
            return Err(MigrateError::SourceUnavailable(format!(
                "connection reset reading {key}"
            )));
        }
        let (_, data) = self
            .find(key)
            .ok_or_else(|| MigrateError::ObjectNotFound(key.to_string()))?;
        Ok(ObjectBody::from_bytes(data.clone()))
    }

    async fn head_object(&self, _bucket: &str, key: &str) -> Result<SourceObject> {
        self.find(key)
            .map(|(o, _)| o.clone())
            .ok_or_else(|| MigrateError::ObjectNotFound(key.to_string()))
    }

    fn store_type(&self) -> &str {
        "memory"
    }
}

/// Hands out the same [`MemorySource`] for every credential set.
pub struct MemoryConnector {
    pub source: Arc<MemorySource>,
}

impl SourceConnector for MemoryConnector {
    fn connect(&self, _credentials: &SourceCredentials) -> Result<Arc<dyn SourceStore>> {
        Ok(self.source.clone())
    }
}

/// Blob store keeping payloads in memory, keyed by a counter-based id.
#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: Mutex<HashMap<String, Bytes>>,
    next_id: AtomicUsize,
    failing_sizes: HashSet<usize>,
    store_delay: Option<Duration>,
    blank_ids: bool,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Storing a payload of exactly `size` bytes fails.
    pub fn failing_size(mut self, size: usize) -> Self {
        self.failing_sizes.insert(size);
        self
    }

    pub fn with_store_delay(mut self, delay: Duration) -> Self {
        self.store_delay = Some(delay);
        self
    }

    /// Receipts carry an empty blob id.
    pub fn with_blank_ids(mut self) -> Self {
        self.blank_ids = true;
        self
    }

    pub fn stored(&self) -> usize {
        self.blobs.lock().unwrap().len()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn store(&self, data: Bytes, epochs: u32) -> Result<StoreReceipt> {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        if let Some(delay) = self.store_delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.failing_sizes.contains(&data.len()) {
            return Err(MigrateError::HttpStatus {
                status: 500,
                body: "publisher unavailable".into(),
            });
        }

        let id = format!("blob-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        let size = data.len() as u64;
        self.blobs.lock().unwrap().insert(id.clone(), data);
        Ok(StoreReceipt {
            blob_id: if self.blank_ids { String::new() } else { id },
            size,
            expiry_epoch: Some(100 + i64::from(epochs)),
            registered_epoch: Some(100),
            cost: cost::estimate(size, epochs),
            already_existed: false,
            object_id: Some("0xobject".into()),
        })
    }

    async fn fetch(&self, blob_id: &str) -> Result<Bytes> {
        self.blobs
            .lock()
            .unwrap()
            .get(blob_id)
            .cloned()
            .ok_or_else(|| MigrateError::BlobNotFound(blob_id.to_string()))
    }

    async fn status(&self, blob_id: &str) -> Result<BlobMetadata> {
        let data = self.fetch(blob_id).await?;
        Ok(BlobMetadata {
            blob_id: blob_id.to_string(),
            size: Some(data.len() as u64),
            content_type: Some("application/octet-stream".into()),
        })
    }
}

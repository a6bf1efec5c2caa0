//! Source store data types.

use crate::error::{MigrateError, Result};
use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Utc};
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use tracing::debug;

/// Upper bound on the buffer preallocated from a reported object size.
const MAX_PREALLOC_BYTES: u64 = 8 * 1024 * 1024;

/// Stream of body chunks read from the source store.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// Metadata snapshot of a single object, taken during a listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceObject {
    pub key: String,
    pub size: u64,
    pub last_modified: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub etag: String,
}

/// Credentials for a source store session.
///
/// Field aliases accept both the web UI spelling and the capitalized spelling
/// older clients send.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceCredentials {
    #[serde(default, alias = "AccessKeyID", alias = "accessKeyID")]
    pub access_key_id: String,
    #[serde(default, alias = "SecretAccessKey")]
    pub secret_access_key: String,
    #[serde(default, alias = "SessionToken", skip_serializing_if = "Option::is_none")]
    pub session_token: Option<String>,
    #[serde(default, alias = "Region", skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
}

impl SourceCredentials {
    /// Read credentials from the standard AWS environment variables.
    pub fn from_env() -> Self {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());
        Self {
            access_key_id: var("AWS_ACCESS_KEY_ID").unwrap_or_default(),
            secret_access_key: var("AWS_SECRET_ACCESS_KEY").unwrap_or_default(),
            session_token: var("AWS_SESSION_TOKEN"),
            region: var("AWS_REGION").or_else(|| var("AWS_DEFAULT_REGION")),
        }
    }

    /// Both the key id and the secret are present.
    pub fn is_complete(&self) -> bool {
        !self.access_key_id.is_empty() && !self.secret_access_key.is_empty()
    }
}

// Custom Debug implementation that redacts secrets
impl std::fmt::Debug for SourceCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"[REDACTED]")
            .field(
                "session_token",
                &self.session_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("region", &self.region)
            .finish()
    }
}

/// An object body as returned by a fetch.
pub struct ObjectBody {
    /// Size reported by the source store.
    pub size: u64,
    pub stream: ByteStream,
}

impl ObjectBody {
    /// Wrap an in-memory payload.
    pub fn from_bytes(data: Bytes) -> Self {
        let size = data.len() as u64;
        Self {
            size,
            stream: Box::pin(futures::stream::once(async move { Ok(data) })),
        }
    }

    /// Read the whole body into memory.
    ///
    /// Bodies under `buffer_threshold` start from a buffer sized to the
    /// reported size (capped at 8 MiB); larger ones grow chunk by chunk. Either way the result is fully
    /// materialized since the destination takes a single request body.
    pub async fn materialize(mut self, buffer_threshold: u64) -> Result<Bytes> {
        let mut buf = if self.size < buffer_threshold {
            BytesMut::with_capacity(self.size.min(MAX_PREALLOC_BYTES) as usize)
        } else {
            debug!(
                size = self.size,
                "Object exceeds buffering threshold, reading in chunks"
            );
            BytesMut::new()
        };

        while let Some(chunk) = self.stream.next().await {
            buf.extend_from_slice(&chunk?);
        }

        if buf.len() as u64 != self.size {
            debug!(
                expected = self.size,
                actual = buf.len(),
                "Object body length differs from reported size"
            );
        }

        Ok(buf.freeze())
    }
}

impl std::fmt::Debug for ObjectBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectBody")
            .field("size", &self.size)
            .finish_non_exhaustive()
    }
}

/// Convert a stream error into the crate error type.
pub(crate) fn stream_error(err: std::io::Error) -> MigrateError {
    MigrateError::Io(err)
}

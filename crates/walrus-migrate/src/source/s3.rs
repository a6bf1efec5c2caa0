//! S3-compatible source store using the AWS SDK.

use super::types::stream_error;
use super::{ObjectBody, SourceConnector, SourceCredentials, SourceObject, SourceStore, TransferFilter};
use crate::config::SourceConfig;
use crate::error::{MigrateError, Result};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::error::{DisplayErrorContext, SdkError};
use aws_sdk_s3::Client;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use std::sync::Arc;
use tokio_util::io::ReaderStream;
use tracing::{debug, info, instrument};

/// Object store session backed by S3 or an S3-compatible service.
pub struct S3Source {
    client: Client,
    region: String,
}

impl std::fmt::Debug for S3Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Source")
            .field("region", &self.region)
            .finish_non_exhaustive()
    }
}

impl S3Source {
    /// Build a session from explicit credentials.
    ///
    /// The request region wins over the configured one. A custom endpoint
    /// without a scheme is treated as plain HTTP (e.g. `minio:9000`).
    pub fn new(credentials: &SourceCredentials, config: &SourceConfig) -> Result<Self> {
        if !credentials.is_complete() {
            return Err(MigrateError::Validation(
                "AWS credentials are required".into(),
            ));
        }

        let region = resolve_region(credentials, config);

        let static_credentials = aws_sdk_s3::config::Credentials::new(
            credentials.access_key_id.clone(),
            credentials.secret_access_key.clone(),
            credentials.session_token.clone(),
            None,
            "walrus-migrate",
        );

        let mut builder = aws_sdk_s3::config::Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(aws_config::Region::new(region.clone()))
            .credentials_provider(static_credentials);

        if let Some(endpoint) = config.endpoint.as_deref().filter(|e| !e.is_empty()) {
            let lower = endpoint.to_ascii_lowercase();
            let endpoint = if lower.starts_with("http://") || lower.starts_with("https://") {
                endpoint.to_string()
            } else {
                format!("http://{}", endpoint)
            };
            builder = builder.endpoint_url(endpoint);
        }

        if config.force_path_style {
            builder = builder.force_path_style(true);
        }

        debug!(region = %region, "Created S3 source session");

        Ok(Self {
            client: Client::from_conf(builder.build()),
            region,
        })
    }

    /// Convert an AWS SDK error, mapping 404 to `ObjectNotFound`.
    fn map_sdk_error<E>(err: SdkError<E>, what: &str) -> MigrateError
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        if let SdkError::ServiceError(ref service_err) = err {
            if service_err.raw().status().as_u16() == 404 {
                return MigrateError::ObjectNotFound(what.to_string());
            }
        }
        MigrateError::SourceUnavailable(format!("{}: {}", what, DisplayErrorContext(&err)))
    }
}

fn resolve_region(credentials: &SourceCredentials, config: &SourceConfig) -> String {
    credentials
        .region
        .clone()
        .filter(|r| !r.is_empty())
        .unwrap_or_else(|| config.region.clone())
}

fn to_utc(dt: Option<&aws_sdk_s3::primitives::DateTime>) -> DateTime<Utc> {
    dt.and_then(|t| DateTime::<Utc>::from_timestamp(t.secs(), t.subsec_nanos()))
        .unwrap_or_default()
}

fn to_size(len: Option<i64>) -> u64 {
    len.and_then(|l| u64::try_from(l).ok()).unwrap_or(0)
}

#[async_trait]
impl SourceStore for S3Source {
    #[instrument(skip(self), fields(store = "s3"))]
    async fn list_buckets(&self) -> Result<Vec<String>> {
        let output = self
            .client
            .list_buckets()
            .send()
            .await
            .map_err(|e| Self::map_sdk_error(e, "list buckets"))?;

        Ok(output
            .buckets()
            .iter()
            .filter_map(|b| b.name().map(str::to_string))
            .collect())
    }

    #[instrument(skip(self, filter), fields(store = "s3", prefix = %filter.prefix))]
    async fn list_objects(
        &self,
        bucket: &str,
        filter: &TransferFilter,
    ) -> Result<Vec<SourceObject>> {
        let mut objects = Vec::new();
        let mut scanned = 0usize;
        let mut continuation_token: Option<String> = None;

        loop {
            let mut request = self
                .client
                .list_objects_v2()
                .bucket(bucket)
                .prefix(&filter.prefix);

            if let Some(token) = continuation_token.take() {
                request = request.continuation_token(token);
            }

            let output = request
                .send()
                .await
                .map_err(|e| Self::map_sdk_error(e, bucket))?;

            for obj in output.contents() {
                let Some(key) = obj.key() else {
                    continue;
                };
                scanned += 1;

                let object = SourceObject {
                    key: key.to_string(),
                    size: to_size(obj.size()),
                    last_modified: to_utc(obj.last_modified()),
                    etag: obj.e_tag().unwrap_or_default().to_string(),
                };

                if filter.should_include(&object) {
                    objects.push(object);
                }
            }

            if output.is_truncated() == Some(true) {
                continuation_token = output.next_continuation_token().map(|s| s.to_string());
            } else {
                break;
            }
        }

        info!(
            "Listed {} objects in {}, {} selected by filter",
            scanned,
            bucket,
            objects.len()
        );
        Ok(objects)
    }

    #[instrument(skip(self), fields(store = "s3"))]
    async fn fetch_object(&self, bucket: &str, key: &str) -> Result<ObjectBody> {
        let output = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| Self::map_sdk_error(e, key))?;

        let size = to_size(output.content_length());

        // AWS ByteStream -> AsyncRead -> chunk stream
        let reader_stream = ReaderStream::new(output.body.into_async_read());
        let stream = reader_stream.map(|chunk| chunk.map_err(stream_error));

        Ok(ObjectBody {
            size,
            stream: Box::pin(stream),
        })
    }

    #[instrument(skip(self), fields(store = "s3"))]
    async fn head_object(&self, bucket: &str, key: &str) -> Result<SourceObject> {
        let output = self
            .client
            .head_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| Self::map_sdk_error(e, key))?;

        Ok(SourceObject {
            key: key.to_string(),
            size: to_size(output.content_length()),
            last_modified: to_utc(output.last_modified()),
            etag: output.e_tag().unwrap_or_default().to_string(),
        })
    }

    fn store_type(&self) -> &str {
        "s3"
    }
}

/// Opens [`S3Source`] sessions against the configured endpoint.
#[derive(Debug, Clone, Default)]
pub struct S3Connector {
    config: SourceConfig,
}

impl S3Connector {
    pub fn new(config: SourceConfig) -> Self {
        Self { config }
    }
}

impl SourceConnector for S3Connector {
    fn connect(&self, credentials: &SourceCredentials) -> Result<Arc<dyn SourceStore>> {
        Ok(Arc::new(S3Source::new(credentials, &self.config)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_credentials_rejected() {
        let creds = SourceCredentials {
            access_key_id: "AK".into(),
            ..Default::default()
        };
        let err = S3Source::new(&creds, &SourceConfig::default()).unwrap_err();
        assert!(matches!(err, MigrateError::Validation(_)));
    }

    #[test]
    fn test_request_region_wins() {
        let creds = SourceCredentials {
            access_key_id: "AK".into(),
            secret_access_key: "SK".into(),
            session_token: None,
            region: Some("ap-south-1".into()),
        };
        assert_eq!(resolve_region(&creds, &SourceConfig::default()), "ap-south-1");

        let blank = SourceCredentials {
            region: Some(String::new()),
            ..creds
        };
        assert_eq!(resolve_region(&blank, &SourceConfig::default()), "us-east-1");
    }

    #[test]
    fn test_size_conversion_clamps_negative() {
        assert_eq!(to_size(Some(-1)), 0);
        assert_eq!(to_size(None), 0);
        assert_eq!(to_size(Some(42)), 42);
    }
}

//! Request and response bodies of the HTTP surface.

use crate::cost::Cost;
use crate::source::{SourceCredentials, SourceObject, TransferFilter};
use crate::transfer::TransferResult;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Success envelope wrapping every proxy and transfer response.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}

/// Operation requested from the source proxy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyAction {
    ListBuckets,
    ListObjects,
    DownloadObject,
    EstimateTransfer,
}

impl FromStr for ProxyAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "listBuckets" => Ok(Self::ListBuckets),
            "listObjects" => Ok(Self::ListObjects),
            "downloadObject" => Ok(Self::DownloadObject),
            "estimateTransfer" => Ok(Self::EstimateTransfer),
            other => Err(format!("Unknown action: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyRequest {
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub credentials: SourceCredentials,
    #[serde(default)]
    pub bucket: String,
    #[serde(default)]
    pub prefix: String,
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub filter: Option<TransferFilter>,
    /// Storage duration used to price `estimateTransfer`.
    #[serde(default)]
    pub epochs: Option<u32>,
}

impl ProxyRequest {
    /// The explicit filter, or one built from the request prefix.
    pub fn effective_filter(&self) -> TransferFilter {
        self.filter
            .clone()
            .unwrap_or_else(|| TransferFilter::with_prefix(self.prefix.clone()))
    }
}

#[derive(Debug, Serialize)]
pub struct BucketInfo {
    pub name: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectInfo {
    pub key: String,
    pub size: u64,
    pub last_modified: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub etag: String,
}

impl From<SourceObject> for ObjectInfo {
    fn from(obj: SourceObject) -> Self {
        Self {
            key: obj.key,
            size: obj.size,
            last_modified: obj.last_modified.format("%Y-%m-%dT%H:%M:%SZ").to_string(),
            etag: obj.etag,
        }
    }
}

/// Small object returned inline, base64 encoded.
#[derive(Debug, Serialize)]
pub struct InlineObject {
    pub key: String,
    pub size: u64,
    pub data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferEstimate {
    pub total_size: u64,
    pub file_count: usize,
    /// In FROST.
    pub estimated_cost: Cost,
    pub estimated_cost_wal: f64,
    pub epochs: u32,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferRequest {
    #[serde(default)]
    pub credentials: SourceCredentials,
    #[serde(default)]
    pub bucket: String,
    #[serde(default)]
    pub keys: Vec<String>,
    /// Zero falls back to the server default.
    #[serde(default)]
    pub epochs: u32,
    #[serde(default)]
    pub encrypt: bool,
}

/// Per-key outcome of a transfer request.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferItem {
    pub key: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blob_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiry_epoch: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub registered_epoch: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sui_object_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TransferItem {
    pub fn failed(key: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            success: false,
            blob_id: None,
            size: None,
            expiry_epoch: None,
            registered_epoch: None,
            sui_object_id: None,
            error: Some(error.into()),
        }
    }
}

impl From<TransferResult> for TransferItem {
    fn from(result: TransferResult) -> Self {
        if !result.success {
            let error = result.error.unwrap_or_default();
            return Self::failed(result.source_key, error);
        }
        Self {
            key: result.source_key,
            success: true,
            blob_id: Some(result.blob_id).filter(|id| !id.is_empty()),
            size: Some(result.size),
            expiry_epoch: result.expiry_epoch,
            registered_epoch: result.registered_epoch,
            sui_object_id: result.object_id,
            error: None,
        }
    }
}

/// Upload registered by the web front-end.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexUpdateRequest {
    pub file_name: String,
    pub blob_id: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub expiry_epoch: i64,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatusResponse {
    pub status: String,
}

impl StatusResponse {
    pub fn new(status: &str) -> Self {
        Self {
            status: status.to_string(),
        }
    }
}

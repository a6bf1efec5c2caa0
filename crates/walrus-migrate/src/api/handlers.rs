//! HTTP request handlers.

use super::error::{ApiError, ApiResult};
use super::types::*;
use super::AppState;
use crate::error::MigrateError;
use crate::index::IndexEntry;
use crate::orchestrator::Orchestrator;
use crate::source::{SourceCredentials, SourceStore};
use crate::transfer::target_name_for;
use axum::body::Body;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE};
use axum::response::{IntoResponse, Response};
use axum::Json;
use base64::Engine;
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Objects above this size are streamed instead of returned inline.
pub const INLINE_DOWNLOAD_LIMIT: u64 = 10 * 1024 * 1024;

fn connect(state: &AppState, credentials: &SourceCredentials) -> ApiResult<Arc<dyn SourceStore>> {
    if !credentials.is_complete() {
        return Err(ApiError::BadRequest("AWS credentials are required".to_string()));
    }
    Ok(state.connector.connect(credentials)?)
}

fn require_bucket(bucket: &str) -> ApiResult<()> {
    if bucket.is_empty() {
        return Err(ApiError::BadRequest("Bucket name is required".to_string()));
    }
    Ok(())
}

/// `GET /api/health`
pub async fn health_check() -> Json<StatusResponse> {
    Json(StatusResponse::new("ok"))
}

/// `POST /api/s3/proxy`
pub async fn s3_proxy(
    State(state): State<AppState>,
    payload: Result<Json<ProxyRequest>, JsonRejection>,
) -> ApiResult<Response> {
    let Json(req) = payload?;
    let source = connect(&state, &req.credentials)?;
    let action: ProxyAction = req.action.parse().map_err(ApiError::BadRequest)?;
    debug!(action = %req.action, bucket = %req.bucket, "Proxy request");

    match action {
        ProxyAction::ListBuckets => {
            let buckets: Vec<BucketInfo> = source
                .list_buckets()
                .await?
                .into_iter()
                .map(|name| BucketInfo { name })
                .collect();
            Ok(Json(ApiResponse::ok(buckets)).into_response())
        }
        ProxyAction::ListObjects => {
            require_bucket(&req.bucket)?;
            let objects: Vec<ObjectInfo> = source
                .list_objects(&req.bucket, &req.effective_filter())
                .await?
                .into_iter()
                .map(ObjectInfo::from)
                .collect();
            Ok(Json(ApiResponse::ok(objects)).into_response())
        }
        ProxyAction::DownloadObject => download_object(source.as_ref(), &req).await,
        ProxyAction::EstimateTransfer => {
            require_bucket(&req.bucket)?;
            let epochs = req
                .epochs
                .filter(|e| *e > 0)
                .unwrap_or(state.default_epochs);
            let estimate = Orchestrator::new(source, state.destination.clone())
                .estimate_batch(&req.bucket, &req.effective_filter(), epochs)
                .await?;
            Ok(Json(ApiResponse::ok(TransferEstimate {
                total_size: estimate.total_bytes,
                file_count: estimate.object_count,
                estimated_cost: estimate.total_cost,
                estimated_cost_wal: estimate.total_cost.as_wal(),
                epochs,
            }))
            .into_response())
        }
    }
}

async fn download_object(source: &dyn SourceStore, req: &ProxyRequest) -> ApiResult<Response> {
    if req.bucket.is_empty() || req.key.is_empty() {
        return Err(ApiError::BadRequest("Bucket and key are required".to_string()));
    }

    let body = source.fetch_object(&req.bucket, &req.key).await?;

    if body.size > INLINE_DOWNLOAD_LIMIT {
        info!(key = %req.key, size = body.size, "Streaming large object");
        let headers = [
            (CONTENT_TYPE, "application/octet-stream".to_string()),
            (CONTENT_LENGTH, body.size.to_string()),
            (
                CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", target_name_for(&req.key, false)),
            ),
        ];
        return Ok((headers, Body::from_stream(body.stream)).into_response());
    }

    let size = body.size;
    let data = body.materialize(INLINE_DOWNLOAD_LIMIT).await?;
    Ok(Json(ApiResponse::ok(InlineObject {
        key: req.key.clone(),
        size,
        data: base64::engine::general_purpose::STANDARD.encode(&data),
    }))
    .into_response())
}

/// `POST /api/s3/transfer`
///
/// Keys are moved one after another. A key that cannot be moved shows up as
/// a failed item; the call itself only fails on a malformed request.
pub async fn s3_transfer(
    State(state): State<AppState>,
    payload: Result<Json<TransferRequest>, JsonRejection>,
) -> ApiResult<Json<ApiResponse<Vec<TransferItem>>>> {
    let Json(req) = payload?;
    require_bucket(&req.bucket)?;
    let source = connect(&state, &req.credentials)?;

    let epochs = if req.epochs == 0 {
        state.default_epochs
    } else {
        req.epochs
    };
    let orchestrator = Orchestrator::new(source, state.destination.clone())
        .with_index(state.index.clone())
        .with_concurrency(1);

    info!(
        bucket = %req.bucket,
        keys = req.keys.len(),
        epochs,
        "Transfer request"
    );

    let mut items = Vec::with_capacity(req.keys.len());
    for key in &req.keys {
        let item = match orchestrator
            .transfer_single(&req.bucket, key, epochs, req.encrypt, &state.shutdown)
            .await
        {
            Ok(result) => TransferItem::from(result),
            Err(e) => {
                warn!("Transfer of {} rejected: {}", key, e);
                TransferItem::failed(key.as_str(), e.to_string())
            }
        };
        items.push(item);
    }

    Ok(Json(ApiResponse::ok(items)))
}

/// `POST /api/index/update`
pub async fn update_index(
    State(state): State<AppState>,
    payload: Result<Json<IndexUpdateRequest>, JsonRejection>,
) -> ApiResult<Json<StatusResponse>> {
    let Json(req) = payload?;

    state.index.put(
        req.file_name.clone(),
        IndexEntry {
            blob_id: req.blob_id,
            size: req.size,
            mod_time: Utc::now(),
            expiry_epoch: req.expiry_epoch,
        },
    )?;

    state.index.persist().map_err(|e| match e {
        MigrateError::IndexPersistFailed(_) => {
            warn!("{}", e);
            ApiError::Internal("Failed to update index".to_string())
        }
        other => ApiError::from(other),
    })?;

    debug!(file = %req.file_name, "Index updated from web upload");
    Ok(Json(StatusResponse::new("success")))
}

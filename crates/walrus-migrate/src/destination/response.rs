//! Normalization of store responses.
//!
//! A store call answers with an envelope holding one outcome key,
//! `newlyCreated` or `alreadyCertified`. The outcome body comes in a flat
//! encoding (fields directly on the outcome) or a nested one (fields under
//! `blobObject`). Each encoding has its own decoder and they are tried in
//! order until one yields a blob id.

use super::StoreReceipt;
use crate::cost::Cost;
use crate::error::{MigrateError, Result};
use serde_json::Value;

/// Fields pulled out of one outcome body, before size and cost resolution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodedBlob {
    pub blob_id: String,
    pub size: Option<u64>,
    pub storage_size: Option<u64>,
    pub end_epoch: Option<i64>,
    pub registered_epoch: Option<i64>,
    pub cost: u64,
    pub object_id: Option<String>,
}

/// A decoder returns `None` when the body is not in its encoding.
pub type Decoder = fn(&Value) -> Option<DecodedBlob>;

/// Candidate decoders, in the order they are attempted.
pub const DECODERS: &[(&str, Decoder)] = &[("modern", decode_flat), ("legacy", decode_nested)];

/// Parse a store response body.
///
/// `bytes_sent` is the size fallback when the response carries no positive
/// size of its own.
pub fn decode_store_response(body: &[u8], bytes_sent: u64) -> Result<StoreReceipt> {
    let envelope: Value = serde_json::from_slice(body)
        .map_err(|e| MigrateError::unrecognized(format!("invalid JSON: {}", e), body))?;

    let (outcome, already_existed) = if let Some(v) = non_null(&envelope, "newlyCreated") {
        (v, false)
    } else if let Some(v) = non_null(&envelope, "alreadyCertified") {
        (v, true)
    } else {
        return Err(MigrateError::unrecognized(
            "neither newlyCreated nor alreadyCertified present",
            body,
        ));
    };

    let decoded = DECODERS
        .iter()
        .find_map(|(_, decode)| decode(outcome))
        .ok_or_else(|| {
            let key = if already_existed {
                "alreadyCertified"
            } else {
                "newlyCreated"
            };
            MigrateError::unrecognized(format!("{} payload matched no known encoding", key), body)
        })?;

    let envelope_cost = positive_u64(&envelope, "cost");

    Ok(StoreReceipt {
        size: resolve_size(&[decoded.size, decoded.storage_size], bytes_sent),
        blob_id: decoded.blob_id,
        expiry_epoch: decoded.end_epoch,
        registered_epoch: decoded.registered_epoch,
        cost: Cost::from_frost(envelope_cost.unwrap_or(decoded.cost)),
        already_existed,
        object_id: decoded.object_id,
    })
}

/// Flat encoding: `{"blobId": .., "size": .., "storage": {..}, "endEpoch": ..}`.
pub fn decode_flat(outcome: &Value) -> Option<DecodedBlob> {
    let blob_id = non_empty_str(outcome, "blobId")?;
    let storage = outcome.get("storage");

    Some(DecodedBlob {
        blob_id,
        size: positive_u64(outcome, "size"),
        storage_size: storage.and_then(storage_size),
        end_epoch: positive_i64(outcome, "endEpoch").or_else(|| storage.and_then(storage_end_epoch)),
        registered_epoch: positive_i64(outcome, "registeredEpoch"),
        cost: positive_u64(outcome, "cost").unwrap_or(0),
        object_id: non_empty_str(outcome, "suiObjectId")
            .or_else(|| non_empty_str(outcome, "objectId")),
    })
}

/// Nested encoding: `{"blobObject": {"blobId": .., "id": .., "storage": {..}}, "cost": ..}`.
pub fn decode_nested(outcome: &Value) -> Option<DecodedBlob> {
    let object = outcome.get("blobObject")?;
    let blob_id = non_empty_str(object, "blobId")?;
    let storage = object.get("storage");

    Some(DecodedBlob {
        blob_id,
        size: positive_u64(object, "size"),
        storage_size: storage.and_then(storage_size),
        end_epoch: positive_i64(object, "endEpoch").or_else(|| storage.and_then(storage_end_epoch)),
        registered_epoch: positive_i64(object, "registeredEpoch"),
        cost: positive_u64(outcome, "cost").unwrap_or(0),
        object_id: non_empty_str(object, "id"),
    })
}

/// First positive candidate, else the number of bytes actually sent.
pub fn resolve_size(candidates: &[Option<u64>], bytes_sent: u64) -> u64 {
    candidates.iter().flatten().copied().find(|&s| s > 0).unwrap_or(bytes_sent)
}

fn storage_end_epoch(storage: &Value) -> Option<i64> {
    ["endEpoch", "end_epoch", "storage_end_epoch"]
        .iter()
        .find_map(|k| positive_i64(storage, k))
}

fn storage_size(storage: &Value) -> Option<u64> {
    ["storageSize", "storage_size"]
        .iter()
        .find_map(|k| positive_u64(storage, k))
}

fn non_null<'a>(value: &'a Value, key: &str) -> Option<&'a Value> {
    value.get(key).filter(|v| !v.is_null())
}

fn non_empty_str(value: &Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn positive_u64(value: &Value, key: &str) -> Option<u64> {
    value.get(key).and_then(Value::as_u64).filter(|&n| n > 0)
}

fn positive_i64(value: &Value, key: &str) -> Option<i64> {
    value.get(key).and_then(Value::as_i64).filter(|&n| n > 0)
}

//! Storage cost model for the destination network.
//!
//! Costs are computed in FROST, the smallest denomination. The model is a pure
//! function of payload size and storage duration so it can back both pre-flight
//! previews and per-item accounting after an upload.

use serde::Serialize;
use std::fmt;
use std::iter::Sum;
use std::ops::Add;

/// FROST per WAL.
pub const FROST_PER_WAL: u64 = 1_000_000_000;

/// Erasure-coding expansion applied to the raw payload.
pub const ENCODING_EXPANSION: u64 = 5;

/// Fixed per-blob metadata overhead.
pub const METADATA_OVERHEAD_BYTES: u64 = 64 * 1024 * 1024;

/// Billing granularity.
pub const BILLING_UNIT_BYTES: u64 = 1024 * 1024;

/// List price per MiB per epoch before subsidy.
pub const BASE_FROST_PER_MIB_EPOCH: u64 = 55_000;

/// The subsidy leaves one fifth of the list price.
pub const SUBSIDY_DIVISOR: u64 = 5;

/// Payloads under this size are billed for metadata overhead only.
pub const SMALL_BLOB_THRESHOLD_BYTES: u64 = 10 * 1024 * 1024;

/// An amount in FROST.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Cost {
    pub frost: u64,
}

impl Cost {
    pub const ZERO: Cost = Cost { frost: 0 };

    pub fn from_frost(frost: u64) -> Self {
        Self { frost }
    }

    /// Amount in whole WAL.
    pub fn as_wal(&self) -> f64 {
        self.frost as f64 / FROST_PER_WAL as f64
    }
}

impl Add for Cost {
    type Output = Cost;

    fn add(self, rhs: Cost) -> Cost {
        Cost {
            frost: self.frost.saturating_add(rhs.frost),
        }
    }
}

impl Sum for Cost {
    fn sum<I: Iterator<Item = Cost>>(iter: I) -> Cost {
        iter.fold(Cost::ZERO, Add::add)
    }
}

impl fmt::Display for Cost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6} WAL", self.as_wal())
    }
}

/// Size of the payload as billed, after encoding and metadata overhead.
///
/// Below [`SMALL_BLOB_THRESHOLD_BYTES`] the raw size is ignored entirely, so the
/// function steps up at the threshold instead of growing smoothly.
pub fn encoded_size(size_bytes: u64) -> u64 {
    if size_bytes < SMALL_BLOB_THRESHOLD_BYTES {
        METADATA_OVERHEAD_BYTES
    } else {
        size_bytes
            .saturating_mul(ENCODING_EXPANSION)
            .saturating_add(METADATA_OVERHEAD_BYTES)
    }
}

/// Estimate the cost of storing `size_bytes` for `epochs` epochs.
pub fn estimate(size_bytes: u64, epochs: u32) -> Cost {
    let billed_units = encoded_size(size_bytes).div_ceil(BILLING_UNIT_BYTES);
    let rate = BASE_FROST_PER_MIB_EPOCH / SUBSIDY_DIVISOR;
    Cost {
        frost: billed_units
            .saturating_mul(rate)
            .saturating_mul(u64::from(epochs)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIB: u64 = 1024 * 1024;

    #[test]
    fn test_small_files_cost_the_same() {
        let a = estimate(1_000, 5);
        let b = estimate(1_000_000, 5);
        assert_eq!(a, b);
        // 64 MiB * 11,000 FROST * 5 epochs
        assert_eq!(a.frost, 64 * 11_000 * 5);
    }

    #[test]
    fn test_threshold_discontinuity() {
        let below = estimate(SMALL_BLOB_THRESHOLD_BYTES - 1, 1);
        let at = estimate(SMALL_BLOB_THRESHOLD_BYTES, 1);
        assert_eq!(below.frost, 64 * 11_000);
        assert_eq!(at.frost, (50 + 64) * 11_000);
        assert!(at > below);
    }

    #[test]
    fn test_rounds_up_to_whole_mib() {
        // 20 MiB + 1 byte -> 100 MiB + 5 bytes encoded -> 165 MiB billed
        let cost = estimate(20 * MIB + 1, 1);
        assert_eq!(cost.frost, 165 * 11_000);
    }

    #[test]
    fn test_monotonic_in_epochs() {
        for size in [0, 512, 9 * MIB, 10 * MIB, 300 * MIB] {
            let mut last = Cost::ZERO;
            for epochs in 0..20 {
                let cost = estimate(size, epochs);
                assert!(cost >= last, "size {size} epochs {epochs}");
                last = cost;
            }
        }
    }

    #[test]
    fn test_zero_epochs_is_free() {
        assert_eq!(estimate(500 * MIB, 0), Cost::ZERO);
    }

    #[test]
    fn test_huge_sizes_saturate() {
        let cost = estimate(u64::MAX, u32::MAX);
        assert_eq!(cost.frost, u64::MAX);
    }

    #[test]
    fn test_display_and_sum() {
        let total: Cost = [Cost::from_frost(500_000_000), Cost::from_frost(250_000_000)]
            .into_iter()
            .sum();
        assert_eq!(total.frost, 750_000_000);
        assert_eq!(total.to_string(), "0.750000 WAL");
    }
}

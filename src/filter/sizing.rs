//! Filter Sizing
//!
//! Bit width and hash count for the existence filter, either fixed or derived
//! from an expected element count and a target false-positive rate.

use std::f64::consts::LN_2;

use serde::Serialize;

use crate::error::{Error, Result};

/// Minimum number of hash functions
pub const MIN_HASH_COUNT: u32 = 3;

/// Upper bound on hash functions (each is one round trip per check)
pub const MAX_HASH_COUNT: u32 = 16;

/// Baseline filter width: 2^32 bits (512 MiB if fully materialized)
pub const DEFAULT_BIT_WIDTH: u64 = 1 << 32;

/// Bit width and hash count of an existence filter.
///
/// Only obtainable through the validating constructors, so the width is
/// never zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FilterSizing {
    bit_width: u64,
    hash_count: u32,
}

impl Default for FilterSizing {
    fn default() -> Self {
        Self {
            bit_width: DEFAULT_BIT_WIDTH,
            hash_count: MIN_HASH_COUNT,
        }
    }
}

impl FilterSizing {
    /// Fixed sizing.
    pub fn new(bit_width: u64, hash_count: u32) -> Result<Self> {
        if bit_width == 0 {
            return Err(Error::Config("filter bit width must be non-zero".into()));
        }
        if !(MIN_HASH_COUNT..=MAX_HASH_COUNT).contains(&hash_count) {
            return Err(Error::Config(format!(
                "filter hash count must be within {}..={}, got {}",
                MIN_HASH_COUNT, MAX_HASH_COUNT, hash_count
            )));
        }
        Ok(Self {
            bit_width,
            hash_count,
        })
    }

    /// Number of addressable bits
    pub fn bit_width(&self) -> u64 {
        self.bit_width
    }

    /// Number of hash functions
    pub fn hash_count(&self) -> u32 {
        self.hash_count
    }

    /// Size for `expected_items` elements at false-positive rate `fpp`.
    ///
    /// `m = ceil(-n ln p / (ln 2)^2)`, `k = round(m / n * ln 2)`, with k
    /// clamped to `MIN_HASH_COUNT..=MAX_HASH_COUNT`.
    pub fn for_capacity(expected_items: u64, fpp: f64) -> Result<Self> {
        if expected_items == 0 {
            return Err(Error::Config("expected_items must be non-zero".into()));
        }
        if !(fpp > 0.0 && fpp < 1.0) {
            return Err(Error::Config(format!(
                "false_positive_rate must be within (0, 1), got {}",
                fpp
            )));
        }

        let n = expected_items as f64;
        let m = (-n * fpp.ln() / (LN_2 * LN_2)).ceil().max(1.0);
        let k = ((m / n) * LN_2).round() as u32;

        Ok(Self {
            bit_width: m as u64,
            hash_count: k.clamp(MIN_HASH_COUNT, MAX_HASH_COUNT),
        })
    }

    /// Expected false-positive rate after inserting `items` elements:
    /// `(1 - e^(-k n / m))^k`.
    pub fn false_positive_rate(&self, items: u64) -> f64 {
        let k = self.hash_count as f64;
        let exponent = -k * items as f64 / self.bit_width as f64;
        (1.0 - exponent.exp()).powf(k)
    }
}

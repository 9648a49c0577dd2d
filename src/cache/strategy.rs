//! Rebuild strategy selection.

use serde::{Deserialize, Serialize};

/// How a miss (or a logically expired entry) is repopulated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RebuildStrategy {
    /// Load on miss with no serialization. Absent records are tombstoned.
    PassThrough,

    /// One rebuild per key under a distributed lock; losers sleep and retry.
    #[default]
    Mutex,

    /// Entries never expire physically. A logically expired entry is served
    /// stale while one background task refreshes it.
    LogicalExpiration,
}

impl RebuildStrategy {
    /// Whether populated entries are stored inside a logical-expiry envelope.
    pub fn uses_envelope(self) -> bool {
        matches!(self, RebuildStrategy::LogicalExpiration)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RebuildStrategy::PassThrough => "pass_through",
            RebuildStrategy::Mutex => "mutex",
            RebuildStrategy::LogicalExpiration => "logical_expiration",
        }
    }
}

impl std::fmt::Display for RebuildStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RebuildStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "pass_through" | "passthrough" => Ok(RebuildStrategy::PassThrough),
            "mutex" => Ok(RebuildStrategy::Mutex),
            "logical_expiration" | "logical" => Ok(RebuildStrategy::LogicalExpiration),
            other => Err(format!("unknown rebuild strategy: {}", other)),
        }
    }
}

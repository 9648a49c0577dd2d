//! Read-Through Cache with Rebuild Protection
//!
//! Records are served from the shared store and rebuilt from the record
//! store on a miss.
//!
//! # Read Path
//!
//! ```text
//!   lookup(id)
//!      │
//!      ├─ filter says absent ──────────────────────────▶ Absent(Filtered)
//!      │
//!      ├─ GET cache:<prefix><id>
//!      │     ├─ ""  (tombstone) ───────────────────────▶ Absent(Tombstone)
//!      │     ├─ fresh ─────────────────────────────────▶ Hit
//!      │     ├─ logically stale ── spawn refresh ──────▶ Hit (stale)
//!      │     └─ miss
//!      │
//!      └─ try_lock(lock:<resource>)
//!            ├─ granted: re-read, load, write entry/tombstone, unlock
//!            └─ busy:    sleep, retry (bounded) ───────▶ Absent(Contended)
//! ```
//!
//! # Strategies
//!
//! | Strategy            | Entry layout        | On miss              | On logical expiry      |
//! |---------------------|---------------------|----------------------|------------------------|
//! | `PassThrough`       | plain JSON + TTL    | load inline          | n/a                    |
//! | `Mutex`             | plain JSON + TTL    | load under lock      | n/a                    |
//! | `LogicalExpiration` | envelope, no TTL    | load under lock      | serve stale, refresh   |
//!
//! Tombstones always carry the short tombstone TTL.

mod entry;
mod metrics;
mod outcome;
mod policy;
mod strategy;

pub use entry::{CachedValue, LogicalEnvelope, TOMBSTONE};
pub use metrics::{CacheMetrics, CacheMetricsSnapshot};
pub use outcome::{AbsentReason, LookupOutcome};
pub use policy::CacheRebuildPolicy;
pub use strategy::RebuildStrategy;

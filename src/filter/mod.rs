//! Existence Filter
//!
//! Guards the read path against cache penetration: lookups for IDs that
//! were never created are answered "absent" without touching the cache or
//! the database.
//!
//! # Design
//!
//! ```text
//!   id ──▶ SHA-256(salt_0 ‖ id) mod m ──┐
//!      ──▶ SHA-256(salt_1 ‖ id) mod m ──┼──▶ GETBIT × k on `bloom:<name>`
//!      ──▶ SHA-256(salt_2 ‖ id) mod m ──┘
//! ```
//!
//! - Bits live in the shared store, populated at startup and on creation
//! - Any clear bit means "definitely absent"; all set means "maybe present"
//! - Store failures fail open so the filter never reduces read availability

mod bloom;
mod sizing;

#[cfg(test)]
mod proptest;

pub use bloom::ExistenceFilter;
pub use sizing::{FilterSizing, DEFAULT_BIT_WIDTH, MAX_HASH_COUNT, MIN_HASH_COUNT};

//! ShopGuard - Cache Consistency and Distributed Concurrency Control
//!
//! The layer between stateless retail application instances and a shared
//! key-value store: existence filtering, protected read-through caching, a
//! distributed lock, a distributed ID generator, and the flash-sale
//! ("seckill") admission protocol that composes them.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  ShopService / ShopTypeService          InventoryAdmissionController│
//! │          │                                   │        │            │
//! │          ▼                                   ▼        ▼            │
//! │  CacheRebuildPolicy ──▶ ExistenceFilter   DistributedLock  IdGenerator│
//! │          │                  │                 │          │         │
//! │          └──────────────────┴────────┬────────┴──────────┘         │
//! │                                      ▼                             │
//! │                         KvStore (shared store port)                │
//! │                                                                    │
//! │  Record store ports: Shop / ShopType / Voucher / Order repositories│
//! └───────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`adapters`] - In-memory implementations of the ports
//! - [`cache`] - Protected read-through cache (mutex, logical expiration, pass-through)
//! - [`clock`] - Wall-clock port
//! - [`config`] - Configuration and key layout
//! - [`domain`] - Records, events, and ports
//! - [`error`] - Error types
//! - [`filter`] - Bloom-style existence filter over the shared store
//! - [`idgen`] - Time-ordered 64-bit ID generator
//! - [`lock`] - Ownership-checked distributed lock
//! - [`monitoring`] - Prometheus exposition and health checks
//! - [`seckill`] - Flash-sale admission controller
//! - [`service`] - Shop and category services, filter bootstrap

pub mod adapters;
pub mod cache;
pub mod clock;
pub mod config;
pub mod domain;
pub mod error;
pub mod filter;
pub mod idgen;
pub mod lock;
pub mod monitoring;
pub mod seckill;
pub mod service;

// Re-export commonly used types
pub use cache::{AbsentReason, CacheRebuildPolicy, LookupOutcome, RebuildStrategy};
pub use config::GuardConfig;
pub use error::{Error, Result};
pub use filter::ExistenceFilter;
pub use idgen::IdGenerator;
pub use lock::{DistributedLock, HeldLock};
pub use seckill::{AdmissionOutcome, InventoryAdmissionController, Rejection};

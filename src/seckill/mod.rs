//! Seckill (Flash Sale) Admission
//!
//! ```text
//!   admit(voucher, buyer)
//!     │ buyer absent ─────────────────────────────▶ Unauthenticated
//!     │ voucher lookup ── missing ────────────────▶ VoucherNotFound
//!     │ window check ──── before / after ─────────▶ NotStarted / Ended
//!     │ stock < 1 (advisory) ─────────────────────▶ OutOfStock
//!     │ try_lock(order:<buyer>, 1200s) ── busy ───▶ DuplicateInProgress
//!     │   ├─ re-validate voucher and window
//!     │   ├─ existing order for buyer ────────────▶ AlreadyPurchased
//!     │   ├─ UPDATE stock-1 WHERE stock>0 ── 0 ───▶ OutOfStock
//!     │   ├─ next_id("order"), save unpaid order
//!     │   └─ unlock (always)
//!     ▼
//!   Admitted(order id)
//! ```

mod controller;
mod metrics;
mod rejection;

pub use controller::InventoryAdmissionController;
pub use metrics::{AdmissionMetrics, AdmissionMetricsSnapshot};
pub use rejection::{AdmissionOutcome, Rejection, RejectionCategory};

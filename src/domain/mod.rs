//! Domain Layer
//!
//! Records, value objects, events, and the ports the guard components
//! depend on.
//!
//! - **Model** (`model.rs`) - Shops, categories, vouchers, orders, IDs
//! - **Ports** (`ports.rs`) - Trait abstractions for the shared store and record store
//! - **Events** (`events.rs`) - Domain events for audit and decoupling
//!
//! # Usage
//!
//! ```ignore
//! use shopguard::domain::ports::{KvStore, VoucherRepository};
//!
//! async fn remaining<V: VoucherRepository>(vouchers: &V, id: VoucherId) -> Result<u32> {
//!     Ok(vouchers.find_seckill(id).await?.map(|v| v.stock).unwrap_or(0))
//! }
//! ```

pub mod events;
pub mod model;
pub mod ports;

pub use events::DomainEvent;
pub use model::{
    BuyerId, OrderId, OrderStatus, PayType, SaleWindow, SeckillVoucher, Shop, ShopId, ShopType,
    VoucherId, VoucherOrder,
};
pub use ports::{
    EventPublisher, KeyTtl, KvStore, OrderRepository, RecordSource, ShopRepository,
    ShopTypeRepository, VoucherRepository,
};

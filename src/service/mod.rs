//! Application services built on the guard components.
//!
//! - **Shops** (`shop.rs`) - protected point reads, update-then-invalidate
//! - **Categories** (`shop_type.rs`) - one cached, ordered list
//! - **Bootstrap** (`bootstrap.rs`) - startup population of the shop filter

mod bootstrap;
mod shop;
mod shop_type;

pub use bootstrap::{BootstrapReport, FilterBootstrap};
pub use shop::{ShopRecords, ShopService};
pub use shop_type::ShopTypeService;

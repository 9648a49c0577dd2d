//! Domain Model
//!
//! Value objects and records that flow through the guard. Records are
//! serialized to JSON when cached.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// Value Objects
// =============================================================================

macro_rules! numeric_id {
    ($(#[$meta:meta])* $name:ident, $inner:ty) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub $inner);

        impl $name {
            pub fn new(id: $inner) -> Self {
                Self(id)
            }

            pub fn get(&self) -> $inner {
                self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<$inner> for $name {
            fn from(id: $inner) -> Self {
                Self(id)
            }
        }
    };
}

numeric_id!(
    /// Shop identifier (value object).
    ShopId,
    u64
);

numeric_id!(
    /// Authenticated buyer identifier (value object).
    BuyerId,
    u64
);

numeric_id!(
    /// Seckill voucher identifier (value object).
    VoucherId,
    u64
);

numeric_id!(
    /// Order identifier minted by the ID generator.
    OrderId,
    i64
);

// =============================================================================
// Records
// =============================================================================

/// Shop record served through the read-through cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Shop {
    pub id: ShopId,
    pub name: String,
    pub type_id: u64,
    pub area: Option<String>,
    pub address: String,
    /// Average price per person, in cents
    pub avg_price: u64,
    /// Rating times ten (e.g. 47 = 4.7)
    pub score: u32,
    pub sold: u64,
    pub open_hours: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl Shop {
    /// Minimal shop used by bootstraps and tests.
    pub fn new(id: u64, name: impl Into<String>, type_id: u64) -> Self {
        Self {
            id: ShopId(id),
            name: name.into(),
            type_id,
            area: None,
            address: String::new(),
            avg_price: 0,
            score: 0,
            sold: 0,
            open_hours: None,
            updated_at: Utc::now(),
        }
    }
}

/// Shop category shown on the landing page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShopType {
    pub id: u64,
    pub name: String,
    pub icon: String,
    /// Display order, ascending
    pub sort: i32,
}

/// Seckill voucher inventory record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeckillVoucher {
    pub voucher_id: VoucherId,
    /// Remaining stock; never negative
    pub stock: u32,
    pub begin_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

impl SeckillVoucher {
    /// Sale window relative to `now`.
    pub fn window_state(&self, now: DateTime<Utc>) -> SaleWindow {
        if self.begin_time > now {
            SaleWindow::NotStarted
        } else if self.end_time < now {
            SaleWindow::Ended
        } else {
            SaleWindow::Open
        }
    }
}

/// Position of "now" relative to a voucher's validity window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaleWindow {
    NotStarted,
    Open,
    Ended,
}

/// How an order is paid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PayType {
    Balance = 1,
    Alipay = 2,
    WeChat = 3,
}

/// Order lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    Unpaid = 1,
    Paid = 2,
    Redeemed = 3,
    Cancelled = 4,
    Refunding = 5,
    Refunded = 6,
}

/// Voucher order created by a successful admission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoucherOrder {
    pub id: OrderId,
    pub buyer_id: BuyerId,
    pub voucher_id: VoucherId,
    pub pay_type: PayType,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
}

impl VoucherOrder {
    /// New unpaid order paid from balance.
    pub fn unpaid(
        id: OrderId,
        buyer_id: BuyerId,
        voucher_id: VoucherId,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            buyer_id,
            voucher_id,
            pay_type: PayType::Balance,
            status: OrderStatus::Unpaid,
            created_at,
        }
    }
}

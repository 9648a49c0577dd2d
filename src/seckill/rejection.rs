//! Admission outcomes and the rejection taxonomy.

use serde::Serialize;

use crate::domain::model::OrderId;

/// Why a buyer was not admitted. These are business answers, not failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Rejection {
    /// No buyer identity on the request
    Unauthenticated,
    VoucherNotFound,
    /// Before the voucher's begin time
    NotStarted,
    /// After the voucher's end time
    Ended,
    OutOfStock,
    /// The same buyer already has an admission in flight
    DuplicateInProgress,
    /// The buyer already holds an order for this voucher
    AlreadyPurchased,
}

/// Coarse classes callers map to responses and retry decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RejectionCategory {
    Unauthenticated,
    NotFound,
    InvalidWindow,
    OutOfStock,
    TransientContention,
    Duplicate,
}

impl Rejection {
    pub const COUNT: usize = 7;

    pub const ALL: [Rejection; Self::COUNT] = [
        Rejection::Unauthenticated,
        Rejection::VoucherNotFound,
        Rejection::NotStarted,
        Rejection::Ended,
        Rejection::OutOfStock,
        Rejection::DuplicateInProgress,
        Rejection::AlreadyPurchased,
    ];

    pub fn category(self) -> RejectionCategory {
        match self {
            Rejection::Unauthenticated => RejectionCategory::Unauthenticated,
            Rejection::VoucherNotFound => RejectionCategory::NotFound,
            Rejection::NotStarted | Rejection::Ended => RejectionCategory::InvalidWindow,
            Rejection::OutOfStock => RejectionCategory::OutOfStock,
            Rejection::DuplicateInProgress => RejectionCategory::TransientContention,
            Rejection::AlreadyPurchased => RejectionCategory::Duplicate,
        }
    }

    /// A terminal rejection will not change if the buyer retries.
    ///
    /// `Unauthenticated`, `NotStarted` and `DuplicateInProgress` may succeed later.
    pub fn is_terminal(self) -> bool {
        !matches!(
            self,
            Rejection::Unauthenticated | Rejection::DuplicateInProgress | Rejection::NotStarted
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Rejection::Unauthenticated => "unauthenticated",
            Rejection::VoucherNotFound => "voucher_not_found",
            Rejection::NotStarted => "not_started",
            Rejection::Ended => "ended",
            Rejection::OutOfStock => "out_of_stock",
            Rejection::DuplicateInProgress => "duplicate_in_progress",
            Rejection::AlreadyPurchased => "already_purchased",
        }
    }

    pub(crate) fn index(self) -> usize {
        self as usize
    }
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let message = match self {
            Rejection::Unauthenticated => "login required",
            Rejection::VoucherNotFound => "voucher does not exist",
            Rejection::NotStarted => "sale has not started",
            Rejection::Ended => "sale has ended",
            Rejection::OutOfStock => "out of stock",
            Rejection::DuplicateInProgress => "an order for this buyer is already being placed",
            Rejection::AlreadyPurchased => "buyer already purchased this voucher",
        };
        f.write_str(message)
    }
}

/// Result of one admission attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionOutcome {
    Admitted(OrderId),
    Rejected(Rejection),
}

impl AdmissionOutcome {
    pub fn is_admitted(&self) -> bool {
        matches!(self, AdmissionOutcome::Admitted(_))
    }

    pub fn order_id(&self) -> Option<OrderId> {
        match self {
            AdmissionOutcome::Admitted(id) => Some(*id),
            AdmissionOutcome::Rejected(_) => None,
        }
    }

    pub fn rejection(&self) -> Option<Rejection> {
        match self {
            AdmissionOutcome::Admitted(_) => None,
            AdmissionOutcome::Rejected(reason) => Some(*reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_taxonomy() {
        assert_eq!(Rejection::NotStarted.category(), RejectionCategory::InvalidWindow);
        assert_eq!(Rejection::Ended.category(), RejectionCategory::InvalidWindow);
        assert_eq!(
            Rejection::DuplicateInProgress.category(),
            RejectionCategory::TransientContention
        );
        assert!(Rejection::OutOfStock.is_terminal());
        assert!(!Rejection::DuplicateInProgress.is_terminal());
    }

    #[test]
    fn test_indices_match_all() {
        for (i, reason) in Rejection::ALL.iter().enumerate() {
            assert_eq!(reason.index(), i);
        }
    }

    #[test]
    fn test_outcome_accessors() {
        let ok = AdmissionOutcome::Admitted(OrderId(7));
        assert!(ok.is_admitted());
        assert_eq!(ok.order_id(), Some(OrderId(7)));

        let no = AdmissionOutcome::Rejected(Rejection::OutOfStock);
        assert_eq!(no.rejection(), Some(Rejection::OutOfStock));
        assert_eq!(no.order_id(), None);
        assert_eq!(Rejection::OutOfStock.to_string(), "out of stock");
    }
}

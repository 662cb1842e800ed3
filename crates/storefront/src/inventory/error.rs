//! Inventory engine errors.

use thiserror::Error;

use stockpile_core::{CartLineId, OrderId, ProductId};

use crate::db::RepositoryError;

/// Errors returned by cart and order operations.
///
/// Every variant except `Repository` and `CommitFailed` is a rejection that
/// left storage untouched.
#[derive(Debug, Error)]
pub enum InventoryError {
    /// The product does not exist or is not active.
    #[error("product {product_id} not found")]
    ProductNotFound { product_id: ProductId },

    /// The ledger cannot cover the requested debit.
    ///
    /// `available` is what can still be reserved; `held` is what the user
    /// already holds in an active line for the product, if any.
    #[error("insufficient stock for product {product_id}: requested {requested}, available {available}")]
    InsufficientStock {
        product_id: ProductId,
        available: i32,
        requested: i32,
        held: Option<i32>,
    },

    /// No active cart line with this ID belongs to the caller.
    #[error("cart line {cart_line_id} not found")]
    CartLineNotFound { cart_line_id: CartLineId },

    /// An order item is not covered by the caller's active reservation.
    #[error("no reservation covers {requested} units of product {product_id} (reserved {reserved})")]
    LineNotFound {
        product_id: ProductId,
        requested: i32,
        reserved: i32,
    },

    /// No order with this ID belongs to the caller.
    #[error("order {order_id} not found")]
    OrderNotFound { order_id: OrderId },

    /// Malformed input.
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    /// Storage failed while writing an order; nothing was applied.
    #[error("order commit failed: {0}")]
    CommitFailed(#[source] RepositoryError),

    /// A product lock could not be acquired in time.
    #[error("product {product_id} is busy")]
    Busy { product_id: ProductId },

    /// Storage failure outside order commit.
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl InventoryError {
    /// Build a `Validation` error.
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Attach the caller's existing reservation to an `InsufficientStock`.
    #[must_use]
    pub fn with_held(self, held: Option<i32>) -> Self {
        match self {
            Self::InsufficientStock {
                product_id,
                available,
                requested,
                ..
            } => Self::InsufficientStock {
                product_id,
                available,
                requested,
                held,
            },
            other => other,
        }
    }

    /// Whether retrying the same call later may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Busy { .. })
    }
}

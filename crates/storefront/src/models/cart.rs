//! Cart line domain types.

use chrono::{DateTime, Utc};
use serde::Serialize;

use stockpile_core::{CartLineId, CartLineStatus, OrderId, Price, ProductId, Quantity, UserId};

/// A user's reservation of a quantity of one product.
///
/// While `status` is `Active`, `quantity` units have been debited from the
/// product's stock and are held for `user_id`. At most one active line exists
/// per `(user_id, product_id)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CartLine {
    /// Line ID.
    pub id: CartLineId,
    /// Owner.
    pub user_id: UserId,
    /// Reserved product.
    pub product_id: ProductId,
    /// Reserved units.
    pub quantity: Quantity,
    /// Lifecycle status.
    pub status: CartLineStatus,
    /// Order that consumed this line (set together with `Consumed`).
    pub order_id: Option<OrderId>,
    /// When the line was first created.
    pub added_at: DateTime<Utc>,
    /// When the quantity or status last changed.
    pub updated_at: DateTime<Utc>,
}

impl CartLine {
    /// Whether the line is a live reservation.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.status.is_active()
    }
}

/// Input for inserting a cart line.
///
/// Reservations are inserted `Active`; order commit inserts the split-off part
/// of a partially ordered line directly as `Consumed`.
#[derive(Debug, Clone)]
pub struct NewCartLine {
    pub user_id: UserId,
    pub product_id: ProductId,
    pub quantity: Quantity,
    pub status: CartLineStatus,
    pub at: DateTime<Utc>,
}

impl NewCartLine {
    /// A fresh active reservation.
    #[must_use]
    pub const fn active(
        user_id: UserId,
        product_id: ProductId,
        quantity: Quantity,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id,
            product_id,
            quantity,
            status: CartLineStatus::Active,
            at,
        }
    }
}

/// Read model for listing a cart: the line joined with product details.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CartLineSummary {
    pub cart_line_id: CartLineId,
    pub product_id: ProductId,
    pub product_name: String,
    pub price: Price,
    pub quantity: Quantity,
    /// `price × quantity`.
    pub subtotal: Price,
    /// The product's current available stock.
    pub stock_quantity: i32,
    pub added_at: DateTime<Utc>,
}

impl CartLineSummary {
    /// Build a summary from a line and the product it reserves.
    #[must_use]
    pub fn new(line: &CartLine, product_name: String, price: Price, stock_quantity: i32) -> Self {
        Self {
            cart_line_id: line.id,
            product_id: line.product_id,
            product_name,
            price,
            quantity: line.quantity,
            subtotal: price.line_total(line.quantity),
            stock_quantity,
            added_at: line.added_at,
        }
    }
}

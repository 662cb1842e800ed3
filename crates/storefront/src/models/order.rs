//! Order domain types.

use chrono::{DateTime, Utc};
use serde::Serialize;

use stockpile_core::{CartLineId, OrderId, Price, ProductId, Quantity, UserId};

/// A committed order.
///
/// Immutable once written, except for `is_paid`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Order {
    /// Order ID.
    pub id: OrderId,
    /// Ordering user.
    pub user_id: UserId,
    /// Lines in request order.
    pub lines: Vec<OrderLine>,
    /// `Σ quantity × unit_price` over `lines`.
    pub total_price: Price,
    /// Delivery address.
    pub address: String,
    /// Payment flag recorded on behalf of an external payment system.
    pub is_paid: bool,
    /// When the order was committed.
    pub created_at: DateTime<Utc>,
}

/// One product within an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderLine {
    /// The consumed cart line backing this order line.
    pub cart_line_id: CartLineId,
    pub product_id: ProductId,
    pub quantity: Quantity,
    pub unit_price: Price,
}

impl OrderLine {
    /// `quantity × unit_price`.
    #[must_use]
    pub fn line_total(&self) -> Price {
        self.unit_price.line_total(self.quantity)
    }
}

/// Input for writing an order row with its lines.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub user_id: UserId,
    pub lines: Vec<NewOrderLine>,
    pub total_price: Price,
    pub address: String,
    pub is_paid: bool,
    pub created_at: DateTime<Utc>,
}

/// Input for one order line.
#[derive(Debug, Clone)]
pub struct NewOrderLine {
    pub cart_line_id: CartLineId,
    pub product_id: ProductId,
    pub quantity: Quantity,
    pub unit_price: Price,
}

/// Short form returned by order creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OrderSummary {
    pub order_id: OrderId,
    pub total_price: Price,
}

impl From<&Order> for OrderSummary {
    fn from(order: &Order) -> Self {
        Self {
            order_id: order.id,
            total_price: order.total_price,
        }
    }
}

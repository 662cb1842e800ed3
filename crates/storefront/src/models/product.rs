//! Product domain type (the slice of the catalog the inventory engine reads).

use chrono::{DateTime, Utc};
use serde::Serialize;

use stockpile_core::{CategoryId, Price, ProductId};

/// A catalog product together with its available-stock counter.
///
/// `stock` is the ledger value: units that can still be reserved. It is never
/// negative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Product {
    /// Product ID.
    pub id: ProductId,
    /// Display name.
    pub name: String,
    /// Current unit price.
    pub price: Price,
    /// Units available for reservation.
    pub stock: i32,
    /// Inactive products cannot be added to carts.
    pub is_active: bool,
    /// Owning category, if any.
    pub category_id: Option<CategoryId>,
    /// When the product row last changed.
    pub updated_at: DateTime<Utc>,
}

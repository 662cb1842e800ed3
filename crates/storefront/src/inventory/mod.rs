//! Inventory reservation and order commit engine.
//!
//! # Model
//!
//! Each product carries an available-stock counter ([`ledger`]). Adding to a
//! cart debits it immediately, so reserved units are never sold twice; removing
//! or clearing credits them back. Committing an order converts reservations
//! into order lines without touching the counter.
//!
//! # Concurrency
//!
//! All stock and cart-line mutations for a product run under that product's
//! lock from the [`ReservationCoordinator`] and inside one store transaction.
//! The lock serializes callers; the transaction makes each operation's writes
//! visible all at once or not at all.

pub mod cart;
pub mod coordinator;
mod error;
pub mod ledger;
pub mod orders;

use std::sync::Arc;

pub use cart::{AddedItem, CartService, RemovedItem};
pub use coordinator::{LockPolicy, ReservationCoordinator, ReservationGuard};
pub use error::InventoryError;
pub use orders::{OrderItem, OrderRequest, OrderService};

use stockpile_core::Quantity;

use crate::db::InventoryStore;

/// Parse a caller-supplied quantity, naming `field` on rejection.
///
/// # Errors
///
/// Returns `InventoryError::Validation` for zero, negative or oversized values.
pub fn parse_quantity(field: &str, raw: i64) -> Result<Quantity, InventoryError> {
    Quantity::from_i64(raw).map_err(|e| InventoryError::validation(field, e.to_string()))
}

/// Cart and order services sharing one store and one coordinator.
#[derive(Clone)]
pub struct InventoryEngine {
    cart: CartService,
    orders: OrderService,
}

impl InventoryEngine {
    /// Wire the services over `store` with a fresh coordinator.
    #[must_use]
    pub fn new(store: Arc<dyn InventoryStore>, policy: LockPolicy) -> Self {
        let coordinator = Arc::new(ReservationCoordinator::new(policy));
        Self {
            cart: CartService::new(Arc::clone(&store), Arc::clone(&coordinator)),
            orders: OrderService::new(store, coordinator),
        }
    }

    /// Cart operations.
    #[must_use]
    pub const fn cart(&self) -> &CartService {
        &self.cart
    }

    /// Order operations.
    #[must_use]
    pub const fn orders(&self) -> &OrderService {
        &self.orders
    }
}

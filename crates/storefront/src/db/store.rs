//! Storage seam for the inventory engine.
//!
//! [`InventoryStore`] serves committed reads and opens transactions.
//! [`StoreTx`] is a unit of work: everything written through it becomes
//! visible together on [`StoreTx::commit`], and dropping it uncommitted
//! discards every write.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use stockpile_core::{CartLineId, OrderId, ProductId, Quantity, UserId};

use super::RepositoryError;
use crate::models::{CartLine, CartLineSummary, NewCartLine, NewOrder, Order, Product};

/// Committed-state access plus transaction factory.
#[async_trait]
pub trait InventoryStore: Send + Sync {
    /// Open a unit of work.
    async fn begin(&self) -> Result<Box<dyn StoreTx>, RepositoryError>;

    /// Fetch a product by ID.
    async fn product(&self, id: ProductId) -> Result<Option<Product>, RepositoryError>;

    /// Fetch a cart line by ID regardless of owner or status.
    async fn cart_line(&self, id: CartLineId) -> Result<Option<CartLine>, RepositoryError>;

    /// A user's active lines, oldest first.
    async fn active_lines(&self, user_id: UserId) -> Result<Vec<CartLine>, RepositoryError>;

    /// A user's active lines joined with product details, oldest first.
    async fn cart_summaries(
        &self,
        user_id: UserId,
    ) -> Result<Vec<CartLineSummary>, RepositoryError>;

    /// Fetch an order owned by `user_id`.
    async fn order(&self, user_id: UserId, id: OrderId) -> Result<Option<Order>, RepositoryError>;

    /// A user's orders, newest first.
    async fn orders(&self, user_id: UserId) -> Result<Vec<Order>, RepositoryError>;

    /// Set `is_paid` on an order owned by `user_id`, returning the updated order.
    async fn mark_paid(&self, user_id: UserId, id: OrderId)
    -> Result<Option<Order>, RepositoryError>;

    /// Check that the backing storage is reachable.
    async fn ping(&self) -> Result<(), RepositoryError>;
}

/// A unit of work over products, cart lines and orders.
#[async_trait]
pub trait StoreTx: Send {
    /// Read a product and, where the backend supports it, row-lock it for the
    /// rest of the transaction.
    async fn product_for_update(&mut self, id: ProductId)
    -> Result<Option<Product>, RepositoryError>;

    /// Overwrite a product's available stock.
    async fn set_stock(&mut self, id: ProductId, stock: i32) -> Result<(), RepositoryError>;

    /// The user's active line for a product, if any.
    async fn active_line(
        &mut self,
        user_id: UserId,
        product_id: ProductId,
    ) -> Result<Option<CartLine>, RepositoryError>;

    /// Fetch a cart line by ID as seen by this transaction.
    async fn cart_line(&mut self, id: CartLineId) -> Result<Option<CartLine>, RepositoryError>;

    /// All of the user's active lines as seen by this transaction, oldest first.
    async fn active_lines(&mut self, user_id: UserId) -> Result<Vec<CartLine>, RepositoryError>;

    /// Insert a cart line.
    ///
    /// Fails with `Conflict` when an active line already exists for the same
    /// user and product.
    async fn insert_line(&mut self, line: NewCartLine) -> Result<CartLine, RepositoryError>;

    /// Change an active line's quantity.
    async fn set_line_quantity(
        &mut self,
        id: CartLineId,
        quantity: Quantity,
        at: DateTime<Utc>,
    ) -> Result<CartLine, RepositoryError>;

    /// Delete a line.
    async fn delete_line(&mut self, id: CartLineId) -> Result<(), RepositoryError>;

    /// Mark a line `Consumed` by `order_id`.
    async fn consume_line(
        &mut self,
        id: CartLineId,
        order_id: OrderId,
        at: DateTime<Utc>,
    ) -> Result<(), RepositoryError>;

    /// Write an order with its lines.
    async fn insert_order(&mut self, order: NewOrder) -> Result<Order, RepositoryError>;

    /// Make every write visible atomically.
    async fn commit(self: Box<Self>) -> Result<(), RepositoryError>;
}

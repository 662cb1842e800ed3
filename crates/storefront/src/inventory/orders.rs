//! Order commit: convert reservations into a permanent order.
//!
//! Committing an order never touches the stock ledger. Units were debited
//! when they were reserved; the order only changes who owns them, by moving
//! the covering cart lines from `Active` to `Consumed`.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use tracing::{info, instrument, warn};

use stockpile_core::{CartLineStatus, OrderId, Price, ProductId, Quantity, UserId};

use super::InventoryError;
use super::coordinator::ReservationCoordinator;
use crate::db::{InventoryStore, RepositoryError, StoreTx};
use crate::models::{CartLine, NewCartLine, NewOrder, NewOrderLine, Order};

/// One requested order item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderItem {
    pub product_id: ProductId,
    pub quantity: Quantity,
    /// Price the client displayed, if it sent one. Informational only.
    pub quoted_price: Option<Price>,
}

/// A request to commit an order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderRequest {
    pub items: Vec<OrderItem>,
    pub address: String,
    pub is_paid: bool,
}

/// A validated item ready to be written.
struct PlannedLine {
    line: CartLine,
    quantity: Quantity,
    unit_price: Price,
}

/// Commits orders and reads them back.
#[derive(Clone)]
pub struct OrderService {
    store: Arc<dyn InventoryStore>,
    coordinator: Arc<ReservationCoordinator>,
}

impl OrderService {
    /// Create an order service.
    #[must_use]
    pub fn new(store: Arc<dyn InventoryStore>, coordinator: Arc<ReservationCoordinator>) -> Self {
        Self { store, coordinator }
    }

    /// Commit an order from the user's active reservations.
    ///
    /// Every item must be covered by an active line of the same product with
    /// at least the ordered quantity. A fully ordered line is consumed; a
    /// partially ordered one is split, the ordered part consumed and the
    /// remainder left active. Unit prices come from the product record.
    ///
    /// All items are checked before anything is written, and all writes
    /// commit together.
    ///
    /// # Errors
    ///
    /// - `Validation` for an empty item list, a blank address or a repeated
    ///   product
    /// - `LineNotFound` for an item without a covering reservation
    /// - `Busy` when a product lock cannot be acquired
    /// - `CommitFailed` when storage fails while writing; nothing is applied
    #[instrument(skip(self, request), fields(user_id = %user_id, items = request.items.len()))]
    pub async fn create_order(
        &self,
        user_id: UserId,
        request: OrderRequest,
    ) -> Result<Order, InventoryError> {
        validate_request(&request)?;
        let address = request.address.trim().to_owned();

        let guard = self
            .coordinator
            .acquire_all(request.items.iter().map(|i| i.product_id))
            .await?;
        let mut tx = self.store.begin().await?;

        let mut plan = Vec::with_capacity(request.items.len());
        for item in &request.items {
            plan.push(plan_item(tx.as_mut(), user_id, item).await?);
        }

        let order = write_order(tx.as_mut(), user_id, plan, address, request.is_paid)
            .await
            .map_err(InventoryError::CommitFailed)?;
        tx.commit().await.map_err(InventoryError::CommitFailed)?;
        drop(guard);

        info!(order_id = %order.id, total_price = %order.total_price, "order committed");
        Ok(order)
    }

    /// Fetch one of the user's orders.
    ///
    /// # Errors
    ///
    /// Returns `OrderNotFound` if it does not exist or belongs to another user.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn get_order(&self, user_id: UserId, order_id: OrderId) -> Result<Order, InventoryError> {
        self.store
            .order(user_id, order_id)
            .await?
            .ok_or(InventoryError::OrderNotFound { order_id })
    }

    /// The user's orders, newest first.
    ///
    /// # Errors
    ///
    /// Returns `InventoryError::Repository` on storage failure.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn list_orders(&self, user_id: UserId) -> Result<Vec<Order>, InventoryError> {
        Ok(self.store.orders(user_id).await?)
    }

    /// Record that one of the user's orders has been paid.
    ///
    /// Idempotent.
    ///
    /// # Errors
    ///
    /// Returns `OrderNotFound` if it does not exist or belongs to another user.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn mark_paid(&self, user_id: UserId, order_id: OrderId) -> Result<Order, InventoryError> {
        let order = self
            .store
            .mark_paid(user_id, order_id)
            .await?
            .ok_or(InventoryError::OrderNotFound { order_id })?;
        info!("order marked paid");
        Ok(order)
    }
}

fn validate_request(request: &OrderRequest) -> Result<(), InventoryError> {
    if request.items.is_empty() {
        return Err(InventoryError::validation("items", "at least one item is required"));
    }
    if request.address.trim().is_empty() {
        return Err(InventoryError::validation("address", "address is required"));
    }

    let mut seen = HashSet::with_capacity(request.items.len());
    for (index, item) in request.items.iter().enumerate() {
        if !seen.insert(item.product_id) {
            return Err(InventoryError::validation(
                format!("items[{index}].product_id"),
                format!("product {} appears more than once", item.product_id),
            ));
        }
    }
    Ok(())
}

async fn plan_item(
    tx: &mut dyn StoreTx,
    user_id: UserId,
    item: &OrderItem,
) -> Result<PlannedLine, InventoryError> {
    // Product row lock before the line read, as in `add_item`. An unknown
    // product cannot have a line.
    let product = tx.product_for_update(item.product_id).await?;
    let line = if product.is_some() {
        tx.active_line(user_id, item.product_id).await?
    } else {
        None
    };

    let (product, line) = match (product, line) {
        (Some(product), Some(line)) if line.quantity >= item.quantity => (product, line),
        (_, other) => {
            return Err(InventoryError::LineNotFound {
                product_id: item.product_id,
                requested: item.quantity.get(),
                reserved: other.map_or(0, |l| l.quantity.get()),
            });
        }
    };

    if let Some(quoted) = item.quoted_price
        && quoted != product.price
    {
        warn!(
            product_id = %item.product_id,
            quoted = %quoted,
            current = %product.price,
            "client price differs from catalog, using catalog price"
        );
    }

    Ok(PlannedLine {
        line,
        quantity: item.quantity,
        unit_price: product.price,
    })
}

async fn write_order(
    tx: &mut dyn StoreTx,
    user_id: UserId,
    plan: Vec<PlannedLine>,
    address: String,
    is_paid: bool,
) -> Result<Order, RepositoryError> {
    let now = Utc::now();
    let mut lines = Vec::with_capacity(plan.len());

    for planned in plan {
        let consumed_id = match planned.line.quantity.checked_sub(planned.quantity) {
            Some(remainder) => {
                tx.set_line_quantity(planned.line.id, remainder, now).await?;
                let split = NewCartLine {
                    status: CartLineStatus::Consumed,
                    ..NewCartLine::active(user_id, planned.line.product_id, planned.quantity, now)
                };
                tx.insert_line(split).await?.id
            }
            None => planned.line.id,
        };

        lines.push(NewOrderLine {
            cart_line_id: consumed_id,
            product_id: planned.line.product_id,
            quantity: planned.quantity,
            unit_price: planned.unit_price,
        });
    }

    let total_price = lines
        .iter()
        .map(|l| l.unit_price.line_total(l.quantity))
        .sum();

    let order = tx
        .insert_order(NewOrder {
            user_id,
            lines,
            total_price,
            address,
            is_paid,
            created_at: now,
        })
        .await?;

    for line in &order.lines {
        tx.consume_line(line.cart_line_id, order.id, now).await?;
    }
    Ok(order)
}

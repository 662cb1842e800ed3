//! Cart operations: reserve, release and list.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, instrument};

use stockpile_core::{CartLineId, ProductId, Quantity, UserId};

use super::coordinator::ReservationCoordinator;
use super::{InventoryError, ledger};
use crate::db::InventoryStore;
use crate::models::{CartLineSummary, NewCartLine};

/// Attempts `clear_cart` makes when the cart changes between snapshot and lock.
const CLEAR_ATTEMPTS: usize = 3;

/// Result of a successful `add_item`.
#[derive(Debug, Clone, Serialize)]
pub struct AddedItem {
    /// Whether the quantity was merged into an existing line.
    pub merged: bool,
    /// The product's stock after the debit.
    pub new_stock: i32,
    /// The line as it now stands.
    pub item: CartLineSummary,
}

/// Result of a successful `remove_item`.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct RemovedItem {
    pub cart_line_id: CartLineId,
    pub product_id: ProductId,
    /// Units credited back.
    pub quantity: Quantity,
    /// The product's stock after the credit.
    pub new_stock: i32,
}

/// Reserves and releases stock through users' cart lines.
#[derive(Clone)]
pub struct CartService {
    store: Arc<dyn InventoryStore>,
    coordinator: Arc<ReservationCoordinator>,
}

impl CartService {
    /// Create a cart service.
    #[must_use]
    pub fn new(store: Arc<dyn InventoryStore>, coordinator: Arc<ReservationCoordinator>) -> Self {
        Self { store, coordinator }
    }

    /// Reserve `quantity` units of a product for `user_id`.
    ///
    /// Merges into the user's existing active line for the product, or
    /// creates one. The debit and the line write commit together.
    ///
    /// # Errors
    ///
    /// - `ProductNotFound` for an unknown or inactive product
    /// - `InsufficientStock` when stock cannot cover `quantity`
    /// - `Busy` when the product lock cannot be acquired
    #[instrument(skip(self), fields(user_id = %user_id, product_id = %product_id, quantity = %quantity))]
    pub async fn add_item(
        &self,
        user_id: UserId,
        product_id: ProductId,
        quantity: Quantity,
    ) -> Result<AddedItem, InventoryError> {
        let guard = self.coordinator.acquire(product_id).await?;
        let mut tx = self.store.begin().await?;

        let product = tx
            .product_for_update(product_id)
            .await?
            .filter(|p| p.is_active)
            .ok_or(InventoryError::ProductNotFound { product_id })?;

        let existing = tx.active_line(user_id, product_id).await?;
        let merge_into = match &existing {
            Some(line) => {
                let total = line.quantity.checked_add(quantity).ok_or_else(|| {
                    InventoryError::validation("quantity", "cart line quantity would overflow")
                })?;
                Some((line.id, total))
            }
            None => None,
        };
        let held = existing.map(|l| l.quantity.get());

        let new_stock = ledger::try_debit(tx.as_mut(), &guard, product_id, quantity)
            .await
            .map_err(|e| e.with_held(held))?;

        let now = Utc::now();
        let merged = merge_into.is_some();
        let line = match merge_into {
            Some((line_id, total)) => tx.set_line_quantity(line_id, total, now).await?,
            None => {
                tx.insert_line(NewCartLine::active(user_id, product_id, quantity, now))
                    .await?
            }
        };

        tx.commit().await?;
        drop(guard);

        info!(cart_line_id = %line.id, new_stock, merged, "item reserved");
        Ok(AddedItem {
            merged,
            new_stock,
            item: CartLineSummary::new(&line, product.name, product.price, new_stock),
        })
    }

    /// Delete one of the user's active lines and credit its stock back.
    ///
    /// # Errors
    ///
    /// - `CartLineNotFound` if the line does not exist, is not active, or
    ///   belongs to another user
    /// - `Busy` when the product lock cannot be acquired
    #[instrument(skip(self), fields(user_id = %user_id, cart_line_id = %cart_line_id))]
    pub async fn remove_item(
        &self,
        user_id: UserId,
        cart_line_id: CartLineId,
    ) -> Result<RemovedItem, InventoryError> {
        let not_found = || InventoryError::CartLineNotFound { cart_line_id };

        let line = self
            .store
            .cart_line(cart_line_id)
            .await?
            .filter(|l| l.user_id == user_id && l.is_active())
            .ok_or_else(not_found)?;

        let guard = self.coordinator.acquire(line.product_id).await?;
        let mut tx = self.store.begin().await?;

        // Re-read under the lock: the line may have been removed or consumed
        // while we waited.
        let line = tx
            .cart_line(cart_line_id)
            .await?
            .filter(|l| l.user_id == user_id && l.is_active())
            .ok_or_else(not_found)?;

        tx.delete_line(line.id).await?;
        let new_stock = ledger::credit(tx.as_mut(), &guard, line.product_id, line.quantity).await?;
        tx.commit().await?;

        info!(product_id = %line.product_id, quantity = %line.quantity, new_stock, "item released");
        Ok(RemovedItem {
            cart_line_id,
            product_id: line.product_id,
            quantity: line.quantity,
            new_stock,
        })
    }

    /// Delete every active line of `user_id`, crediting each product.
    ///
    /// Returns the number of lines removed. An empty cart is not an error.
    ///
    /// # Errors
    ///
    /// - `Busy` when a product lock cannot be acquired, or the cart keeps
    ///   changing under concurrent adds
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn clear_cart(&self, user_id: UserId) -> Result<usize, InventoryError> {
        let mut attempt = 0;

        loop {
            attempt += 1;
            let snapshot = self.store.active_lines(user_id).await?;
            if snapshot.is_empty() {
                return Ok(0);
            }

            let products: BTreeSet<ProductId> = snapshot.iter().map(|l| l.product_id).collect();
            let guard = self.coordinator.acquire_all(products).await?;
            let mut tx = self.store.begin().await?;

            let lines = tx.active_lines(user_id).await?;
            if let Some(line) = lines.iter().find(|l| !guard.covers(l.product_id)) {
                if attempt >= CLEAR_ATTEMPTS {
                    return Err(InventoryError::Busy {
                        product_id: line.product_id,
                    });
                }
                debug!(product_id = %line.product_id, attempt, "cart changed while clearing, retrying");
                continue;
            }

            for line in &lines {
                tx.delete_line(line.id).await?;
                ledger::credit(tx.as_mut(), &guard, line.product_id, line.quantity).await?;
            }
            tx.commit().await?;

            info!(removed = lines.len(), "cart cleared");
            return Ok(lines.len());
        }
    }

    /// The user's active lines with product details, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `InventoryError::Repository` on storage failure.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn list_cart(&self, user_id: UserId) -> Result<Vec<CartLineSummary>, InventoryError> {
        Ok(self.store.cart_summaries(user_id).await?)
    }
}

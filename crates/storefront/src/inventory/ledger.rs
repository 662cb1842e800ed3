//! Stock ledger: the available-stock counter of each product.
//!
//! A debit moves units from "available" into a reservation; a credit moves
//! them back. Both run inside the caller's transaction and under the
//! caller's [`ReservationGuard`] for the product, so the read and the write
//! of the counter cannot interleave with another change to it.

use tracing::debug;

use stockpile_core::{ProductId, Quantity};

use super::InventoryError;
use super::coordinator::ReservationGuard;
use crate::db::StoreTx;

/// Decide a debit against `available` units.
///
/// Returns the remaining stock, or `None` if `available` cannot cover the
/// request. The result is never negative.
#[must_use]
pub const fn debit(available: i32, requested: Quantity) -> Option<i32> {
    if available < requested.get() {
        return None;
    }
    Some(available - requested.get())
}

/// Debit `amount` units of a product.
///
/// Returns the product's new stock level.
///
/// # Errors
///
/// - `InventoryError::ProductNotFound` if the product does not exist
/// - `InventoryError::InsufficientStock` if stock cannot cover `amount`; the
///   `held` field is left `None` for the caller to fill in
/// - `InventoryError::Repository` on storage failure
pub async fn try_debit(
    tx: &mut dyn StoreTx,
    guard: &ReservationGuard,
    product_id: ProductId,
    amount: Quantity,
) -> Result<i32, InventoryError> {
    debug_assert!(guard.covers(product_id), "debit without the product lock");

    let product = tx
        .product_for_update(product_id)
        .await?
        .ok_or(InventoryError::ProductNotFound { product_id })?;

    let Some(remaining) = debit(product.stock, amount) else {
        return Err(InventoryError::InsufficientStock {
            product_id,
            available: product.stock,
            requested: amount.get(),
            held: None,
        });
    };

    tx.set_stock(product_id, remaining).await?;
    debug!(product_id = %product_id, amount = %amount, remaining, "stock debited");
    Ok(remaining)
}

/// Credit `amount` units back to a product.
///
/// Returns the product's new stock level.
///
/// # Errors
///
/// - `InventoryError::ProductNotFound` if the product does not exist
/// - `InventoryError::Repository` on storage failure, including a counter
///   that would overflow
pub async fn credit(
    tx: &mut dyn StoreTx,
    guard: &ReservationGuard,
    product_id: ProductId,
    amount: Quantity,
) -> Result<i32, InventoryError> {
    debug_assert!(guard.covers(product_id), "credit without the product lock");

    let product = tx
        .product_for_update(product_id)
        .await?
        .ok_or(InventoryError::ProductNotFound { product_id })?;

    let restored = product.stock.checked_add(amount.get()).ok_or_else(|| {
        crate::db::RepositoryError::DataCorruption(format!(
            "stock of product {product_id} overflows on credit"
        ))
    })?;

    tx.set_stock(product_id, restored).await?;
    debug!(product_id = %product_id, amount = %amount, restored, "stock credited");
    Ok(restored)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::db::{InventoryStore, MemoryStore, ProductSeed};
    use crate::inventory::coordinator::ReservationCoordinator;
    use stockpile_core::Price;

    fn qty(n: i32) -> Quantity {
        Quantity::new(n).unwrap()
    }

    #[test]
    fn test_debit_exact_stock_reaches_zero() {
        assert_eq!(debit(5, qty(5)), Some(0));
    }

    #[test]
    fn test_debit_beyond_stock_refused() {
        assert_eq!(debit(5, qty(6)), None);
        assert_eq!(debit(0, qty(1)), None);
    }

    #[tokio::test]
    async fn test_try_debit_then_credit_restores_stock() {
        let store = MemoryStore::new();
        let product = store
            .add_product(ProductSeed::new("Widget", Price::from_cents(100), 10))
            .unwrap();
        let coordinator = ReservationCoordinator::default();
        let guard = coordinator.acquire(product.id).await.unwrap();

        let mut tx = store.begin().await.unwrap();
        assert_eq!(try_debit(tx.as_mut(), &guard, product.id, qty(4)).await.unwrap(), 6);
        assert_eq!(credit(tx.as_mut(), &guard, product.id, qty(4)).await.unwrap(), 10);
        tx.commit().await.unwrap();
    }

    #[tokio::test]
    async fn test_try_debit_reports_available() {
        let store = MemoryStore::new();
        let product = store
            .add_product(ProductSeed::new("Widget", Price::from_cents(100), 3))
            .unwrap();
        let coordinator = ReservationCoordinator::default();
        let guard = coordinator.acquire(product.id).await.unwrap();

        let mut tx = store.begin().await.unwrap();
        let err = try_debit(tx.as_mut(), &guard, product.id, qty(4))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            InventoryError::InsufficientStock { available: 3, requested: 4, held: None, .. }
        ));
    }

    #[tokio::test]
    async fn test_try_debit_unknown_product() {
        let store = MemoryStore::new();
        let coordinator = ReservationCoordinator::default();
        let guard = coordinator.acquire(ProductId::new(99)).await.unwrap();

        let mut tx = store.begin().await.unwrap();
        let err = try_debit(tx.as_mut(), &guard, ProductId::new(99), qty(1))
            .await
            .unwrap_err();
        assert!(matches!(err, InventoryError::ProductNotFound { .. }));
    }
}
